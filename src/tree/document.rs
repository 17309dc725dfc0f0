//! Persisted form of a cause tree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{CauseNode, CauseTree, PreventiveMeasure};
use crate::error::{TreeError, TreeResult};

/// Wire and storage shape of a [`CauseTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeDocument {
    pub accident_id: String,
    #[serde(default)]
    pub nodes: Vec<CauseNode>,
    #[serde(default)]
    pub preventive_measures: Vec<PreventiveMeasure>,
}

impl From<CauseTree> for TreeDocument {
    fn from(tree: CauseTree) -> Self {
        Self {
            accident_id: tree.accident_id,
            nodes: tree.nodes,
            preventive_measures: tree.measures,
        }
    }
}

impl TryFrom<TreeDocument> for CauseTree {
    type Error = TreeError;

    fn try_from(doc: TreeDocument) -> Result<Self, Self::Error> {
        CauseTree::from_parts(doc.accident_id, doc.nodes, doc.preventive_measures)
    }
}

/// Check node id uniqueness, edge targets and self-loops.
pub fn validate_nodes(nodes: &[CauseNode]) -> TreeResult<()> {
    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(TreeError::MalformedTree {
                message: format!("duplicate node id '{}'", node.id),
            });
        }
    }

    for node in nodes {
        for edge in &node.connections {
            if edge.to == node.id {
                return Err(TreeError::MalformedTree {
                    message: format!("self-loop on '{}'", node.id),
                });
            }
            if !ids.contains(edge.to.as_str()) {
                return Err(TreeError::MalformedTree {
                    message: format!("edge {} -> {} targets an unknown node", node.id, edge.to),
                });
            }
        }
    }

    Ok(())
}

impl CauseTree {
    /// Serialize to a JSON document.
    pub fn to_json(&self) -> TreeResult<String> {
        serde_json::to_string(self).map_err(|e| TreeError::MalformedTree {
            message: e.to_string(),
        })
    }

    /// Parse and validate a JSON document.
    ///
    /// Nothing is returned unless every invariant holds.
    pub fn from_json(blob: &str) -> TreeResult<Self> {
        let doc: TreeDocument =
            serde_json::from_str(blob).map_err(|e| TreeError::MalformedTree {
                message: e.to_string(),
            })?;
        CauseTree::try_from(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{
        MeasureUpdate, NodeCategory, NodePatch, Position, Priority, Relation, SequentialAllocator,
    };

    fn sample_tree() -> CauseTree {
        let mut tree = CauseTree::new("acc-1");
        tree.replace_from_generated(
            vec![
                CauseNode::new("n1", "Sol mouillé", NodeCategory::Necessary, Position::new(100.0, 100.0))
                    .with_edge("n3", Relation::Conjunction),
                CauseNode::new("n2", "Chaussures usées", NodeCategory::Unusual, Position::new(250.0, 200.0))
                    .with_edge("n3", Relation::Conjunction),
                CauseNode::new("n3", "Glissade", NodeCategory::Necessary, Position::new(400.0, 100.0)),
            ],
            Vec::new(),
        )
        .unwrap();
        tree.upsert_measure(
            "n1",
            MeasureUpdate {
                measure: Some("Nettoyage immédiat".to_string()),
                priority: Some(Priority::High),
                can_eliminate: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        tree
    }

    #[test]
    fn test_json_round_trip_preserves_tree() {
        let tree = sample_tree();
        let blob = tree.to_json().unwrap();
        let restored = CauseTree::from_json(&blob).unwrap();
        assert_eq!(restored, tree);
    }

    /// A tree produced only by incremental edits.
    fn edited_tree() -> CauseTree {
        let ids = SequentialAllocator::default();
        let mut tree = CauseTree::new("acc-1");
        let a = tree
            .add_node(&ids, "Sol mouillé", NodeCategory::Normal, Position::new(100.0, 100.0))
            .unwrap()
            .id
            .clone();
        let b = tree
            .add_node(&ids, "Gants inadaptés", NodeCategory::Normal, Position::default())
            .unwrap()
            .id
            .clone();
        let c = tree
            .add_node(&ids, "Chute", NodeCategory::Necessary, Position::new(400.0, 100.0))
            .unwrap()
            .id
            .clone();

        tree.update_node(
            &a,
            NodePatch {
                content: Some("Sol mouillé près du poste de lavage".to_string()),
                category: Some(NodeCategory::Necessary),
                position: Some(Position::new(137.25, 42.5)),
            },
        )
        .unwrap();
        tree.update_node(
            &b,
            NodePatch {
                category: Some(NodeCategory::Unusual),
                ..Default::default()
            },
        )
        .unwrap();

        tree.add_edge(&a, &c, Relation::Sequence).unwrap();
        tree.add_edge(&b, &c, Relation::Conjunction).unwrap();
        tree.add_edge(&b, &a, Relation::Disjunction).unwrap();
        tree.add_edge(&a, &c, Relation::Sequence).unwrap();
        tree
    }

    #[test]
    fn test_json_round_trip_of_edited_tree() {
        let tree = edited_tree();
        assert_eq!(tree.edge_count(), 4);

        let restored = CauseTree::from_json(&tree.to_json().unwrap()).unwrap();
        assert_eq!(restored, tree);
        assert_eq!(restored.node("node-1").unwrap().position, Position::new(137.25, 42.5));
    }

    #[test]
    fn test_document_uses_camel_case() {
        let value: serde_json::Value = serde_json::from_str(&sample_tree().to_json().unwrap()).unwrap();
        assert_eq!(value["accidentId"], "acc-1");
        assert_eq!(value["preventiveMeasures"][0]["factId"], "n1");
        assert_eq!(value["nodes"][2]["type"], "necessary");
    }

    #[test]
    fn test_dangling_edge_is_rejected() {
        let blob = r#"{
            "accidentId": "acc-1",
            "nodes": [
                {"id": "n1", "content": "a", "type": "necessary", "x": 0, "y": 0,
                 "connections": [{"to": "n2", "type": "sequence"}]}
            ]
        }"#;
        assert!(matches!(
            CauseTree::from_json(blob),
            Err(TreeError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let blob = r#"{
            "accidentId": "acc-1",
            "nodes": [
                {"id": "n1", "content": "a", "type": "normal", "x": 0, "y": 0},
                {"id": "n1", "content": "b", "type": "normal", "x": 0, "y": 0}
            ]
        }"#;
        let err = CauseTree::from_json(blob).unwrap_err();
        assert!(err.to_string().contains("duplicate node id"));
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let nodes = vec![CauseNode::new("n1", "a", NodeCategory::Normal, Position::default())
            .with_edge("n1", Relation::Sequence)];
        assert!(matches!(
            validate_nodes(&nodes),
            Err(TreeError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_unknown_relation_is_rejected() {
        let blob = r#"{
            "accidentId": "acc-1",
            "nodes": [
                {"id": "n1", "content": "a", "type": "normal", "x": 0, "y": 0,
                 "connections": [{"to": "n2", "type": "causes"}]},
                {"id": "n2", "content": "b", "type": "normal", "x": 0, "y": 0}
            ]
        }"#;
        assert!(CauseTree::from_json(blob).is_err());
    }

    #[test]
    fn test_not_json_is_malformed() {
        assert!(matches!(
            CauseTree::from_json("not json"),
            Err(TreeError::MalformedTree { .. })
        ));
    }

    #[test]
    fn test_empty_tree_round_trip() {
        let tree = CauseTree::new("acc-2");
        let restored = CauseTree::from_json(&tree.to_json().unwrap()).unwrap();
        assert!(restored.is_empty());
        assert_eq!(restored.accident_id(), "acc-2");
    }
}
