//! Cause-tree graph engine.
//!
//! A [`CauseTree`] holds the facts ([`CauseNode`]) of one accident and the
//! typed causal relations between them. Edges are owned by their source node
//! (`connections`), so there is no edge table: removing a node must strip
//! every edge pointing at it.
//!
//! Invariants kept by every operation:
//! - node ids are unique within the tree;
//! - every edge targets an existing node;
//! - no edge targets its own source.
//!
//! The tree is not required to be acyclic.

mod document;
mod ids;
mod measures;

pub use document::*;
pub use ids::*;
pub use measures::*;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TreeError, TreeResult};

/// How many fresh ids to draw before giving up on an allocator that keeps colliding.
const MAX_ID_ATTEMPTS: usize = 16;

/// INRS category of a fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Without it the accident would not have occurred.
    Necessary,
    /// Departs from usual work conditions.
    Unusual,
    /// Usual work condition.
    #[default]
    Normal,
}

impl NodeCategory {
    /// Parse a category, falling back to [`NodeCategory::Normal`].
    pub fn parse_lossy(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }

    /// Get the category name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeCategory::Necessary => "necessary",
            NodeCategory::Unusual => "unusual",
            NodeCategory::Normal => "normal",
        }
    }
}

impl std::fmt::Display for NodeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NodeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "necessary" => Ok(NodeCategory::Necessary),
            "unusual" => Ok(NodeCategory::Unusual),
            "normal" => Ok(NodeCategory::Normal),
            _ => Err(format!("Unknown node category: {}", s)),
        }
    }
}

/// Causal relation carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Target causally follows source in a chain.
    Sequence,
    /// Source and another fact are jointly required to cause the target.
    Conjunction,
    /// Source or an alternative independently causes the target.
    Disjunction,
}

impl Relation {
    /// Get the relation name
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Sequence => "sequence",
            Relation::Conjunction => "conjunction",
            Relation::Disjunction => "disjunction",
        }
    }

    /// Symbol used on cause-tree diagrams.
    pub fn symbol(&self) -> &'static str {
        match self {
            Relation::Sequence => "→",
            Relation::Conjunction => "+",
            Relation::Disjunction => "×",
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequence" => Ok(Relation::Sequence),
            "conjunction" => Ok(Relation::Conjunction),
            "disjunction" => Ok(Relation::Disjunction),
            _ => Err(TreeError::InvalidEdge {
                message: format!("unknown relation type '{}'", s),
            }),
        }
    }
}

/// Placement of a node on the diagram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Create a position
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Directed edge, stored on its source node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CauseEdge {
    /// Target node id.
    pub to: String,
    /// Relation type.
    #[serde(rename = "type")]
    pub relation: Relation,
}

/// A fact of the cause tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseNode {
    /// Identifier, unique within the tree.
    pub id: String,
    /// Fact description.
    pub content: String,
    /// INRS category.
    #[serde(rename = "type")]
    pub category: NodeCategory,
    /// Diagram placement.
    #[serde(flatten)]
    pub position: Position,
    /// Outgoing edges.
    #[serde(default)]
    pub connections: Vec<CauseEdge>,
}

impl CauseNode {
    /// Create a node without edges
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        category: NodeCategory,
        position: Position,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            category,
            position,
            connections: Vec::new(),
        }
    }

    /// Add an outgoing edge
    pub fn with_edge(mut self, to: impl Into<String>, relation: Relation) -> Self {
        self.connections.push(CauseEdge {
            to: to.into(),
            relation,
        });
        self
    }
}

/// Partial update of a node. Edges are never touched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodePatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "type")]
    pub category: Option<NodeCategory>,
    #[serde(default)]
    pub position: Option<Position>,
}

/// Cause tree of one accident.
///
/// Saving a tree replaces the stored version as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TreeDocument", into = "TreeDocument")]
pub struct CauseTree {
    accident_id: String,
    nodes: Vec<CauseNode>,
    measures: Vec<PreventiveMeasure>,
}

impl CauseTree {
    /// Create an empty tree for an accident
    pub fn new(accident_id: impl Into<String>) -> Self {
        Self {
            accident_id: accident_id.into(),
            nodes: Vec::new(),
            measures: Vec::new(),
        }
    }

    /// Assemble a tree from stored parts, checking every structural invariant.
    pub fn from_parts(
        accident_id: impl Into<String>,
        nodes: Vec<CauseNode>,
        measures: Vec<PreventiveMeasure>,
    ) -> TreeResult<Self> {
        validate_nodes(&nodes)?;
        Ok(Self {
            accident_id: accident_id.into(),
            nodes,
            measures,
        })
    }

    /// Owning accident.
    pub fn accident_id(&self) -> &str {
        &self.accident_id
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[CauseNode] {
        &self.nodes
    }

    /// Preventive measures in order.
    pub fn measures(&self) -> &[PreventiveMeasure] {
        &self.measures
    }

    /// Look up a node
    pub fn node(&self, id: &str) -> Option<&CauseNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Whether a node with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// Whether the tree has no node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.connections.len()).sum()
    }

    /// All edges as `(from, edge)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &CauseEdge)> {
        self.nodes
            .iter()
            .flat_map(|n| n.connections.iter().map(move |e| (n.id.as_str(), e)))
    }

    /// Nodes of a given category.
    pub fn nodes_by_category(&self, category: NodeCategory) -> Vec<&CauseNode> {
        self.nodes.iter().filter(|n| n.category == category).collect()
    }

    fn node_mut(&mut self, id: &str) -> TreeResult<&mut CauseNode> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| TreeError::NodeNotFound {
                node_id: id.to_string(),
            })
    }

    fn require(&self, id: &str) -> TreeResult<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(TreeError::NodeNotFound {
                node_id: id.to_string(),
            })
        }
    }

    /// Add a fact with a freshly allocated id and no edges.
    pub fn add_node(
        &mut self,
        ids: &dyn NodeIdAllocator,
        content: impl Into<String>,
        category: NodeCategory,
        position: Position,
    ) -> TreeResult<&CauseNode> {
        let id = (0..MAX_ID_ATTEMPTS)
            .map(|_| ids.next_id())
            .find(|candidate| !self.contains(candidate))
            .ok_or_else(|| TreeError::MalformedTree {
                message: "id allocator keeps producing ids already present in the tree"
                    .to_string(),
            })?;

        debug!(accident_id = %self.accident_id, node_id = %id, "Adding cause node");
        self.nodes.push(CauseNode::new(id, content, category, position));
        Ok(&self.nodes[self.nodes.len() - 1])
    }

    /// Merge the given fields into a node.
    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> TreeResult<&CauseNode> {
        let node = self.node_mut(id)?;
        if let Some(content) = patch.content {
            node.content = content;
        }
        if let Some(category) = patch.category {
            node.category = category;
        }
        if let Some(position) = patch.position {
            node.position = position;
        }
        Ok(node)
    }

    /// Remove a node and every edge pointing at it.
    ///
    /// Measures attached to the node are kept; see [`CauseTree::orphaned_measures`].
    pub fn delete_node(&mut self, id: &str) -> TreeResult<CauseNode> {
        let index = self
            .nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| TreeError::NodeNotFound {
                node_id: id.to_string(),
            })?;
        let removed = self.nodes.remove(index);

        let mut cascaded = 0;
        for node in &mut self.nodes {
            let before = node.connections.len();
            node.connections.retain(|e| e.to != id);
            cascaded += before - node.connections.len();
        }

        debug!(
            accident_id = %self.accident_id,
            node_id = %id,
            cascaded_edges = cascaded,
            "Deleted cause node"
        );
        Ok(removed)
    }

    /// Append an edge to `from`'s connections. Duplicates are allowed.
    pub fn add_edge(&mut self, from: &str, to: &str, relation: Relation) -> TreeResult<()> {
        self.require(to)?;
        let source = self.node_mut(from)?;
        if from == to {
            return Err(TreeError::InvalidEdge {
                message: format!("self-loop on {}", from),
            });
        }

        source.connections.push(CauseEdge {
            to: to.to_string(),
            relation,
        });
        Ok(())
    }

    /// Remove edges `from -> to`, optionally restricted to one relation.
    ///
    /// Returns how many edges were removed.
    pub fn remove_edge(
        &mut self,
        from: &str,
        to: &str,
        relation: Option<Relation>,
    ) -> TreeResult<usize> {
        let source = self.node_mut(from)?;
        let before = source.connections.len();
        source
            .connections
            .retain(|e| !(e.to == to && relation.map_or(true, |r| r == e.relation)));
        Ok(before - source.connections.len())
    }

    /// Replace the whole tree content with a generated node and measure set.
    ///
    /// The candidate set is validated first; on error the tree is unchanged.
    pub fn replace_from_generated(
        &mut self,
        nodes: Vec<CauseNode>,
        measures: Vec<PreventiveMeasure>,
    ) -> TreeResult<()> {
        validate_nodes(&nodes)?;
        debug!(
            accident_id = %self.accident_id,
            nodes = nodes.len(),
            measures = measures.len(),
            "Replacing cause tree with generated content"
        );
        self.nodes = nodes;
        self.measures = measures;
        Ok(())
    }
}
