//! Integration tests for the SQLite storage adapter
//!
//! Run against in-memory databases, plus one file-backed database in a
//! temporary directory.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use inrs_cause_tree::config::DatabaseConfig;
use inrs_cause_tree::error::{AppError, ErrorKind, StorageError, TreeError};
use inrs_cause_tree::evidence::{EvidenceUpdate, FileRef, MaterialEvidence};
use inrs_cause_tree::fragments::{FragmentCategory, FragmentDraft};
use inrs_cause_tree::storage::{Invocation, SqliteStorage, Storage};
use inrs_cause_tree::tree::{
    CauseNode, CauseTree, NodeCategory, NodePatch, Position, PreventiveMeasure, Relation,
    SequentialAllocator,
};
use inrs_cause_tree::workflow::{
    accident_number, Accident, AccidentDeclaration, AnalysisStage, Severity, WitnessDraft,
};

fn declaration() -> AccidentDeclaration {
    AccidentDeclaration::new(
        NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
        "14:30",
        "Atelier B",
        "Usine Nord",
    )
    .with_description("Chute de plain-pied")
    .with_severity(Severity::Moderate)
}

async fn storage_with_accident() -> (SqliteStorage, Accident) {
    let storage = SqliteStorage::new_in_memory().await.unwrap();
    let accident = Accident::declare(&declaration(), accident_number(2024, 0));
    storage.create_accident(&accident).await.unwrap();
    (storage, accident)
}

fn two_node_tree(accident_id: &str) -> CauseTree {
    CauseTree::from_parts(
        accident_id,
        vec![
            CauseNode::new("n1", "Sol mouillé", NodeCategory::Necessary, Position::new(100.0, 100.0))
                .with_edge("n2", Relation::Sequence),
            CauseNode::new("n2", "Glissade", NodeCategory::Necessary, Position::new(250.0, 100.0)),
        ],
        Vec::new(),
    )
    .unwrap()
}

#[cfg(test)]
mod accident_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_accident_round_trip() {
        let (storage, accident) = storage_with_accident().await;

        let loaded = storage.get_accident(&accident.id).await.unwrap().unwrap();
        assert_eq!(loaded.accident_number, "ACC-2024-001");
        assert_eq!(loaded.date, accident.date);
        assert_eq!(loaded.severity, Some(Severity::Moderate));
        assert_eq!(loaded.description.as_deref(), Some("Chute de plain-pied"));
        assert_eq!(loaded.stage, AnalysisStage::Declared);
    }

    #[tokio::test]
    async fn test_missing_accident_is_none() {
        let storage = SqliteStorage::new_in_memory().await.unwrap();
        assert!(storage.get_accident("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_stage() {
        let (storage, mut accident) = storage_with_accident().await;

        accident.advance_to(AnalysisStage::SummaryValidated);
        storage.update_accident(&accident).await.unwrap();

        let loaded = storage.get_accident(&accident.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, AnalysisStage::SummaryValidated);
        assert_eq!(loaded.status, AnalysisStage::SummaryValidated.status());
    }

    #[tokio::test]
    async fn test_count_accidents_for_year_uses_number_prefix() {
        let (storage, _) = storage_with_accident().await;
        let second = Accident::declare(&declaration(), accident_number(2024, 1));
        storage.create_accident(&second).await.unwrap();
        let other_year = Accident::declare(&declaration(), accident_number(2023, 0));
        storage.create_accident(&other_year).await.unwrap();

        assert_eq!(storage.count_accidents_for_year(2024).await.unwrap(), 2);
        assert_eq!(storage.count_accidents_for_year(2023).await.unwrap(), 1);
        assert_eq!(storage.count_accidents_for_year(2022).await.unwrap(), 0);
        assert_eq!(storage.list_accidents().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_accident_number_is_rejected() {
        let (storage, _) = storage_with_accident().await;
        let clash = Accident::declare(&declaration(), accident_number(2024, 0));

        assert!(storage.create_accident(&clash).await.is_err());
    }
}

#[cfg(test)]
mod record_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_witnesses_and_fragments_keep_creation_order() {
        let (storage, accident) = storage_with_accident().await;

        let witness = WitnessDraft::new("Marie", "Durand")
            .with_testimony("J'ai vu Jean glisser")
            .into_witness(&accident.id);
        storage.create_witness(&witness).await.unwrap();

        for (content, category) in [
            ("Sol mouillé", FragmentCategory::VerifiedFact),
            ("Il allait trop vite", FragmentCategory::Opinion),
            ("Éclairage en panne ?", FragmentCategory::ToVerify),
        ] {
            let fragment = FragmentDraft::new(content, category)
                .with_witness(&witness.id)
                .into_fragment(&accident.id);
            storage.create_fragment(&fragment).await.unwrap();
        }

        let fragments = storage.list_fragments(&accident.id).await.unwrap();
        let contents: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(
            contents,
            vec!["Sol mouillé", "Il allait trop vite", "Éclairage en panne ?"]
        );
        assert_eq!(fragments[0].witness_id.as_deref(), Some(witness.id.as_str()));

        let witnesses = storage.list_witnesses(&accident.id).await.unwrap();
        assert_eq!(witnesses.len(), 1);
        assert_eq!(witnesses[0].testimony.as_deref(), Some("J'ai vu Jean glisser"));
    }

    #[tokio::test]
    async fn test_fragment_update_touches_category_and_flag() {
        let (storage, accident) = storage_with_accident().await;
        let mut fragment =
            FragmentDraft::new("Sol mouillé", FragmentCategory::ToVerify).into_fragment(&accident.id);
        storage.create_fragment(&fragment).await.unwrap();

        fragment.reclassify(FragmentCategory::VerifiedFact);
        fragment.toggle_unusual(true);
        storage.update_fragment(&fragment).await.unwrap();

        let loaded = storage.get_fragment(&fragment.id).await.unwrap().unwrap();
        assert_eq!(loaded.category, FragmentCategory::VerifiedFact);
        assert!(loaded.is_unusual);
    }

    #[tokio::test]
    async fn test_evidence_round_trip_with_file() {
        let (storage, accident) = storage_with_accident().await;
        let mut evidence = MaterialEvidence::new(&accident.id, "Photo du sol")
            .with_useful(true)
            .with_file(FileRef {
                file_name: "sol.jpg".to_string(),
                file_url: "https://files.example/sol.jpg".to_string(),
            });
        storage.create_evidence(&evidence).await.unwrap();

        evidence.apply(EvidenceUpdate {
            description: Some("Photo du sol mouillé".to_string()),
            ..Default::default()
        });
        storage.update_evidence(&evidence).await.unwrap();

        let listed = storage.list_evidence(&accident.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].description, "Photo du sol mouillé");
        assert!(listed[0].is_useful);
        assert_eq!(
            listed[0].file_ref.as_ref().map(|f| f.file_name.as_str()),
            Some("sol.jpg")
        );
    }

    #[tokio::test]
    async fn test_invocation_logging() {
        let (storage, accident) = storage_with_accident().await;

        let ok = Invocation::new("testimony classifier", json!({"testimony": "x"}))
            .with_accident(&accident.id)
            .with_pipe("inrs-testimony-classifier-v1")
            .success(json!({"fragments": []}), 42);
        let failed = Invocation::new("cause tree generator", json!({"facts": ["x"]}))
            .with_accident(&accident.id)
            .failure("timeout", 120000);

        storage.log_invocation(&ok).await.unwrap();
        storage.log_invocation(&failed).await.unwrap();
    }
}

#[cfg(test)]
mod cause_tree_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_tree_round_trip() {
        let (storage, accident) = storage_with_accident().await;
        let mut tree = two_node_tree(&accident.id);
        let measure = PreventiveMeasure {
            measure: "Tapis absorbant".to_string(),
            ..PreventiveMeasure::for_node(tree.node("n1").unwrap())
        };
        tree = CauseTree::from_parts(&accident.id, tree.nodes().to_vec(), vec![measure]).unwrap();

        storage.save_cause_tree(&tree).await.unwrap();
        let loaded = storage.get_cause_tree(&accident.id).await.unwrap().unwrap();

        assert_eq!(loaded, tree);
    }

    #[tokio::test]
    async fn test_incrementally_edited_tree_round_trip() {
        let (storage, accident) = storage_with_accident().await;
        let ids = SequentialAllocator::default();
        let mut tree = CauseTree::new(&accident.id);
        let a = tree
            .add_node(&ids, "Sol mouillé", NodeCategory::Normal, Position::default())
            .unwrap()
            .id
            .clone();
        let b = tree
            .add_node(&ids, "Chute", NodeCategory::Necessary, Position::new(300.0, 100.0))
            .unwrap()
            .id
            .clone();
        tree.update_node(
            &a,
            NodePatch {
                content: Some("Sol mouillé et glissant".to_string()),
                category: Some(NodeCategory::Unusual),
                position: Some(Position::new(12.75, 250.5)),
            },
        )
        .unwrap();
        tree.add_edge(&a, &b, Relation::Sequence).unwrap();
        tree.add_edge(&a, &b, Relation::Conjunction).unwrap();
        tree.add_edge(&b, &a, Relation::Disjunction).unwrap();
        tree.add_edge(&a, &b, Relation::Sequence).unwrap();

        storage.save_cause_tree(&tree).await.unwrap();
        let loaded = storage.get_cause_tree(&accident.id).await.unwrap().unwrap();

        assert_eq!(loaded, tree);
        assert_eq!(loaded.edge_count(), 4);
    }

    #[tokio::test]
    async fn test_absent_tree_is_none() {
        let (storage, accident) = storage_with_accident().await;
        assert!(storage.get_cause_tree(&accident.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (storage, accident) = storage_with_accident().await;

        storage.save_cause_tree(&two_node_tree(&accident.id)).await.unwrap();
        let replacement = CauseTree::from_parts(
            &accident.id,
            vec![CauseNode::new("x", "Autre fait", NodeCategory::Unusual, Position::default())],
            Vec::new(),
        )
        .unwrap();
        storage.save_cause_tree(&replacement).await.unwrap();

        let loaded = storage.get_cause_tree(&accident.id).await.unwrap().unwrap();
        assert_eq!(loaded, replacement);
    }

    #[tokio::test]
    async fn test_corrupt_tree_row_is_malformed_tree() {
        let (storage, accident) = storage_with_accident().await;
        storage.save_cause_tree(&two_node_tree(&accident.id)).await.unwrap();

        let dangling = json!([
            {"id": "n1", "content": "Sol mouillé", "type": "necessary", "x": 0.0, "y": 0.0,
             "connections": [{"to": "ghost", "type": "sequence"}]}
        ])
        .to_string();
        sqlx::query("UPDATE cause_trees SET tree_data = ? WHERE accident_id = ?")
            .bind(&dangling)
            .bind(&accident.id)
            .execute(storage.pool())
            .await
            .unwrap();

        let err = storage.get_cause_tree(&accident.id).await.unwrap_err();
        assert!(
            matches!(err, StorageError::MalformedTree(TreeError::MalformedTree { .. })),
            "got {:?}",
            err
        );
        let app_err: AppError = err.into();
        assert_eq!(app_err.kind(), ErrorKind::MalformedTree);
    }

    #[tokio::test]
    async fn test_file_backed_database_persists_across_pools() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("cause_tree.db"),
            max_connections: 2,
        };

        let accident_id = {
            let storage = SqliteStorage::new(&config).await.unwrap();
            let accident = Accident::declare(&declaration(), accident_number(2024, 0));
            storage.create_accident(&accident).await.unwrap();
            storage.save_cause_tree(&two_node_tree(&accident.id)).await.unwrap();
            storage.pool().close().await;
            accident.id
        };

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let tree = reopened.get_cause_tree(&accident_id).await.unwrap().unwrap();
        assert_eq!(tree.edge_count(), 1);
        assert!(config.path.exists());
    }
}
