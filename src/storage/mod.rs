//! Storage layer for persistent state management.
//!
//! This module provides:
//! - The [`Storage`] port injected into the workflow
//! - A SQLite adapter, [`SqliteStorage`]
//! - The [`Invocation`] audit record of AI calls

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::evidence::MaterialEvidence;
use crate::fragments::Fragment;
use crate::tree::CauseTree;
use crate::workflow::{Accident, Witness};

/// Audit record of one AI call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invocation {
    /// Unique invocation identifier.
    pub id: String,
    /// Accident the call was made for.
    pub accident_id: Option<String>,
    /// AI service called.
    pub service: String,
    /// Input parameters as JSON.
    pub input: serde_json::Value,
    /// Output result as JSON (if successful).
    pub output: Option<serde_json::Value>,
    /// Name of the Langbase pipe called.
    pub pipe_name: Option<String>,
    /// Latency in milliseconds.
    pub latency_ms: Option<i64>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Error message (if failed).
    pub error: Option<String>,
    /// When the invocation occurred.
    pub created_at: DateTime<Utc>,
}

impl Invocation {
    /// Create a new invocation log entry
    pub fn new(service: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            accident_id: None,
            service: service.into(),
            input,
            output: None,
            pipe_name: None,
            latency_ms: None,
            success: true,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the accident ID
    pub fn with_accident(mut self, accident_id: impl Into<String>) -> Self {
        self.accident_id = Some(accident_id.into());
        self
    }

    /// Set the pipe name
    pub fn with_pipe(mut self, pipe_name: impl Into<String>) -> Self {
        self.pipe_name = Some(pipe_name.into());
        self
    }

    /// Mark as successful with output
    pub fn success(mut self, output: serde_json::Value, latency_ms: i64) -> Self {
        self.success = true;
        self.output = Some(output);
        self.latency_ms = Some(latency_ms);
        self
    }

    /// Mark as failed with error
    pub fn failure(mut self, error: impl Into<String>, latency_ms: i64) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Persistence port of the analysis workflow.
///
/// Records are written whole: updates replace every mutable column of the
/// row. Cause trees are keyed by accident id and replaced as a unit, so two
/// concurrent saves of the same tree resolve as last write wins.
#[async_trait]
pub trait Storage: Send + Sync {
    // Accident operations

    /// Create a new accident.
    async fn create_accident(&self, accident: &Accident) -> StorageResult<()>;
    /// Get an accident by ID.
    async fn get_accident(&self, id: &str) -> StorageResult<Option<Accident>>;
    /// Update an existing accident.
    async fn update_accident(&self, accident: &Accident) -> StorageResult<()>;
    /// List accidents, most recent first.
    async fn list_accidents(&self) -> StorageResult<Vec<Accident>>;
    /// Count accidents numbered in `year`.
    async fn count_accidents_for_year(&self, year: i32) -> StorageResult<u32>;

    // Witness operations

    /// Create a new witness.
    async fn create_witness(&self, witness: &Witness) -> StorageResult<()>;
    /// Get a witness by ID.
    async fn get_witness(&self, id: &str) -> StorageResult<Option<Witness>>;
    /// List the witnesses of an accident.
    async fn list_witnesses(&self, accident_id: &str) -> StorageResult<Vec<Witness>>;

    // Fragment operations

    /// Create a new fragment.
    async fn create_fragment(&self, fragment: &Fragment) -> StorageResult<()>;
    /// Get a fragment by ID.
    async fn get_fragment(&self, id: &str) -> StorageResult<Option<Fragment>>;
    /// Persist a fragment's category and unusual flag.
    async fn update_fragment(&self, fragment: &Fragment) -> StorageResult<()>;
    /// List the fragments of an accident in creation order.
    async fn list_fragments(&self, accident_id: &str) -> StorageResult<Vec<Fragment>>;

    // Material evidence operations

    /// Create a new evidence item.
    async fn create_evidence(&self, evidence: &MaterialEvidence) -> StorageResult<()>;
    /// Get an evidence item by ID.
    async fn get_evidence(&self, id: &str) -> StorageResult<Option<MaterialEvidence>>;
    /// Update an existing evidence item.
    async fn update_evidence(&self, evidence: &MaterialEvidence) -> StorageResult<()>;
    /// List the evidence of an accident in creation order.
    async fn list_evidence(&self, accident_id: &str) -> StorageResult<Vec<MaterialEvidence>>;

    // Cause tree operations

    /// Replace the stored tree of the tree's accident.
    async fn save_cause_tree(&self, tree: &CauseTree) -> StorageResult<()>;
    /// Get the tree of an accident, validated.
    async fn get_cause_tree(&self, accident_id: &str) -> StorageResult<Option<CauseTree>>;

    // Invocation logging

    /// Log an AI invocation.
    async fn log_invocation(&self, invocation: &Invocation) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_success() {
        let invocation = Invocation::new("testimony classifier", json!({"testimony": "x"}))
            .with_accident("acc-1")
            .with_pipe("inrs-testimony-classifier-v1")
            .success(json!({"fragments": 2}), 120);

        assert!(invocation.success);
        assert_eq!(invocation.accident_id.as_deref(), Some("acc-1"));
        assert_eq!(invocation.latency_ms, Some(120));
        assert!(invocation.error.is_none());
    }

    #[test]
    fn test_invocation_failure() {
        let invocation = Invocation::new("cause tree generator", json!({})).failure("timeout", 5000);

        assert!(!invocation.success);
        assert_eq!(invocation.error.as_deref(), Some("timeout"));
        assert!(invocation.output.is_none());
    }
}
