//! Server module for MCP protocol handling.
//!
//! This module provides:
//! - MCP server implementation over stdio
//! - Tool call handlers and routing
//! - Shared application state management

mod handlers;
mod mcp;

pub use handlers::*;
pub use mcp::*;

use std::sync::Arc;

use crate::config::Config;
use crate::workflow::AnalysisWorkflow;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Analysis workflow every tool delegates to.
    pub workflow: Arc<AnalysisWorkflow>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, workflow: AnalysisWorkflow) -> Self {
        tracing::info!(
            testimony_pipe = %config.pipes.testimony,
            cause_tree_pipe = %config.pipes.cause_tree,
            ai_deadline_ms = config.workflow.ai_deadline_ms,
            "AppState initializing"
        );

        Self {
            config,
            workflow: Arc::new(workflow),
        }
    }
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            workflow: Arc::clone(&self.workflow),
        }
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use crate::ai::{MockTestimonyClassifier, MockTreeGenerator};

    #[tokio::test]
    async fn test_app_state_clone_shares_workflow() {
        let state = create_test_state(MockTestimonyClassifier::new(), MockTreeGenerator::new()).await;
        let clone = (*state).clone();

        assert!(std::sync::Arc::ptr_eq(&state.workflow, &clone.workflow));
        assert_eq!(clone.config.langbase.api_key, "test-key");
    }

    #[tokio::test]
    async fn test_app_state_workflow_is_usable() {
        let state = create_test_state(MockTestimonyClassifier::new(), MockTreeGenerator::new()).await;
        let stats = state.workflow.statistics().await.unwrap();
        assert_eq!(stats.total, 0);
    }
}
