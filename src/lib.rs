//! # INRS Cause Tree
//!
//! Workplace-accident investigation following the INRS cause-tree method,
//! exposed as a Model Context Protocol (MCP) server. Langbase Pipes provide
//! the two AI collaborators: a testimony classifier and a cause-tree
//! generator.
//!
//! ## Features
//!
//! - **Declaration**: accidents, victims and witnesses, numbered `ACC-<year>-<NNN>`
//! - **Testimony**: AI-suggested fragments (verified fact, opinion, to verify, other)
//! - **Evidence**: material evidence catalogue with optional file references
//! - **Cause tree**: facts linked by sequence (→), conjunction (+) or disjunction (×)
//! - **Preventive measures**: one per fact, with coverage reports
//! - **Export**: self-contained JSON snapshot of a completed analysis
//!
//! ## Architecture
//!
//! ```text
//! MCP Client → MCP Server → AnalysisWorkflow → Langbase Pipes (HTTP)
//!                                  ↓
//!                            SQLite (Storage)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inrs_cause_tree::{AnalysisWorkflow, AppState, Config, McpServer};
//! use inrs_cause_tree::ai::{LangbaseTestimonyClassifier, LangbaseTreeGenerator};
//! use inrs_cause_tree::langbase::LangbaseClient;
//! use inrs_cause_tree::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let langbase = LangbaseClient::new(&config.langbase, config.request.clone())?;
//!     let workflow = AnalysisWorkflow::new(
//!         Arc::new(storage),
//!         Arc::new(LangbaseTestimonyClassifier::new(langbase.clone(), &config.pipes.testimony)),
//!         Arc::new(LangbaseTreeGenerator::new(langbase, &config.pipes.cause_tree)),
//!         &config.workflow,
//!     );
//!     let server = McpServer::new(Arc::new(AppState::new(config, workflow)));
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

/// AI collaborators: testimony classifier and cause-tree generator.
pub mod ai;
/// Offline command-line subcommands.
pub mod cli;
/// Configuration management for the server.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Material evidence catalogue.
pub mod evidence;
/// Testimony fragments and their categories.
pub mod fragments;
/// Langbase API client and types for pipe communication.
pub mod langbase;
/// System prompts for Langbase pipes.
pub mod prompts;
/// MCP server implementation and request handling.
pub mod server;
/// Storage port and SQLite adapter.
pub mod storage;
/// Cause-tree graph engine and preventive-measure linker.
pub mod tree;
/// Analysis stages and the orchestrating workflow.
pub mod workflow;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorKind};
pub use server::{AppState, McpServer, SharedState};
pub use tree::CauseTree;
pub use workflow::AnalysisWorkflow;
