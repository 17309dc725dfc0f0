//! Command-line interface.
//!
//! Without a subcommand the binary serves MCP over stdio. The offline
//! subcommands read the database directly and never call the AI pipes.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::workflow::AnalysisWorkflow;

/// INRS cause tree analysis server.
#[derive(Parser, Debug)]
#[command(name = "inrs-cause-tree", version, about)]
pub struct Cli {
    /// Command to run. Defaults to `serve`.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Serve the MCP protocol over stdio
    Serve,

    /// Export a completed analysis as JSON
    Export {
        /// Accident ID
        accident_id: String,

        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show analysis counts per status
    Stats,
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }
}

/// Execute an offline command. `Serve` is handled by the binary.
pub async fn execute_command(command: Commands, workflow: &AnalysisWorkflow) -> CliResult {
    match command {
        Commands::Serve => CliResult::error("serve is not an offline command"),
        Commands::Export {
            accident_id,
            output,
        } => execute_export(workflow, &accident_id, output).await,
        Commands::Stats => execute_stats(workflow).await,
    }
}

async fn execute_export(
    workflow: &AnalysisWorkflow,
    accident_id: &str,
    output: Option<PathBuf>,
) -> CliResult {
    let export = match workflow.export_snapshot(accident_id).await {
        Ok(export) => export,
        Err(e) => return CliResult::error(format!("Export failed: {}", e)),
    };

    let json = match serde_json::to_string_pretty(&export) {
        Ok(json) => json,
        Err(e) => return CliResult::error(format!("Export failed: {}", e)),
    };

    match output {
        Some(path) => match tokio::fs::write(&path, json.as_bytes()).await {
            Ok(()) => CliResult::success(format!(
                "Exported {} to {}",
                export.accident.accident_number,
                path.display()
            )),
            Err(e) => CliResult::error(format!("Cannot write {}: {}", path.display(), e)),
        },
        None => CliResult::success(json),
    }
}

async fn execute_stats(workflow: &AnalysisWorkflow) -> CliResult {
    let stats = match workflow.statistics().await {
        Ok(stats) => stats,
        Err(e) => return CliResult::error(format!("Failed to compute statistics: {}", e)),
    };

    let mut output = String::new();
    output.push_str("\nAccident Analyses\n");
    output.push_str("═════════════════\n\n");
    output.push_str(&format!("  Total:        {}\n", stats.total));
    output.push_str(&format!("  Draft:        {}\n", stats.draft));
    output.push_str(&format!("  In progress:  {}\n", stats.in_progress));
    output.push_str(&format!("  Completed:    {}\n", stats.completed));

    CliResult::success(output)
}
