use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inrs_cause_tree::{
    ai::{LangbaseTestimonyClassifier, LangbaseTreeGenerator},
    cli::{execute_command, Cli, Commands},
    config::{Config, LogFormat},
    langbase::LangbaseClient,
    server::{AppState, McpServer},
    storage::SqliteStorage,
    workflow::AnalysisWorkflow,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve);

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "INRS cause tree server starting..."
    );

    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    let langbase = match LangbaseClient::new(&config.langbase, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.langbase.base_url, "Langbase client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize Langbase client");
            return Err(e.into());
        }
    };

    if command == Commands::Serve {
        info!("Ensuring required Langbase pipes exist...");
        let definitions = [
            LangbaseTestimonyClassifier::definition(config.pipes.testimony.clone()),
            LangbaseTreeGenerator::definition(config.pipes.cause_tree.clone()),
        ];
        for definition in &definitions {
            if let Err(e) = langbase.ensure_pipe(definition).await {
                error!(pipe = %definition.name, error = %e, "Failed to ensure pipe exists");
                return Err(e.into());
            }
        }
    }

    let classifier = LangbaseTestimonyClassifier::new(langbase.clone(), config.pipes.testimony.clone());
    let generator = LangbaseTreeGenerator::new(langbase, config.pipes.cause_tree.clone());
    let workflow = AnalysisWorkflow::new(
        Arc::new(storage),
        Arc::new(classifier),
        Arc::new(generator),
        &config.workflow,
    )
    .with_pipes(config.pipes.clone());

    match command {
        Commands::Serve => {
            let state = Arc::new(AppState::new(config, workflow));
            let server = McpServer::new(state);

            info!("Server ready, waiting for requests on stdin...");

            if let Err(e) = server.run().await {
                error!(error = %e, "Server error");
                return Err(e.into());
            }

            info!("Server shutdown complete");
            Ok(())
        }
        offline => {
            let result = execute_command(offline, &workflow).await;
            if result.exit_code == 0 {
                println!("{}", result.message);
            } else {
                eprintln!("{}", result.message);
            }
            std::process::exit(result.exit_code);
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // stdout carries the MCP protocol
    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
