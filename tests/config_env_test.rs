//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, which never overrides variables already set here.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use inrs_cause_tree::config::{Config, LogFormat};
use inrs_cause_tree::error::AppError;
use serial_test::serial;
use std::env;

const OVERRIDES: &[&str] = &[
    "LANGBASE_BASE_URL",
    "DATABASE_PATH",
    "DATABASE_MAX_CONNECTIONS",
    "LOG_LEVEL",
    "LOG_FORMAT",
    "REQUEST_TIMEOUT_MS",
    "MAX_RETRIES",
    "RETRY_DELAY_MS",
    "PIPE_TESTIMONY",
    "PIPE_CAUSE_TREE",
    "AI_DEADLINE_MS",
];

fn reset_env() {
    env::set_var("LANGBASE_API_KEY", "test-api-key");
    for key in OVERRIDES {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_config_defaults() {
    reset_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.langbase.api_key, "test-api-key");
    assert_eq!(config.langbase.base_url, "https://api.langbase.com");
    assert_eq!(config.database.path.to_str().unwrap(), "./data/cause_tree.db");
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.pipes.testimony, "inrs-testimony-classifier-v1");
    assert_eq!(config.pipes.cause_tree, "inrs-cause-tree-generator-v1");
    assert_eq!(config.workflow.ai_deadline_ms, 120000);
}

#[test]
#[serial]
fn test_config_missing_api_key() {
    reset_env();
    env::remove_var("LANGBASE_API_KEY");

    let result = Config::from_env();
    assert!(matches!(result, Err(AppError::Config { .. })));

    reset_env();
}

#[test]
#[serial]
fn test_config_custom_database() {
    reset_env();
    env::set_var("DATABASE_PATH", "/custom/analyses.db");
    env::set_var("DATABASE_MAX_CONNECTIONS", "10");

    let config = Config::from_env().unwrap();
    assert_eq!(config.database.path.to_str().unwrap(), "/custom/analyses.db");
    assert_eq!(config.database.max_connections, 10);

    reset_env();
}

#[test]
#[serial]
fn test_config_json_log_format_is_case_insensitive() {
    reset_env();
    env::set_var("LOG_FORMAT", "JSON");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    env::set_var("LOG_FORMAT", "whatever");
    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Pretty);

    reset_env();
}

#[test]
#[serial]
fn test_config_custom_pipes_and_deadline() {
    reset_env();
    env::set_var("PIPE_TESTIMONY", "atelier-temoignages");
    env::set_var("PIPE_CAUSE_TREE", "atelier-arbre");
    env::set_var("AI_DEADLINE_MS", "45000");

    let config = Config::from_env().unwrap();
    assert_eq!(config.pipes.testimony, "atelier-temoignages");
    assert_eq!(config.pipes.cause_tree, "atelier-arbre");
    assert_eq!(config.workflow.ai_deadline_ms, 45000);

    reset_env();
}

#[test]
#[serial]
fn test_config_invalid_numbers_fall_back_to_defaults() {
    reset_env();
    env::set_var("MAX_RETRIES", "many");
    env::set_var("REQUEST_TIMEOUT_MS", "-5");
    env::set_var("AI_DEADLINE_MS", "");

    let config = Config::from_env().unwrap();
    assert_eq!(config.request.max_retries, 3);
    assert_eq!(config.request.timeout_ms, 30000);
    assert_eq!(config.workflow.ai_deadline_ms, 120000);

    reset_env();
}
