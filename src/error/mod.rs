use serde::Serialize;
use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Langbase error: {0}")]
    Langbase(#[from] LangbaseError),

    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    #[error("Cause tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Structural errors raised by the cause-tree graph engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: String },

    #[error("Invalid edge: {message}")]
    InvalidEdge { message: String },

    #[error("Malformed tree: {message}")]
    MalformedTree { message: String },
}

/// Errors produced at the AI consumption boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AiError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },
}

/// Errors raised by the analysis workflow
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Accident not found: {accident_id}")]
    AccidentNotFound { accident_id: String },

    #[error("Fragment not found: {fragment_id}")]
    FragmentNotFound { fragment_id: String },

    #[error("Material evidence not found: {evidence_id}")]
    EvidenceNotFound { evidence_id: String },

    #[error("Witness not found: {witness_id}")]
    WitnessNotFound { witness_id: String },

    #[error("Accident {accident_id} has no verified fact to build a cause tree from")]
    InsufficientFacts { accident_id: String },

    #[error("Accident {accident_id} has not reached the {required} stage")]
    StageNotReached {
        accident_id: String,
        required: String,
    },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Stored record could not be decoded: {message}")]
    Decode { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Stored cause tree is unusable: {0}")]
    MalformedTree(#[from] TreeError),

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Langbase API errors
#[derive(Debug, Error)]
pub enum LangbaseError {
    #[error("Langbase unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown tool: {tool_name}")]
    UnknownTool { tool_name: String },

    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters { tool_name: String, message: String },

    #[error("Tool execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Caller-facing classification of an [`AppError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A referenced entity is absent.
    NotFound,
    /// Self-loop or malformed relation.
    InvalidEdge,
    /// Dangling edge or duplicate node id in a tree.
    MalformedTree,
    /// Tree generation requested without any verified fact.
    InsufficientFacts,
    /// Timeout or transport failure calling an AI collaborator.
    AiServiceUnavailable,
    /// AI collaborator answered with an unusable shape.
    AiResponseInvalid,
    /// Caller input rejected.
    Validation,
    /// Persistence failure.
    Storage,
    /// Anything else.
    Internal,
}

impl AppError {
    /// Classify the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Tree(TreeError::NodeNotFound { .. }) => ErrorKind::NotFound,
            AppError::Tree(TreeError::InvalidEdge { .. }) => ErrorKind::InvalidEdge,
            AppError::Tree(TreeError::MalformedTree { .. }) => ErrorKind::MalformedTree,
            AppError::Ai(AiError::Unavailable { .. }) => ErrorKind::AiServiceUnavailable,
            AppError::Ai(AiError::InvalidResponse { .. }) => ErrorKind::AiResponseInvalid,
            AppError::Workflow(err) => match err {
                WorkflowError::AccidentNotFound { .. }
                | WorkflowError::FragmentNotFound { .. }
                | WorkflowError::EvidenceNotFound { .. }
                | WorkflowError::WitnessNotFound { .. } => ErrorKind::NotFound,
                WorkflowError::InsufficientFacts { .. } => ErrorKind::InsufficientFacts,
                WorkflowError::StageNotReached { .. } | WorkflowError::Validation { .. } => {
                    ErrorKind::Validation
                }
            },
            AppError::Storage(StorageError::MalformedTree(_)) => ErrorKind::MalformedTree,
            AppError::Storage(_) => ErrorKind::Storage,
            AppError::Langbase(_) => ErrorKind::AiServiceUnavailable,
            AppError::Config { .. } | AppError::Mcp(_) | AppError::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::AiServiceUnavailable
    }
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        let message = if err.is_retryable() {
            format!("{} (the AI service can be retried)", err)
        } else {
            err.to_string()
        };
        McpError::ExecutionFailed { message }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for graph engine operations
pub type TreeResult<T> = Result<T, TreeError>;

/// Result type alias for AI boundary operations
pub type AiResult<T> = Result<T, AiError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for Langbase operations
pub type LangbaseResult<T> = Result<T, LangbaseError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;
