use serde::{Deserialize, Serialize};

/// Message in a Langbase conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Message role. The server only ever sends system and user turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Body of `POST /v1/pipes/run`.
#[derive(Debug, Clone, Serialize)]
pub struct PipeRequest {
    pub name: String,
    pub messages: Vec<Message>,
    /// Always false: completions are read in one piece.
    pub stream: bool,
}

impl PipeRequest {
    /// Build a non-streaming run request
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            stream: false,
        }
    }
}

/// Answer of a pipe run. `completion` holds the model text.
#[derive(Debug, Clone, Deserialize)]
pub struct PipeResponse {
    pub success: bool,
    pub completion: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    pub raw: Option<RawCompletion>,
}

/// Provider details attached to a completion.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCompletion {
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl PipeResponse {
    /// Total tokens consumed, when the pipe reports usage.
    pub fn total_tokens(&self) -> Option<u32> {
        self.raw
            .as_ref()
            .and_then(|raw| raw.usage.as_ref())
            .and_then(|usage| usage.total_tokens)
    }
}

/// Static definition of a pipe the server relies on.
#[derive(Debug, Clone)]
pub struct PipeDefinition {
    pub name: String,
    pub description: &'static str,
    pub system_prompt: &'static str,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Pipe visibility on Langbase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipeStatus {
    Public,
    Private,
}

/// Body of `POST /v1/pipes`, always sent as an upsert in JSON mode.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePipeRequest {
    pub name: String,
    pub description: String,
    pub status: PipeStatus,
    pub model: String,
    pub upsert: bool,
    pub json: bool,
    pub temperature: f64,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

impl From<&PipeDefinition> for CreatePipeRequest {
    fn from(def: &PipeDefinition) -> Self {
        Self {
            name: def.name.clone(),
            description: def.description.to_string(),
            status: PipeStatus::Private,
            model: super::DEFAULT_MODEL.to_string(),
            upsert: true,
            json: true,
            temperature: def.temperature,
            max_tokens: def.max_tokens,
            messages: vec![Message::system(def.system_prompt)],
        }
    }
}

/// Answer of a pipe creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePipeResponse {
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub url: String,
}
