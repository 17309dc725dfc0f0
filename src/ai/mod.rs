//! AI consumption boundary.
//!
//! The orchestrator talks to two collaborators through the
//! [`TestimonyClassifier`] and [`TreeGenerator`] traits. Whatever comes back
//! from the model is validated here before it reaches the core: responses are
//! parsed from loose JSON, defaults are filled in and anything structurally
//! unusable becomes [`AiError::InvalidResponse`].

mod classifier;
mod generator;

pub use classifier::*;
pub use generator::*;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AiError, AiResult, LangbaseError};
use crate::fragments::FragmentCategory;
use crate::tree::{CauseNode, PreventiveMeasure};

/// Service name used in errors and logs for the classifier.
pub const CLASSIFIER_SERVICE: &str = "testimony classifier";
/// Service name used in errors and logs for the generator.
pub const GENERATOR_SERVICE: &str = "cause tree generator";

/// Input of a testimony classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub testimony: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accident_context: Option<String>,
}

/// A fragment suggested by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedFragment {
    pub content: String,
    #[serde(rename = "type")]
    pub category: FragmentCategory,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub reasoning: String,
}

/// Validated classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestimonyAnalysis {
    pub fragments: Vec<ClassifiedFragment>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

/// Input of a cause-tree generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub facts: Vec<String>,
    pub accident_description: String,
}

/// Validated generator output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedTree {
    /// Non-empty, structurally valid node set.
    pub nodes: Vec<CauseNode>,
    /// Measures whose fact is in `nodes`.
    pub measures: Vec<PreventiveMeasure>,
    /// One entry per measure dropped during validation.
    pub warnings: Vec<String>,
}

/// Splits testimony into classified fragments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TestimonyClassifier: Send + Sync {
    /// Classify a testimony.
    async fn classify(&self, request: ClassificationRequest) -> AiResult<TestimonyAnalysis>;
}

/// Builds a cause tree from verified facts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TreeGenerator: Send + Sync {
    /// Generate nodes and measures.
    async fn generate(&self, request: GenerationRequest) -> AiResult<GeneratedTree>;
}

/// Extract the JSON body from a completion, handling markdown code fences.
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty".to_string());
    }

    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Parse a completion into a JSON value, reporting failures as invalid responses.
pub(crate) fn completion_to_value(service: &str, completion: &str) -> AiResult<serde_json::Value> {
    let json = extract_json_from_completion(completion).map_err(|message| invalid(service, message))?;
    serde_json::from_str(json).map_err(|e| invalid(service, format!("Failed to parse JSON: {}", e)))
}

pub(crate) fn invalid(service: &str, message: impl Into<String>) -> AiError {
    AiError::InvalidResponse {
        service: service.to_string(),
        message: message.into(),
    }
}

/// Map a transport error onto the AI boundary.
///
/// A decodable-but-wrong response is the only case that is not retryable.
pub(crate) fn from_langbase(service: &str, err: LangbaseError) -> AiError {
    match err {
        LangbaseError::InvalidResponse { message } => invalid(service, message),
        other => AiError::Unavailable {
            service: service.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        assert_eq!(extract_json_from_completion("  {\"a\":1} ").unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_json_fenced() {
        let completion = "Voici l'analyse:\n```json\n{\"fragments\": []}\n```\nFin.";
        assert_eq!(
            extract_json_from_completion(completion).unwrap(),
            "{\"fragments\": []}"
        );

        let completion = "```\n{\"nodes\": []}\n```";
        assert_eq!(extract_json_from_completion(completion).unwrap(), "{\"nodes\": []}");
    }

    #[test]
    fn test_extract_json_missing() {
        let err = extract_json_from_completion("Je ne peux pas répondre").unwrap_err();
        assert!(err.contains("No JSON found"));
    }

    #[test]
    fn test_completion_to_value_reports_invalid_json() {
        let err = completion_to_value(CLASSIFIER_SERVICE, "{not json").unwrap_err();
        assert!(matches!(err, AiError::InvalidResponse { .. }));
    }

    #[test]
    fn test_from_langbase_mapping() {
        let err = from_langbase(
            GENERATOR_SERVICE,
            LangbaseError::Timeout { timeout_ms: 30000 },
        );
        assert!(matches!(err, AiError::Unavailable { .. }));

        let err = from_langbase(
            GENERATOR_SERVICE,
            LangbaseError::InvalidResponse {
                message: "bad".to_string(),
            },
        );
        assert!(matches!(err, AiError::InvalidResponse { .. }));
    }
}
