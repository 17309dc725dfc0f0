use async_trait::async_trait;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    completion_to_value, from_langbase, invalid, ClassificationRequest, ClassifiedFragment,
    TestimonyAnalysis, TestimonyClassifier, CLASSIFIER_SERVICE,
};
use crate::error::AiResult;
use crate::fragments::FragmentCategory;
use crate::langbase::{LangbaseClient, Message, PipeDefinition, PipeRequest};
use crate::prompts::{testimony_message, TESTIMONY_CLASSIFIER_PROMPT};

const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_SUMMARY: &str = "Analyse non disponible";

/// Validate a raw classifier response.
///
/// Only a missing or non-array `fragments` field is fatal; every other field
/// falls back to a default.
pub fn validate_testimony_analysis(value: &Value) -> AiResult<TestimonyAnalysis> {
    let fragments = value
        .get("fragments")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid(CLASSIFIER_SERVICE, "missing 'fragments' array"))?;

    let fragments = fragments
        .iter()
        .map(|raw| ClassifiedFragment {
            content: raw
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            category: raw
                .get("type")
                .and_then(Value::as_str)
                .map(FragmentCategory::parse_lossy)
                .unwrap_or_default(),
            confidence: raw
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0),
            reasoning: raw
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
        .collect();

    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SUMMARY)
        .to_string();

    let recommendations = value
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(TestimonyAnalysis {
        fragments,
        summary,
        recommendations,
    })
}

/// Testimony classifier backed by a Langbase pipe.
#[derive(Clone)]
pub struct LangbaseTestimonyClassifier {
    client: LangbaseClient,
    pipe_name: String,
}

impl LangbaseTestimonyClassifier {
    /// Create a classifier calling `pipe_name`
    pub fn new(client: LangbaseClient, pipe_name: impl Into<String>) -> Self {
        Self {
            client,
            pipe_name: pipe_name.into(),
        }
    }

    /// Pipe definition to upsert at start-up.
    pub fn definition(pipe_name: impl Into<String>) -> PipeDefinition {
        PipeDefinition {
            name: pipe_name.into(),
            description: "Classifie les témoignages d'accidents selon la méthode INRS",
            system_prompt: TESTIMONY_CLASSIFIER_PROMPT,
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

#[async_trait]
impl TestimonyClassifier for LangbaseTestimonyClassifier {
    async fn classify(&self, request: ClassificationRequest) -> AiResult<TestimonyAnalysis> {
        let start = Instant::now();
        debug!(pipe = %self.pipe_name, "Classifying testimony");

        let messages = vec![
            Message::system(TESTIMONY_CLASSIFIER_PROMPT),
            Message::user(testimony_message(
                &request.testimony,
                request.accident_context.as_deref(),
            )),
        ];
        let response = self
            .client
            .call_pipe(PipeRequest::new(&self.pipe_name, messages))
            .await
            .map_err(|e| from_langbase(CLASSIFIER_SERVICE, e))?;

        let value = completion_to_value(CLASSIFIER_SERVICE, &response.completion)?;
        let analysis = validate_testimony_analysis(&value)?;

        info!(
            pipe = %self.pipe_name,
            fragments = analysis.fragments.len(),
            latency_ms = start.elapsed().as_millis(),
            "Testimony classified"
        );
        Ok(analysis)
    }
}
