use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    completion_to_value, from_langbase, invalid, GeneratedTree, GenerationRequest, TreeGenerator,
    GENERATOR_SERVICE,
};
use crate::error::AiResult;
use crate::langbase::{LangbaseClient, Message, PipeDefinition, PipeRequest};
use crate::prompts::{cause_tree_message, CAUSE_TREE_GENERATOR_PROMPT};
use crate::tree::{
    validate_nodes, CauseEdge, CauseNode, NodeCategory, Position, PreventiveMeasure, Priority,
    Relation,
};

const DEFAULT_FACT: &str = "Fait non spécifié";

fn default_position(index: usize) -> Position {
    Position::new(100.0 + 150.0 * index as f64, 100.0 + 100.0 * (index % 3) as f64)
}

fn explicit_id(raw: &Value) -> Option<&str> {
    raw.get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// First `node-<n>` from `index + 1` upwards that is not taken yet.
fn fallback_id(index: usize, taken: &mut HashSet<String>) -> String {
    let mut n = index + 1;
    loop {
        let candidate = format!("node-{}", n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn parse_node(index: usize, raw: &Value, taken: &mut HashSet<String>) -> AiResult<CauseNode> {
    let id = match explicit_id(raw) {
        Some(id) => id.to_string(),
        None => fallback_id(index, taken),
    };

    let content = raw
        .get("content")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_FACT)
        .to_string();

    let category = raw
        .get("type")
        .and_then(Value::as_str)
        .map(NodeCategory::parse_lossy)
        .unwrap_or_default();

    let fallback = default_position(index);
    let position = Position::new(
        raw.get("x").and_then(Value::as_f64).unwrap_or(fallback.x).max(0.0),
        raw.get("y").and_then(Value::as_f64).unwrap_or(fallback.y).max(0.0),
    );

    let connections = match raw.get("connections") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|edge| parse_edge(&id, edge))
            .collect::<AiResult<Vec<_>>>()?,
        Some(_) => {
            return Err(invalid(
                GENERATOR_SERVICE,
                format!("connections of node '{}' is not an array", id),
            ))
        }
    };

    Ok(CauseNode {
        id,
        content,
        category,
        position,
        connections,
    })
}

fn parse_edge(from: &str, raw: &Value) -> AiResult<CauseEdge> {
    let to = raw
        .get("to")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(GENERATOR_SERVICE, format!("edge from '{}' has no target", from)))?;
    let relation = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .parse::<Relation>()
        .map_err(|e| invalid(GENERATOR_SERVICE, format!("edge {} -> {}: {}", from, to, e)))?;

    Ok(CauseEdge {
        to: to.to_string(),
        relation,
    })
}

fn parse_measure(raw: &Value, node: &CauseNode) -> PreventiveMeasure {
    PreventiveMeasure {
        fact_id: node.id.clone(),
        fact_content: raw
            .get("factContent")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(node.content.as_str())
            .to_string(),
        can_eliminate: raw.get("canEliminate").and_then(Value::as_bool).unwrap_or(false),
        can_reduce: raw.get("canReduce").and_then(Value::as_bool).unwrap_or(false),
        measure: raw
            .get("measure")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        priority: raw
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::parse_lossy)
            .unwrap_or_default(),
    }
}

/// Validate a raw generator response.
///
/// Nodes must form a valid tree. Measures pointing outside the node set, or
/// repeating a fact that already has one, are dropped and reported in
/// [`GeneratedTree::warnings`].
pub fn validate_generated_tree(value: &Value) -> AiResult<GeneratedTree> {
    let raw_nodes = value
        .get("nodes")
        .and_then(Value::as_array)
        .filter(|nodes| !nodes.is_empty())
        .ok_or_else(|| invalid(GENERATOR_SERVICE, "missing or empty 'nodes' array"))?;

    let mut taken: HashSet<String> = raw_nodes
        .iter()
        .filter_map(explicit_id)
        .map(str::to_string)
        .collect();
    let nodes = raw_nodes
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_node(index, raw, &mut taken))
        .collect::<AiResult<Vec<_>>>()?;
    validate_nodes(&nodes).map_err(|e| invalid(GENERATOR_SERVICE, e.to_string()))?;

    let raw_measures = value
        .get("preventiveMeasures")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut measures = Vec::with_capacity(raw_measures.len());
    let mut warnings = Vec::new();
    let mut covered = HashSet::new();

    for (index, raw) in raw_measures.iter().enumerate() {
        let fact_id = raw.get("factId").and_then(Value::as_str).unwrap_or_default();
        let Some(node) = nodes.iter().find(|n| n.id == fact_id) else {
            let warning = format!(
                "Dropped preventive measure #{}: fact '{}' is not in the generated tree",
                index + 1,
                fact_id
            );
            warn!(fact_id = %fact_id, "{}", warning);
            warnings.push(warning);
            continue;
        };
        if !covered.insert(node.id.clone()) {
            let warning = format!(
                "Dropped preventive measure #{}: fact '{}' already has a measure",
                index + 1,
                fact_id
            );
            warn!(fact_id = %fact_id, "{}", warning);
            warnings.push(warning);
            continue;
        }
        measures.push(parse_measure(raw, node));
    }

    Ok(GeneratedTree {
        nodes,
        measures,
        warnings,
    })
}

/// Cause-tree generator backed by a Langbase pipe.
#[derive(Clone)]
pub struct LangbaseTreeGenerator {
    client: LangbaseClient,
    pipe_name: String,
}

impl LangbaseTreeGenerator {
    /// Create a generator calling `pipe_name`
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
            description: "Génère un arbre des causes INRS et des mesures de prévention",
            system_prompt: CAUSE_TREE_GENERATOR_PROMPT,
            temperature: 0.4,
            max_tokens: 4000,
        }
    }
}

#[async_trait]
impl TreeGenerator for LangbaseTreeGenerator {
    async fn generate(&self, request: GenerationRequest) -> AiResult<GeneratedTree> {
        let start = Instant::now();
        debug!(pipe = %self.pipe_name, facts = request.facts.len(), "Generating cause tree");

        let messages = vec![
            Message::system(CAUSE_TREE_GENERATOR_PROMPT),
            Message::user(cause_tree_message(
                &request.facts,
                &request.accident_description,
            )),
        ];
        let response = self
            .client
            .call_pipe(PipeRequest::new(&self.pipe_name, messages))
            .await
            .map_err(|e| from_langbase(GENERATOR_SERVICE, e))?;

        let value = completion_to_value(GENERATOR_SERVICE, &response.completion)?;
        let generated = validate_generated_tree(&value)?;

        info!(
            pipe = %self.pipe_name,
            nodes = generated.nodes.len(),
            measures = generated.measures.len(),
            dropped = generated.warnings.len(),
            latency_ms = start.elapsed().as_millis(),
            "Cause tree generated"
        );
        Ok(generated)
    }
}
