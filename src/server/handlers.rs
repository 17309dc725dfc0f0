use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::SharedState;
use crate::error::{AppError, McpError, McpResult};
use crate::evidence::{EvidenceDraft, EvidenceUpdate};
use crate::fragments::{FragmentCategory, FragmentDraft};
use crate::tree::{
    CauseNode, CauseTree, MeasureUpdate, NodeCategory, NodePatch, Position, PreventiveMeasure,
    Priority, Relation,
};
use crate::workflow::{AccidentDeclaration, AccidentUpdate, WitnessDraft};

/// Route tool calls to appropriate handlers
pub async fn handle_tool_call(
    state: &SharedState,
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<Value> {
    info!(tool = %tool_name, "Routing tool call");

    match tool_name {
        // Accidents and witnesses
        "accident_declare" => handle_accident_declare(state, arguments).await,
        "accident_get" => handle_accident_get(state, arguments).await,
        "accident_update" => handle_accident_update(state, arguments).await,
        "accident_list" => handle_accident_list(state).await,
        "witness_add" => handle_witness_add(state, arguments).await,
        "witness_list" => handle_witness_list(state, arguments).await,
        // Testimony and fragments
        "testimony_analyze" => handle_testimony_analyze(state, arguments).await,
        "fragment_record" => handle_fragment_record(state, arguments).await,
        "fragment_add" => handle_fragment_add(state, arguments).await,
        "fragment_reclassify" => handle_fragment_reclassify(state, arguments).await,
        "fragment_mark_unusual" => handle_fragment_mark_unusual(state, arguments).await,
        "fragment_counts" => handle_fragment_counts(state, arguments).await,
        "fragment_list" => handle_fragment_list(state, arguments).await,
        // Material evidence
        "evidence_add" => handle_evidence_add(state, arguments).await,
        "evidence_update" => handle_evidence_update(state, arguments).await,
        "evidence_list" => handle_evidence_list(state, arguments).await,
        // Summary and cause tree
        "summary_validate" => handle_summary_validate(state, arguments).await,
        "tree_generate" => handle_tree_generate(state, arguments).await,
        "tree_get" => handle_tree_get(state, arguments).await,
        "tree_save" => handle_tree_save(state, arguments).await,
        "tree_add_node" => handle_tree_add_node(state, arguments).await,
        "tree_update_node" => handle_tree_update_node(state, arguments).await,
        "tree_delete_node" => handle_tree_delete_node(state, arguments).await,
        "tree_add_edge" => handle_tree_add_edge(state, arguments).await,
        "tree_remove_edge" => handle_tree_remove_edge(state, arguments).await,
        "tree_coverage" => handle_tree_coverage(state, arguments).await,
        "measure_upsert" => handle_measure_upsert(state, arguments).await,
        // Export and dashboard
        "analysis_export" => handle_analysis_export(state, arguments).await,
        "analysis_stats" => handle_analysis_stats(state).await,
        _ => Err(McpError::UnknownTool {
            tool_name: tool_name.to_string(),
        }),
    }
}

// ============================================================================
// Parameter types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AccidentIdParams {
    accident_id: String,
}

#[derive(Debug, Deserialize)]
struct AccidentUpdateParams {
    accident_id: String,
    #[serde(flatten)]
    update: AccidentUpdate,
}

#[derive(Debug, Deserialize)]
struct WitnessAddParams {
    accident_id: String,
    #[serde(flatten)]
    witness: WitnessDraft,
}

#[derive(Debug, Deserialize)]
struct TestimonyParams {
    accident_id: String,
    testimony: String,
    #[serde(default)]
    accident_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FragmentRecordParams {
    accident_id: String,
    fragments: Vec<FragmentDraft>,
}

#[derive(Debug, Deserialize)]
struct FragmentAddParams {
    accident_id: String,
    #[serde(flatten)]
    fragment: FragmentDraft,
}

#[derive(Debug, Deserialize)]
struct ReclassifyParams {
    fragment_id: String,
    #[serde(rename = "type", alias = "category")]
    category: FragmentCategory,
}

#[derive(Debug, Deserialize)]
struct MarkUnusualParams {
    fragment_id: String,
    is_unusual: bool,
}

#[derive(Debug, Deserialize)]
struct EvidenceAddParams {
    accident_id: String,
    #[serde(flatten)]
    evidence: EvidenceDraft,
}

#[derive(Debug, Deserialize)]
struct EvidenceUpdateParams {
    evidence_id: String,
    #[serde(flatten)]
    update: EvidenceUpdate,
}

#[derive(Debug, Deserialize)]
struct TreeSaveParams {
    accident_id: String,
    nodes: Vec<CauseNode>,
    #[serde(default, alias = "preventiveMeasures")]
    preventive_measures: Vec<PreventiveMeasure>,
}

fn default_coordinate() -> f64 {
    100.0
}

#[derive(Debug, Deserialize)]
struct AddNodeParams {
    accident_id: String,
    content: String,
    #[serde(default, rename = "type", alias = "category")]
    category: NodeCategory,
    #[serde(default = "default_coordinate")]
    x: f64,
    #[serde(default = "default_coordinate")]
    y: f64,
}

#[derive(Debug, Deserialize)]
struct UpdateNodeParams {
    accident_id: String,
    node_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "type", alias = "category")]
    category: Option<NodeCategory>,
    #[serde(default)]
    x: Option<f64>,
    #[serde(default)]
    y: Option<f64>,
}

impl UpdateNodeParams {
    fn into_patch(self) -> Result<(String, String, NodePatch), String> {
        let position = match (self.x, self.y) {
            (Some(x), Some(y)) => Some(Position::new(x, y)),
            (None, None) => None,
            _ => return Err("x and y must be given together".to_string()),
        };
        let patch = NodePatch {
            content: self.content,
            category: self.category,
            position,
        };
        Ok((self.accident_id, self.node_id, patch))
    }
}

#[derive(Debug, Deserialize)]
struct NodeIdParams {
    accident_id: String,
    node_id: String,
}

#[derive(Debug, Deserialize)]
struct AddEdgeParams {
    accident_id: String,
    from: String,
    to: String,
    #[serde(rename = "type", alias = "relation")]
    relation: Relation,
}

#[derive(Debug, Deserialize)]
struct RemoveEdgeParams {
    accident_id: String,
    from: String,
    to: String,
    #[serde(default, rename = "type", alias = "relation")]
    relation: Option<Relation>,
}

#[derive(Debug, Deserialize)]
struct MeasureUpsertParams {
    accident_id: String,
    #[serde(alias = "factId")]
    fact_id: String,
    #[serde(default, alias = "canEliminate")]
    can_eliminate: Option<bool>,
    #[serde(default, alias = "canReduce")]
    can_reduce: Option<bool>,
    #[serde(default)]
    measure: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
}

#[derive(Debug, Serialize)]
struct EdgeRemoval {
    removed: usize,
}

// ============================================================================
// Accidents and witnesses
// ============================================================================

async fn handle_accident_declare(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("accident_declare", arguments, |params: AccidentDeclaration| {
        state.workflow.declare_accident(params)
    })
    .await
}

async fn handle_accident_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("accident_get", arguments, |p: AccidentIdParams| async move {
        state.workflow.get_accident(&p.accident_id).await
    })
    .await
}

async fn handle_accident_update(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("accident_update", arguments, |p: AccidentUpdateParams| async move {
        state.workflow.update_accident(&p.accident_id, p.update).await
    })
    .await
}

async fn handle_accident_list(state: &SharedState) -> McpResult<Value> {
    let accidents = state.workflow.list_accidents().await.map_err(McpError::from)?;
    serde_json::to_value(accidents).map_err(McpError::Json)
}

async fn handle_witness_add(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("witness_add", arguments, |p: WitnessAddParams| async move {
        state.workflow.add_witness(&p.accident_id, p.witness).await
    })
    .await
}

async fn handle_witness_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("witness_list", arguments, |p: AccidentIdParams| async move {
        state.workflow.list_witnesses(&p.accident_id).await
    })
    .await
}

// ============================================================================
// Testimony and fragments
// ============================================================================

async fn handle_testimony_analyze(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("testimony_analyze", arguments, |p: TestimonyParams| async move {
        state
            .workflow
            .analyze_testimony(&p.accident_id, &p.testimony, p.accident_context)
            .await
    })
    .await
}

async fn handle_fragment_record(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("fragment_record", arguments, |p: FragmentRecordParams| async move {
        state.workflow.record_fragments(&p.accident_id, p.fragments).await
    })
    .await
}

async fn handle_fragment_add(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("fragment_add", arguments, |p: FragmentAddParams| async move {
        state.workflow.add_fragment(&p.accident_id, p.fragment).await
    })
    .await
}

async fn handle_fragment_reclassify(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("fragment_reclassify", arguments, |p: ReclassifyParams| async move {
        state
            .workflow
            .reclassify_fragment(&p.fragment_id, p.category)
            .await
    })
    .await
}

async fn handle_fragment_mark_unusual(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("fragment_mark_unusual", arguments, |p: MarkUnusualParams| async move {
        state.workflow.mark_unusual(&p.fragment_id, p.is_unusual).await
    })
    .await
}

async fn handle_fragment_counts(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("fragment_counts", arguments, |p: AccidentIdParams| async move {
        state.workflow.fragment_counts(&p.accident_id).await
    })
    .await
}

async fn handle_fragment_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("fragment_list", arguments, |p: AccidentIdParams| async move {
        state.workflow.list_fragments(&p.accident_id).await
    })
    .await
}

// ============================================================================
// Material evidence
// ============================================================================

async fn handle_evidence_add(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("evidence_add", arguments, |p: EvidenceAddParams| async move {
        state.workflow.add_evidence(&p.accident_id, p.evidence).await
    })
    .await
}

async fn handle_evidence_update(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("evidence_update", arguments, |p: EvidenceUpdateParams| async move {
        state.workflow.update_evidence(&p.evidence_id, p.update).await
    })
    .await
}

async fn handle_evidence_list(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("evidence_list", arguments, |p: AccidentIdParams| async move {
        state.workflow.list_evidence(&p.accident_id).await
    })
    .await
}

// ============================================================================
// Summary and cause tree
// ============================================================================

async fn handle_summary_validate(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("summary_validate", arguments, |p: AccidentIdParams| async move {
        state.workflow.validate_summary(&p.accident_id).await
    })
    .await
}

async fn handle_tree_generate(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_generate", arguments, |p: AccidentIdParams| async move {
        state.workflow.generate_tree(&p.accident_id).await
    })
    .await
}

async fn handle_tree_get(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_get", arguments, |p: AccidentIdParams| async move {
        state.workflow.get_tree(&p.accident_id).await
    })
    .await
}

/// Replace the tree as a whole. Structural errors in the submitted node set
/// surface as tool errors, the stored tree is left as it was.
async fn handle_tree_save(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_save", arguments, |p: TreeSaveParams| async move {
        let tree = CauseTree::from_parts(p.accident_id, p.nodes, p.preventive_measures)
            .map_err(AppError::from)?;
        state.workflow.save_tree(tree).await
    })
    .await
}

async fn handle_tree_add_node(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_add_node", arguments, |p: AddNodeParams| async move {
        state
            .workflow
            .add_node(&p.accident_id, &p.content, p.category, Position::new(p.x, p.y))
            .await
    })
    .await
}

async fn handle_tree_update_node(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    let params: UpdateNodeParams = parse_arguments("tree_update_node", arguments)?;
    let (accident_id, node_id, patch) =
        params
            .into_patch()
            .map_err(|message| McpError::InvalidParameters {
                tool_name: "tree_update_node".to_string(),
                message,
            })?;

    let node = state
        .workflow
        .update_node(&accident_id, &node_id, patch)
        .await
        .map_err(McpError::from)?;

    serde_json::to_value(node).map_err(McpError::Json)
}

async fn handle_tree_delete_node(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("tree_delete_node", arguments, |p: NodeIdParams| async move {
        state.workflow.delete_node(&p.accident_id, &p.node_id).await
    })
    .await
}

async fn handle_tree_add_edge(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_add_edge", arguments, |p: AddEdgeParams| async move {
        state
            .workflow
            .add_edge(&p.accident_id, &p.from, &p.to, p.relation)
            .await
    })
    .await
}

async fn handle_tree_remove_edge(
    state: &SharedState,
    arguments: Option<Value>,
) -> McpResult<Value> {
    execute_handler("tree_remove_edge", arguments, |p: RemoveEdgeParams| async move {
        state
            .workflow
            .remove_edge(&p.accident_id, &p.from, &p.to, p.relation)
            .await
            .map(|removed| EdgeRemoval { removed })
    })
    .await
}

async fn handle_tree_coverage(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("tree_coverage", arguments, |p: AccidentIdParams| async move {
        state.workflow.measure_coverage(&p.accident_id).await
    })
    .await
}

async fn handle_measure_upsert(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("measure_upsert", arguments, |p: MeasureUpsertParams| async move {
        let update = MeasureUpdate {
            can_eliminate: p.can_eliminate,
            can_reduce: p.can_reduce,
            measure: p.measure,
            priority: p.priority,
        };
        state
            .workflow
            .upsert_measure(&p.accident_id, &p.fact_id, update)
            .await
    })
    .await
}

// ============================================================================
// Export and dashboard
// ============================================================================

async fn handle_analysis_export(state: &SharedState, arguments: Option<Value>) -> McpResult<Value> {
    execute_handler("analysis_export", arguments, |p: AccidentIdParams| async move {
        state.workflow.export_snapshot(&p.accident_id).await
    })
    .await
}

async fn handle_analysis_stats(state: &SharedState) -> McpResult<Value> {
    let stats = state.workflow.statistics().await.map_err(McpError::from)?;
    serde_json::to_value(stats).map_err(McpError::Json)
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: Option<Value>,
) -> McpResult<T> {
    match arguments {
        Some(args) => serde_json::from_value(args).map_err(|e| McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        }),
        None => Err(McpError::InvalidParameters {
            tool_name: tool_name.to_string(),
            message: "Missing arguments".to_string(),
        }),
    }
}

/// Parse typed arguments, run one workflow operation and serialize its result.
///
/// Workflow errors keep their message; AI availability failures get a retry
/// hint through the `From<AppError>` conversion.
async fn execute_handler<P, R, F, Fut>(
    tool_name: &str,
    arguments: Option<Value>,
    operation: F,
) -> McpResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, AppError>>,
{
    let params: P = parse_arguments(tool_name, arguments)?;

    let result = operation(params).await.map_err(McpError::from)?;

    serde_json::to_value(result).map_err(McpError::Json)
}
