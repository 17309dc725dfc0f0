//! MCP protocol implementation for JSON-RPC 2.0 communication.
//!
//! This module provides the core MCP server implementation including:
//! - JSON-RPC 2.0 request/response handling
//! - Tool definitions and schemas
//! - Stdio-based server communication

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_tool_call, SharedState};

#[cfg(test)]
#[path = "mcp_tests.rs"]
mod mcp_tests;

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier, null when the request could not be read.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// MCP server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// MCP server capabilities advertised to clients.
#[derive(Debug, Serialize)]
pub struct Capabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
}

/// Tool-specific capabilities.
#[derive(Debug, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change dynamically.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Result of the MCP initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// The MCP protocol version supported.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: Capabilities,
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

/// MCP tool definition with JSON Schema.
#[derive(Debug, Clone, Serialize)]
pub struct Tool {
    /// Unique tool name (used in tool calls).
    pub name: String,
    /// Human-readable description of the tool.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters for a tools/call request.
#[derive(Debug, Deserialize)]
pub struct ToolCallParams {
    /// The name of the tool to invoke.
    pub name: String,
    /// Optional arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Content item within a tool result.
#[derive(Debug, Serialize)]
pub struct ToolResultContent {
    /// The content type (e.g., "text").
    #[serde(rename = "type")]
    pub content_type: String,
    /// The text content of the result.
    pub text: String,
}

/// Result of a tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    /// The result content items.
    pub content: Vec<ToolResultContent>,
    /// Whether the result represents an error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// MCP Server running over stdio.
///
/// Reads one JSON-RPC message per line from stdin and writes responses to
/// stdout. Logs go to stderr.
pub struct McpServer {
    state: SharedState,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("INRS cause tree server starting...");

        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            if let Some(response) = self.handle_line(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                stdout.write_all(response_json.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle one raw input line.
    /// Returns None when no response must be sent.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    -32700,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request
    /// Returns None for notifications (requests without id)
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();

        match request.method.as_str() {
            "initialize" => Some(self.handle_initialize(request.id)),
            "initialized" | "notifications/initialized" => {
                debug!("Received initialized notification");
                None
            }
            "notifications/cancelled" => {
                debug!("Received cancelled notification");
                None
            }
            "tools/list" => Some(self.handle_tools_list(request.id)),
            "tools/call" => Some(self.handle_tool_call(request.id, request.params).await),
            "ping" => Some(JsonRpcResponse::success(
                request.id,
                Value::Object(Default::default()),
            )),
            method => {
                if is_notification {
                    debug!(method = %method, "Unknown notification, ignoring");
                    None
                } else {
                    error!(method = %method, "Unknown method");
                    Some(JsonRpcResponse::error(
                        request.id,
                        -32601,
                        format!("Method not found: {}", method),
                    ))
                }
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            protocol_version: "2024-11-05".to_string(),
            capabilities: Capabilities {
                tools: ToolCapabilities {
                    list_changed: false,
                },
            },
            server_info: ServerInfo {
                name: "inrs-cause-tree".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize initialize result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling tools/list request");

        JsonRpcResponse::success(id, json!({ "tools": tool_definitions() }))
    }

    async fn handle_tool_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e));
                }
            },
            None => {
                return JsonRpcResponse::error(id, -32602, "Missing params");
            }
        };

        info!(tool = %params.name, "Handling tool call");

        let (text, is_error) =
            match handle_tool_call(&self.state, &params.name, params.arguments).await {
                Ok(result) => {
                    let text = serde_json::to_string_pretty(&result).unwrap_or_else(|e| {
                        error!(error = %e, "Failed to serialize tool result");
                        format!("{{\"error\": \"Serialization failed: {}\"}}", e)
                    });
                    (text, None)
                }
                Err(e) => {
                    debug!(tool = %params.name, error = %e, "Tool call failed");
                    (format!("Error: {}", e), Some(true))
                }
            };

        let tool_result = ToolCallResult {
            content: vec![ToolResultContent {
                content_type: "text".to_string(),
                text,
            }],
            is_error,
        };

        match serde_json::to_value(tool_result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => {
                error!(error = %e, "Failed to serialize tool call result");
                JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
            }
        }
    }
}

/// Every tool the server advertises, in workflow order.
pub fn tool_definitions() -> Vec<Tool> {
    vec![
        // Accidents and witnesses
        get_accident_declare_tool(),
        get_accident_get_tool(),
        get_accident_update_tool(),
        get_accident_list_tool(),
        get_witness_add_tool(),
        get_witness_list_tool(),
        // Testimony and fragments
        get_testimony_analyze_tool(),
        get_fragment_record_tool(),
        get_fragment_add_tool(),
        get_fragment_reclassify_tool(),
        get_fragment_mark_unusual_tool(),
        get_fragment_counts_tool(),
        get_fragment_list_tool(),
        // Material evidence
        get_evidence_add_tool(),
        get_evidence_update_tool(),
        get_evidence_list_tool(),
        // Summary and cause tree
        get_summary_validate_tool(),
        get_tree_generate_tool(),
        get_tree_get_tool(),
        get_tree_save_tool(),
        get_tree_add_node_tool(),
        get_tree_update_node_tool(),
        get_tree_delete_node_tool(),
        get_tree_add_edge_tool(),
        get_tree_remove_edge_tool(),
        get_tree_coverage_tool(),
        get_measure_upsert_tool(),
        // Export and dashboard
        get_analysis_export_tool(),
        get_analysis_stats_tool(),
    ]
}

fn accident_id_schema() -> Value {
    json!({
        "type": "string",
        "description": "Accident ID"
    })
}

fn only_accident_id() -> Value {
    json!({
        "type": "object",
        "properties": {
            "accident_id": accident_id_schema()
        },
        "required": ["accident_id"]
    })
}

fn no_arguments() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false
    })
}

fn witness_properties() -> Value {
    json!({
        "first_name": { "type": "string" },
        "last_name": { "type": "string" },
        "position": { "type": "string", "description": "Job title of the witness" },
        "testimony": { "type": "string", "description": "Raw testimony text" }
    })
}

fn fragment_category_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["verified_fact", "opinion", "to_verify", "other"],
        "description": "Fragment category"
    })
}

fn node_category_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["necessary", "unusual", "normal"],
        "description": "Kind of fact"
    })
}

fn relation_schema() -> Value {
    json!({
        "type": "string",
        "enum": ["sequence", "conjunction", "disjunction"],
        "description": "Causal relation: sequence (→), conjunction (+) or disjunction (×)"
    })
}

fn file_ref_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_name": { "type": "string" },
            "file_url": { "type": "string" }
        },
        "required": ["file_name", "file_url"]
    })
}

fn get_accident_declare_tool() -> Tool {
    Tool {
        name: "accident_declare".to_string(),
        description: "Declare a workplace accident. Assigns an ACC-<year>-<NNN> number and records the initial witnesses.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "format": "date", "description": "Accident date (YYYY-MM-DD)" },
                "time": { "type": "string", "description": "Accident time (HH:MM)" },
                "location": { "type": "string" },
                "establishment": { "type": "string" },
                "description": { "type": "string" },
                "severity": { "type": "string", "enum": ["minor", "moderate", "severe"] },
                "victim_name": { "type": "string" },
                "victim_first_name": { "type": "string" },
                "victim_position": { "type": "string" },
                "is_anonymized": { "type": "boolean", "default": false },
                "witnesses": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": witness_properties(),
                        "required": ["first_name", "last_name"]
                    }
                }
            },
            "required": ["date", "time", "location", "establishment"]
        }),
    }
}

fn get_accident_get_tool() -> Tool {
    Tool {
        name: "accident_get".to_string(),
        description: "Get an accident with its analysis stage and status.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_accident_update_tool() -> Tool {
    Tool {
        name: "accident_update".to_string(),
        description: "Edit accident fields. Allowed at any stage; omitted fields are kept.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "date": { "type": "string", "format": "date" },
                "time": { "type": "string" },
                "location": { "type": "string" },
                "establishment": { "type": "string" },
                "description": { "type": "string" },
                "severity": { "type": "string", "enum": ["minor", "moderate", "severe"] },
                "victim_name": { "type": "string" },
                "victim_first_name": { "type": "string" },
                "victim_position": { "type": "string" },
                "is_anonymized": { "type": "boolean" }
            },
            "required": ["accident_id"]
        }),
    }
}

fn get_accident_list_tool() -> Tool {
    Tool {
        name: "accident_list".to_string(),
        description: "List accidents, most recent first.".to_string(),
        input_schema: no_arguments(),
    }
}

fn get_witness_add_tool() -> Tool {
    let mut properties = witness_properties();
    properties["accident_id"] = accident_id_schema();

    Tool {
        name: "witness_add".to_string(),
        description: "Add a witness to an accident.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": ["accident_id", "first_name", "last_name"]
        }),
    }
}

fn get_witness_list_tool() -> Tool {
    Tool {
        name: "witness_list".to_string(),
        description: "List the witnesses of an accident.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_testimony_analyze_tool() -> Tool {
    Tool {
        name: "testimony_analyze".to_string(),
        description: "Split a testimony into classified fragments with the AI classifier. Returns suggestions only; record the ones to keep with fragment_record.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "testimony": { "type": "string", "description": "Testimony text" },
                "accident_context": {
                    "type": "string",
                    "description": "Context given to the classifier. Defaults to the accident description"
                }
            },
            "required": ["accident_id", "testimony"]
        }),
    }
}

fn get_fragment_record_tool() -> Tool {
    Tool {
        name: "fragment_record".to_string(),
        description: "Record reviewed fragments of testimony.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "fragments": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": { "type": "string" },
                            "type": fragment_category_schema(),
                            "witness_id": { "type": "string" },
                            "is_unusual": { "type": "boolean", "default": false }
                        },
                        "required": ["content"]
                    }
                }
            },
            "required": ["accident_id", "fragments"]
        }),
    }
}

fn get_fragment_add_tool() -> Tool {
    Tool {
        name: "fragment_add".to_string(),
        description: "Add a single fragment manually.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "content": { "type": "string" },
                "type": fragment_category_schema(),
                "witness_id": { "type": "string" },
                "is_unusual": { "type": "boolean", "default": false }
            },
            "required": ["accident_id", "content"]
        }),
    }
}

fn get_fragment_reclassify_tool() -> Tool {
    Tool {
        name: "fragment_reclassify".to_string(),
        description: "Change the category of a fragment.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "fragment_id": { "type": "string" },
                "type": fragment_category_schema()
            },
            "required": ["fragment_id", "type"]
        }),
    }
}

fn get_fragment_mark_unusual_tool() -> Tool {
    Tool {
        name: "fragment_mark_unusual".to_string(),
        description: "Flag or unflag a fragment as unusual.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "fragment_id": { "type": "string" },
                "is_unusual": { "type": "boolean" }
            },
            "required": ["fragment_id", "is_unusual"]
        }),
    }
}

fn get_fragment_counts_tool() -> Tool {
    Tool {
        name: "fragment_counts".to_string(),
        description: "Count the fragments of an accident per category, plus unusual ones.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_fragment_list_tool() -> Tool {
    Tool {
        name: "fragment_list".to_string(),
        description: "List the fragments of an accident in recording order.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_evidence_add_tool() -> Tool {
    Tool {
        name: "evidence_add".to_string(),
        description: "Catalogue a material evidence item.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "description": { "type": "string" },
                "is_useful": { "type": "boolean", "default": false },
                "file_ref": file_ref_schema()
            },
            "required": ["accident_id", "description"]
        }),
    }
}

fn get_evidence_update_tool() -> Tool {
    Tool {
        name: "evidence_update".to_string(),
        description: "Edit a material evidence item. Omitted fields are kept.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "evidence_id": { "type": "string" },
                "description": { "type": "string" },
                "is_useful": { "type": "boolean" },
                "file_ref": file_ref_schema()
            },
            "required": ["evidence_id"]
        }),
    }
}

fn get_evidence_list_tool() -> Tool {
    Tool {
        name: "evidence_list".to_string(),
        description: "List the material evidence of an accident.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_summary_validate_tool() -> Tool {
    Tool {
        name: "summary_validate".to_string(),
        description: "Review the collected facts and evidence and close the testimony stage. Fails without at least one verified fact.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_tree_generate_tool() -> Tool {
    Tool {
        name: "tree_generate".to_string(),
        description: "Generate the cause tree and preventive measures from the verified facts with the AI generator. Replaces the stored tree once the answer is validated.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_tree_get_tool() -> Tool {
    Tool {
        name: "tree_get".to_string(),
        description: "Get the cause tree of an accident. Empty if none was built yet.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_tree_save_tool() -> Tool {
    Tool {
        name: "tree_save".to_string(),
        description: "Replace the cause tree as a whole. The node set is validated: unique ids, no dangling or self edges.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "nodes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "content": { "type": "string" },
                            "type": node_category_schema(),
                            "x": { "type": "number" },
                            "y": { "type": "number" },
                            "connections": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "to": { "type": "string" },
                                        "type": relation_schema()
                                    },
                                    "required": ["to", "type"]
                                }
                            }
                        },
                        "required": ["id", "content", "type", "x", "y"]
                    }
                },
                "preventive_measures": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "factId": { "type": "string" },
                            "factContent": { "type": "string" },
                            "canEliminate": { "type": "boolean" },
                            "canReduce": { "type": "boolean" },
                            "measure": { "type": "string" },
                            "priority": { "type": "string", "enum": ["high", "medium", "low"] }
                        },
                        "required": ["factId"]
                    }
                }
            },
            "required": ["accident_id", "nodes"]
        }),
    }
}

fn get_tree_add_node_tool() -> Tool {
    Tool {
        name: "tree_add_node".to_string(),
        description: "Add a fact to the cause tree. The node id is generated.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "content": { "type": "string" },
                "type": node_category_schema(),
                "x": { "type": "number", "default": 100 },
                "y": { "type": "number", "default": 100 }
            },
            "required": ["accident_id", "content"]
        }),
    }
}

fn get_tree_update_node_tool() -> Tool {
    Tool {
        name: "tree_update_node".to_string(),
        description: "Edit the content, kind or position of a fact. A position needs both x and y.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "node_id": { "type": "string" },
                "content": { "type": "string" },
                "type": node_category_schema(),
                "x": { "type": "number" },
                "y": { "type": "number" }
            },
            "required": ["accident_id", "node_id"]
        }),
    }
}

fn get_tree_delete_node_tool() -> Tool {
    Tool {
        name: "tree_delete_node".to_string(),
        description: "Remove a fact and every edge pointing at it. Its preventive measure is kept.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "node_id": { "type": "string" }
            },
            "required": ["accident_id", "node_id"]
        }),
    }
}

fn get_tree_add_edge_tool() -> Tool {
    Tool {
        name: "tree_add_edge".to_string(),
        description: "Link two facts with a causal relation. Self-loops are rejected.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "from": { "type": "string", "description": "Source node ID" },
                "to": { "type": "string", "description": "Target node ID" },
                "type": relation_schema()
            },
            "required": ["accident_id", "from", "to", "type"]
        }),
    }
}

fn get_tree_remove_edge_tool() -> Tool {
    Tool {
        name: "tree_remove_edge".to_string(),
        description: "Remove the edges between two facts, optionally only those of one relation. Returns how many were removed.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "from": { "type": "string" },
                "to": { "type": "string" },
                "type": relation_schema()
            },
            "required": ["accident_id", "from", "to"]
        }),
    }
}

fn get_tree_coverage_tool() -> Tool {
    Tool {
        name: "tree_coverage".to_string(),
        description: "Report preventive measure coverage: necessary facts without a measure, measures on facts that are not necessary, and measures whose fact was deleted.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_measure_upsert_tool() -> Tool {
    Tool {
        name: "measure_upsert".to_string(),
        description: "Create or edit the preventive measure of a fact. Omitted fields are kept.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "accident_id": accident_id_schema(),
                "fact_id": { "type": "string", "description": "Node ID of the fact" },
                "can_eliminate": { "type": "boolean" },
                "can_reduce": { "type": "boolean" },
                "measure": { "type": "string" },
                "priority": { "type": "string", "enum": ["high", "medium", "low"] }
            },
            "required": ["accident_id", "fact_id"]
        }),
    }
}

fn get_analysis_export_tool() -> Tool {
    Tool {
        name: "analysis_export".to_string(),
        description: "Export a completed analysis: accident, witnesses, fragment counts, evidence and cause tree.".to_string(),
        input_schema: only_accident_id(),
    }
}

fn get_analysis_stats_tool() -> Tool {
    Tool {
        name: "analysis_stats".to_string(),
        description: "Count analyses per status (draft, in_progress, completed).".to_string(),
        input_schema: no_arguments(),
    }
}
