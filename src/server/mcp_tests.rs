//! Unit tests for MCP protocol implementation.
//!
//! Tests JSON-RPC 2.0 request/response handling, tool definitions,
//! and full tool calls against an in-memory workflow.

use super::*;
use crate::ai::{
    ClassifiedFragment, GeneratedTree, MockTestimonyClassifier, MockTreeGenerator,
    TestimonyAnalysis,
};
use crate::error::{AiError, McpError};
use crate::fragments::FragmentCategory;
use crate::server::test_support::create_test_state;
use crate::tree::{CauseNode, NodeCategory, Position, Relation};
use serde_json::json;

async fn server() -> McpServer {
    McpServer::new(
        create_test_state(MockTestimonyClassifier::new(), MockTreeGenerator::new()).await,
    )
}

async fn call(server: &McpServer, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    let response = server
        .handle_line(&request.to_string())
        .await
        .expect("tools/call always answers");
    serde_json::to_value(response).unwrap()
}

fn text_of(response: &Value) -> &str {
    response["result"]["content"][0]["text"].as_str().unwrap()
}

fn payload(response: &Value) -> Value {
    assert!(
        response["result"].get("isError").is_none(),
        "unexpected tool error: {}",
        text_of(response)
    );
    serde_json::from_str(text_of(response)).unwrap()
}

fn is_tool_error(response: &Value) -> bool {
    response["result"]["isError"] == json!(true)
}

async fn declare(server: &McpServer) -> String {
    let response = call(
        server,
        "accident_declare",
        json!({
            "date": "2024-03-12",
            "time": "14:30",
            "location": "Atelier B",
            "establishment": "Usine Nord",
            "description": "Chute de plain-pied près du poste de lavage",
            "severity": "moderate",
            "witnesses": [{ "first_name": "Marie", "last_name": "Durand" }]
        }),
    )
    .await;
    payload(&response)["id"].as_str().unwrap().to_string()
}

// ============================================================================
// JsonRpcResponse tests
// ============================================================================

#[test]
fn test_jsonrpc_response_success_with_id() {
    let response = JsonRpcResponse::success(Some(json!(1)), json!({"result": "ok"}));

    assert_eq!(response.jsonrpc, "2.0");
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    assert_eq!(response.result.unwrap()["result"], "ok");
}

#[test]
fn test_jsonrpc_response_success_without_id() {
    let response = JsonRpcResponse::success(None, json!({}));

    assert_eq!(response.id, Value::Null);
    assert!(response.result.is_some());
}

#[test]
fn test_jsonrpc_response_error() {
    let response = JsonRpcResponse::error(Some(json!("req-7")), -32601, "Method not found");

    assert_eq!(response.id, json!("req-7"));
    assert!(response.result.is_none());
    let error = response.error.unwrap();
    assert_eq!(error.code, -32601);
    assert_eq!(error.message, "Method not found");
}

#[test]
fn test_jsonrpc_response_serialization_omits_absent_member() {
    let success = serde_json::to_string(&JsonRpcResponse::success(Some(json!(1)), json!({})))
        .unwrap();
    assert!(success.contains("\"result\""));
    assert!(!success.contains("\"error\""));

    let failure =
        serde_json::to_string(&JsonRpcResponse::error(Some(json!(1)), -32700, "Parse error"))
            .unwrap();
    assert!(failure.contains("-32700"));
    assert!(!failure.contains("\"result\""));
}

#[test]
fn test_jsonrpc_request_deserialization() {
    let request: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "id": 3,
        "method": "tools/list"
    }))
    .unwrap();

    assert_eq!(request.method, "tools/list");
    assert_eq!(request.id, Some(json!(3)));
    assert!(request.params.is_none());
}

#[test]
fn test_jsonrpc_notification_no_id() {
    let request: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0",
        "method": "initialized"
    }))
    .unwrap();

    assert!(request.id.is_none());
}

#[test]
fn test_tool_call_params_without_arguments() {
    let params: ToolCallParams =
        serde_json::from_value(json!({"name": "accident_list"})).unwrap();

    assert_eq!(params.name, "accident_list");
    assert!(params.arguments.is_none());
}

// ============================================================================
// Tool definition tests
// ============================================================================

#[test]
fn test_tool_definitions_cover_every_operation() {
    let names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();

    for expected in [
        "accident_declare",
        "accident_get",
        "accident_update",
        "accident_list",
        "witness_add",
        "witness_list",
        "testimony_analyze",
        "fragment_record",
        "fragment_add",
        "fragment_reclassify",
        "fragment_mark_unusual",
        "fragment_counts",
        "fragment_list",
        "evidence_add",
        "evidence_update",
        "evidence_list",
        "summary_validate",
        "tree_generate",
        "tree_get",
        "tree_save",
        "tree_add_node",
        "tree_update_node",
        "tree_delete_node",
        "tree_add_edge",
        "tree_remove_edge",
        "tree_coverage",
        "measure_upsert",
        "analysis_export",
        "analysis_stats",
    ] {
        assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
    }
    assert_eq!(names.len(), 29);
}

#[test]
fn test_tool_names_are_unique() {
    let mut names: Vec<String> = tool_definitions().into_iter().map(|t| t.name).collect();
    let original_len = names.len();
    names.sort();
    names.dedup();

    assert_eq!(names.len(), original_len, "All tool names should be unique");
}

#[test]
fn test_required_fields_are_declared_properties() {
    for tool in tool_definitions() {
        let schema = &tool.input_schema;
        assert_eq!(schema["type"], "object", "schema type for {}", tool.name);
        assert!(schema["properties"].is_object(), "properties for {}", tool.name);
        assert!(!tool.description.is_empty());

        if let Some(required) = schema["required"].as_array() {
            for field in required {
                let field = field.as_str().unwrap();
                assert!(
                    schema["properties"].get(field).is_some(),
                    "{} requires undeclared field {}",
                    tool.name,
                    field
                );
            }
        }
    }
}

#[test]
fn test_relation_schema_lists_the_three_relations() {
    let tool = tool_definitions()
        .into_iter()
        .find(|t| t.name == "tree_add_edge")
        .unwrap();

    assert_eq!(
        tool.input_schema["properties"]["type"]["enum"],
        json!(["sequence", "conjunction", "disjunction"])
    );
}

// ============================================================================
// Protocol tests
// ============================================================================

#[tokio::test]
async fn test_initialize_reports_server_info() {
    let server = server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
        .await
        .unwrap();

    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "inrs-cause-tree");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
}

#[tokio::test]
async fn test_notifications_get_no_response() {
    let server = server().await;

    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"initialized"}"#)
        .await
        .is_none());
    assert!(server
        .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/whatever"}"#)
        .await
        .is_none());
}

#[tokio::test]
async fn test_unknown_method_and_parse_error() {
    let server = server().await;

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":9,"method":"resources/list"}"#)
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().code, -32601);

    let response = server.handle_line("{not json").await.unwrap();
    assert_eq!(response.id, Value::Null);
    assert_eq!(response.error.unwrap().code, -32700);
}

#[tokio::test]
async fn test_tools_call_without_params_is_invalid() {
    let server = server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call"}"#)
        .await
        .unwrap();

    assert_eq!(response.error.unwrap().code, -32602);
}

#[tokio::test]
async fn test_tools_list_returns_definitions() {
    let server = server().await;
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
        .await
        .unwrap();

    let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
    assert_eq!(tools, tool_definitions().len());
}

// ============================================================================
// Tool call tests
// ============================================================================

#[tokio::test]
async fn test_every_tool_is_routed() {
    let server = server().await;

    for tool in tool_definitions() {
        let result = handle_tool_call(&server.state, &tool.name, None).await;
        assert!(
            !matches!(result, Err(McpError::UnknownTool { .. })),
            "{} is not routed",
            tool.name
        );
    }
}

#[tokio::test]
async fn test_unknown_tool_is_reported_as_tool_error() {
    let server = server().await;
    let response = call(&server, "tree_render_pdf", json!({})).await;

    assert!(is_tool_error(&response));
    assert_eq!(text_of(&response), "Error: Unknown tool: tree_render_pdf");
}

#[tokio::test]
async fn test_declare_then_get_accident() {
    let server = server().await;
    let accident_id = declare(&server).await;

    let accident = payload(&call(&server, "accident_get", json!({"accident_id": accident_id})).await);
    assert_eq!(accident["stage"], "declared");
    assert_eq!(accident["status"], "draft");
    assert!(accident["accident_number"]
        .as_str()
        .unwrap()
        .starts_with("ACC-"));

    let witnesses =
        payload(&call(&server, "witness_list", json!({"accident_id": accident_id})).await);
    assert_eq!(witnesses[0]["last_name"], "Durand");
}

#[tokio::test]
async fn test_missing_accident_is_tool_error() {
    let server = server().await;
    let response = call(&server, "tree_get", json!({"accident_id": "missing"})).await;

    assert!(is_tool_error(&response));
    assert!(text_of(&response).contains("missing"));
}

#[tokio::test]
async fn test_manual_tree_building_over_tools() {
    let server = server().await;
    let accident_id = declare(&server).await;

    call(
        &server,
        "fragment_add",
        json!({"accident_id": accident_id, "content": "Sol mouillé", "type": "verified_fact"}),
    )
    .await;

    let first = payload(
        &call(
            &server,
            "tree_add_node",
            json!({"accident_id": accident_id, "content": "Sol mouillé", "type": "necessary"}),
        )
        .await,
    );
    assert_eq!(first["id"], "node-1");
    assert_eq!(first["x"], 100.0);

    let second = payload(
        &call(
            &server,
            "tree_add_node",
            json!({"accident_id": accident_id, "content": "Glissade", "type": "necessary", "x": 250, "y": 100}),
        )
        .await,
    );

    let tree = payload(
        &call(
            &server,
            "tree_add_edge",
            json!({"accident_id": accident_id, "from": first["id"], "to": second["id"], "type": "sequence"}),
        )
        .await,
    );
    assert_eq!(tree["nodes"][0]["connections"][0]["to"], "node-2");

    let self_loop = call(
        &server,
        "tree_add_edge",
        json!({"accident_id": accident_id, "from": "node-1", "to": "node-1", "type": "sequence"}),
    )
    .await;
    assert!(is_tool_error(&self_loop));

    let coverage =
        payload(&call(&server, "tree_coverage", json!({"accident_id": accident_id})).await);
    assert_eq!(
        coverage["uncovered_necessary_facts"].as_array().unwrap().len(),
        2
    );

    let measure = payload(
        &call(
            &server,
            "measure_upsert",
            json!({"accident_id": accident_id, "fact_id": "node-1", "measure": "Tapis absorbant", "can_reduce": true}),
        )
        .await,
    );
    assert_eq!(measure["factContent"], "Sol mouillé");
    assert_eq!(measure["canReduce"], true);
    assert_eq!(measure["priority"], "medium");

    let removed = payload(
        &call(
            &server,
            "tree_remove_edge",
            json!({"accident_id": accident_id, "from": "node-1", "to": "node-2"}),
        )
        .await,
    );
    assert_eq!(removed["removed"], 1);

    let accident = payload(&call(&server, "accident_get", json!({"accident_id": accident_id})).await);
    assert_eq!(accident["status"], "completed");
}

#[tokio::test]
async fn test_update_node_with_half_position_is_rejected() {
    let server = server().await;
    let accident_id = declare(&server).await;
    call(
        &server,
        "tree_add_node",
        json!({"accident_id": accident_id, "content": "Sol mouillé"}),
    )
    .await;

    let response = call(
        &server,
        "tree_update_node",
        json!({"accident_id": accident_id, "node_id": "node-1", "x": 300}),
    )
    .await;
    assert!(is_tool_error(&response));
    assert!(text_of(&response).contains("x and y"));
}

#[tokio::test]
async fn test_tree_save_rejects_dangling_edge() {
    let server = server().await;
    let accident_id = declare(&server).await;

    let response = call(
        &server,
        "tree_save",
        json!({
            "accident_id": accident_id,
            "nodes": [{
                "id": "n1", "content": "Sol mouillé", "type": "necessary", "x": 100, "y": 100,
                "connections": [{"to": "ghost", "type": "sequence"}]
            }]
        }),
    )
    .await;
    assert!(is_tool_error(&response));

    let tree = payload(&call(&server, "tree_get", json!({"accident_id": accident_id})).await);
    assert!(tree["nodes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_testimony_to_generated_tree() {
    let mut classifier = MockTestimonyClassifier::new();
    classifier.expect_classify().times(1).returning(|_| {
        Ok(TestimonyAnalysis {
            fragments: vec![ClassifiedFragment {
                content: "Le sol était mouillé".to_string(),
                category: FragmentCategory::VerifiedFact,
                confidence: 0.9,
                reasoning: "Constat".to_string(),
            }],
            summary: "Sol glissant".to_string(),
            recommendations: Vec::new(),
        })
    });
    let mut generator = MockTreeGenerator::new();
    generator
        .expect_generate()
        .withf(|req| req.facts == vec!["Le sol était mouillé"])
        .times(1)
        .returning(|_| {
            Ok(GeneratedTree {
                nodes: vec![
                    CauseNode::new("n1", "Sol mouillé", NodeCategory::Necessary, Position::new(100.0, 100.0))
                        .with_edge("n2", Relation::Sequence),
                    CauseNode::new("n2", "Chute", NodeCategory::Necessary, Position::new(250.0, 100.0)),
                ],
                measures: Vec::new(),
                warnings: Vec::new(),
            })
        });
    let server = McpServer::new(create_test_state(classifier, generator).await);
    let accident_id = declare(&server).await;

    let analysis = payload(
        &call(
            &server,
            "testimony_analyze",
            json!({"accident_id": accident_id, "testimony": "Le sol était mouillé, j'ai vu Jean glisser."}),
        )
        .await,
    );
    assert_eq!(analysis["fragments"][0]["type"], "verified_fact");

    let recorded = payload(
        &call(
            &server,
            "fragment_record",
            json!({"accident_id": accident_id, "fragments": [
                {"content": analysis["fragments"][0]["content"], "type": "verified_fact"}
            ]}),
        )
        .await,
    );
    assert_eq!(recorded.as_array().unwrap().len(), 1);

    let summary =
        payload(&call(&server, "summary_validate", json!({"accident_id": accident_id})).await);
    assert_eq!(summary["accident"]["stage"], "summary_validated");

    let outcome =
        payload(&call(&server, "tree_generate", json!({"accident_id": accident_id})).await);
    assert_eq!(outcome["tree"]["nodes"].as_array().unwrap().len(), 2);

    let export =
        payload(&call(&server, "analysis_export", json!({"accident_id": accident_id})).await);
    assert_eq!(export["accident"]["status"], "completed");
    assert_eq!(export["counts"]["verified_fact"], 1);

    let stats = payload(&call(&server, "analysis_stats", json!({})).await);
    assert_eq!(stats["completed"], 1);
}

#[tokio::test]
async fn test_unavailable_ai_carries_retry_hint() {
    let mut generator = MockTreeGenerator::new();
    generator.expect_generate().times(1).returning(|_| {
        Err(AiError::Unavailable {
            service: "cause tree generator".to_string(),
            message: "connection refused".to_string(),
        })
    });
    let server =
        McpServer::new(create_test_state(MockTestimonyClassifier::new(), generator).await);
    let accident_id = declare(&server).await;
    call(
        &server,
        "fragment_add",
        json!({"accident_id": accident_id, "content": "Sol mouillé", "type": "verified_fact"}),
    )
    .await;

    let response = call(&server, "tree_generate", json!({"accident_id": accident_id})).await;
    assert!(is_tool_error(&response));
    assert!(text_of(&response).contains("retried"));
}

#[tokio::test]
async fn test_generate_without_facts_is_tool_error() {
    let mut generator = MockTreeGenerator::new();
    generator.expect_generate().times(0);
    let server =
        McpServer::new(create_test_state(MockTestimonyClassifier::new(), generator).await);
    let accident_id = declare(&server).await;

    let response = call(&server, "tree_generate", json!({"accident_id": accident_id})).await;
    assert!(is_tool_error(&response));
    assert!(!text_of(&response).contains("retried"));
}
