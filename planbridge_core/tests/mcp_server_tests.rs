mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use common::{ok, ScriptedTransport};
use planbridge_core::auth::{AuthService, MemoryTokenStore, MicrosoftOAuth};
use planbridge_core::config::AuthConfig;
use planbridge_core::http::HttpResponse;
use planbridge_core::logging::LogLevel;
use planbridge_core::mcp_server::{JsonRpcHandler, McpServer};
use planbridge_core::transport::StdioTransport;
use planbridge_core::{build_registry, CallToolRequestParam};

fn server(graph: Arc<ScriptedTransport>) -> McpServer {
    let client = common::client(graph);
    let auth = Arc::new(AuthService::new(None, Arc::new(MemoryTokenStore::new())));
    McpServer::new(Arc::new(build_registry(client.clone())), auth, client)
}

fn call(name: &str, arguments: Value) -> CallToolRequestParam {
    CallToolRequestParam {
        name: name.to_string().into(),
        arguments: arguments.as_object().cloned(),
    }
}

fn rpc(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

#[tokio::test]
async fn initialize_advertises_tools_and_logging() {
    let handler = JsonRpcHandler::new(server(ScriptedTransport::always(ok(json!({})))));
    let response = handler
        .handle_request(rpc(
            1,
            "initialize",
            json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "test-client", "version": "1.0.0"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response["id"], 1);
    assert_eq!(response["result"]["serverInfo"]["name"], "planbridge");
    assert!(response["result"]["capabilities"]["tools"].is_object());
    assert!(response["result"]["capabilities"]["logging"].is_object());
}

#[tokio::test]
async fn notifications_get_no_reply_and_unknown_methods_fail() {
    let handler = JsonRpcHandler::new(server(ScriptedTransport::always(ok(json!({})))));

    let none = handler
        .handle_request(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    assert!(none.is_none());

    let response = handler
        .handle_request(rpc(7, "sampling/createMessage", json!({})))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], -32601);
    assert_eq!(response["id"], 7);
}

#[tokio::test]
async fn tools_list_prefixes_connector_names() {
    let handler = JsonRpcHandler::new(server(ScriptedTransport::always(ok(json!({})))));
    let response = handler
        .handle_request(rpc(2, "tools/list", json!({})))
        .await
        .unwrap();

    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for expected in [
        "todo/list_tasks",
        "todo/search_tasks",
        "planner/update_task",
        "calendar/list_events",
        "auth/microsoft/start_device",
        "auth/microsoft/status",
    ] {
        assert!(names.contains(&expected), "missing {}", expected);
    }

    let get_task = response["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "todo/get_task")
        .unwrap();
    assert_eq!(get_task["inputSchema"]["type"], "object");
    assert!(get_task["inputSchema"]["properties"]["list_id"].is_object());
}

#[tokio::test]
async fn list_tasks_filter_names_every_filterable_field() {
    let server = server(ScriptedTransport::always(ok(json!({}))));
    let tools = server.handle_list_tools(None).unwrap().tools;
    let list_tasks = tools.iter().find(|t| t.name == "todo/list_tasks").unwrap();
    let description = list_tasks.input_schema["properties"]["filter"]["description"]
        .as_str()
        .unwrap();

    for field in planbridge_core::validation::ALLOWED_FILTER_FIELDS {
        assert!(description.contains(field), "filter docs omit {}", field);
    }
    assert!(!description.contains("categories"));
}

#[tokio::test]
async fn invalid_identifier_is_reported_without_a_request() {
    let graph = ScriptedTransport::always(ok(json!({})));
    let server = server(graph.clone());

    let result = server
        .handle_call_tool(call(
            "todo/get_task",
            json!({"list_id": "../../etc", "task_id": "t1"}),
        ))
        .await;

    assert_eq!(result.is_error, Some(true));
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["code"], "ValidationError");
    assert_eq!(graph.call_count(), 0);
}

#[tokio::test]
async fn missing_arguments_are_a_validation_error() {
    let server = server(ScriptedTransport::always(ok(json!({}))));
    let result = server
        .handle_call_tool(call("planner/list_buckets", json!({})))
        .await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(result.structured_content.unwrap()["code"], "ValidationError");
}

#[tokio::test]
async fn unknown_tools_are_named_in_the_error() {
    let server = server(ScriptedTransport::always(ok(json!({}))));

    let result = server.handle_call_tool(call("todo/nope", json!({}))).await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(result.structured_content.unwrap()["error"], "Unknown tool: todo/nope");

    let result = server.handle_call_tool(call("jira", json!({}))).await;
    assert_eq!(result.structured_content.unwrap()["error"], "Unknown tool: jira");
}

#[tokio::test]
async fn successful_call_returns_structured_content() {
    let graph = ScriptedTransport::new(vec![ok(json!({"value": [
        {"id": "l1", "displayName": "Tasks", "isOwner": true, "@odata.etag": "W/\"1\""}
    ]}))]);
    let server = server(graph);

    let result = server
        .handle_call_tool(call("todo/list_task_lists", json!({})))
        .await;

    assert_eq!(result.is_error, Some(false));
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["lists"][0]["displayName"], "Tasks");
    assert!(payload["lists"][0].get("@odata.etag").is_none());
}

#[tokio::test]
async fn upstream_details_do_not_reach_the_caller() {
    let graph = ScriptedTransport::always(HttpResponse::new(
        500,
        "System.Exception at C:\\inetpub\\graph\\Handler.cs line 42",
    ));
    let server = server(graph);

    let result = server
        .handle_call_tool(call("calendar/get_event", json!({"event_id": "e1"})))
        .await;

    assert_eq!(result.is_error, Some(true));
    let payload = result.structured_content.unwrap();
    let text = payload.to_string();
    assert!(!text.contains("inetpub"));
    assert!(!text.contains("Handler.cs"));
    assert_eq!(payload["code"], "GraphAPIError");
}

#[tokio::test]
async fn auth_status_reports_client_health() {
    let server = server(ScriptedTransport::always(ok(json!({}))));
    let result = server
        .handle_call_tool(call("auth/microsoft/status", json!({})))
        .await;

    let payload = result.structured_content.unwrap();
    assert_eq!(payload["auth"]["signedIn"], false);
    assert_eq!(payload["circuitState"], "CLOSED");
    assert_eq!(payload["availableTokens"], payload["capacity"]);
}

#[tokio::test]
async fn start_device_keeps_the_device_code_private() {
    let identity = ScriptedTransport::new(vec![ok(json!({
        "device_code": "secret-device-code",
        "user_code": "ABCD-1234",
        "verification_uri": "https://microsoft.com/devicelogin",
        "expires_in": 900,
        "interval": 5,
        "message": "To sign in, visit https://microsoft.com/devicelogin"
    }))]);
    let oauth = MicrosoftOAuth::new(
        &AuthConfig {
            client_id: Some("client-123".to_string()),
            ..AuthConfig::default()
        },
        identity.clone(),
    )
    .unwrap();
    let client = common::client(ScriptedTransport::always(ok(json!({}))));
    let auth = Arc::new(AuthService::new(
        Some(Arc::new(oauth)),
        Arc::new(MemoryTokenStore::new()),
    ));
    let server = McpServer::new(Arc::new(build_registry(client.clone())), auth, client);

    let result = server
        .handle_call_tool(call("auth/microsoft/start_device", json!({})))
        .await;

    assert_eq!(result.is_error, Some(false));
    let payload = result.structured_content.unwrap();
    assert_eq!(payload["userCode"], "ABCD-1234");
    assert!(!payload.to_string().contains("secret-device-code"));
    assert!(identity
        .request(0)
        .url
        .path()
        .ends_with("/oauth2/v2.0/devicecode"));
}

#[tokio::test]
async fn sign_in_without_client_id_is_an_auth_error() {
    let server = server(ScriptedTransport::always(ok(json!({}))));
    let result = server
        .handle_call_tool(call("auth/microsoft/start_device", json!({})))
        .await;
    assert_eq!(result.is_error, Some(true));
    assert_eq!(
        result.structured_content.unwrap()["code"],
        "AuthenticationError"
    );
}

#[tokio::test]
async fn set_level_runs_the_hook() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    let server = server(ScriptedTransport::always(ok(json!({})))).with_level_hook(Arc::new(
        move |level| {
            assert_eq!(level, LogLevel::Debug);
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    ));
    let handler = JsonRpcHandler::new(server);

    let response = handler
        .handle_request(rpc(3, "logging/setLevel", json!({"level": "debug"})))
        .await
        .unwrap();

    assert_eq!(response["result"], json!({}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.server().log_level(), LogLevel::Debug);
}

#[tokio::test]
async fn stdio_transport_answers_line_by_line() {
    let handler = JsonRpcHandler::new(server(ScriptedTransport::always(ok(json!({})))));
    let transport = StdioTransport::new(handler);

    let input = [
        rpc(1, "ping", json!({})).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        String::new(),
        "{not json".to_string(),
    ]
    .join("\n");
    let mut output: Vec<u8> = Vec::new();
    transport
        .serve(std::io::Cursor::new(input.into_bytes()), &mut output)
        .await
        .unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], 1);
    assert_eq!(lines[0]["result"], json!({}));
    assert_eq!(lines[1]["error"]["code"], -32700);
    assert_eq!(lines[1]["id"], Value::Null);
}
