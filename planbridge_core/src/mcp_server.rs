use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use rmcp::model::*;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::auth::AuthService;
use crate::connectors::NoArgs;
use crate::error::parse_args;
use crate::graph_client::GraphClient;
use crate::logging::{LogLevel, SetLevelParams};
use crate::request_context::RequestContext;
use crate::sanitize::{sanitize_error, SanitizedError};
use crate::utils::{error_result, structured_result_with_text, tool};
use crate::{AppContext, ConnectorError, ProviderRegistry};

const AUTH_TOOL_PREFIX: &str = "auth/microsoft/";

/// Applies a new log level to the process-wide subscriber.
pub type LevelChangeHook = Arc<dyn Fn(LogLevel) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Default, Deserialize, JsonSchema)]
struct PollDeviceArgs {
    /// Device code from start_device; defaults to the sign-in in progress
    #[serde(default)]
    device_code: Option<String>,
}

/// MCP server over the connector registry plus the Microsoft sign-in tools.
pub struct McpServer {
    registry: Arc<ProviderRegistry>,
    auth: Arc<AuthService>,
    client: Arc<GraphClient>,
    level_hook: Option<LevelChangeHook>,
    log_level: Mutex<LogLevel>,
}

impl McpServer {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        auth: Arc<AuthService>,
        client: Arc<GraphClient>,
    ) -> Self {
        Self {
            registry,
            auth,
            client,
            level_hook: None,
            log_level: Mutex::new(LogLevel::Info),
        }
    }

    pub fn from_context(ctx: &AppContext) -> Self {
        let server = Self::new(ctx.registry.clone(), ctx.auth.clone(), ctx.client.clone());
        *server.log_level.lock().unwrap_or_else(|e| e.into_inner()) = ctx.config.logging.log_level();
        server
    }

    pub fn with_level_hook(mut self, hook: LevelChangeHook) -> Self {
        self.level_hook = Some(hook);
        self
    }

    pub fn log_level(&self) -> LogLevel {
        *self.log_level.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
            logging: Some(JsonObject::new()),
            ..Default::default()
        }
    }

    pub fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            "MCP server initializing"
        );

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.get_capabilities(),
            server_info: Implementation {
                name: "planbridge".to_string(),
                title: Some("planbridge".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some("Microsoft To Do, Planner and Calendar tools. If a tool reports an authentication error, call auth/microsoft/start_device and ask the user to complete sign-in, then call auth/microsoft/poll_device.".to_string()),
        })
    }

    fn auth_tools(&self) -> Result<Vec<Tool>, ConnectorError> {
        Ok(vec![
            tool::<NoArgs>(
                "auth/microsoft/start_device",
                "Begin Microsoft sign-in; returns a code and URL for the user to visit",
            )?,
            tool::<PollDeviceArgs>(
                "auth/microsoft/poll_device",
                "Check whether the user has finished the sign-in started by start_device",
            )?,
            tool::<NoArgs>(
                "auth/microsoft/status",
                "Sign-in state plus Graph client health (circuit state, available request tokens)",
            )?,
            tool::<NoArgs>("auth/microsoft/logout", "Forget stored Microsoft credentials")?,
        ])
    }

    pub fn handle_list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let mut tools = self.registry.get_provider_tools()?;
        tools.extend(self.auth_tools()?);
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    /// Runs one tool call in its own [`RequestContext`]. Every failure,
    /// panics included, comes back as a sanitized `isError` result.
    pub async fn handle_call_tool(&self, request: CallToolRequestParam) -> CallToolResult {
        let ctx = RequestContext::new(request.name.as_ref());
        let span = info_span!(
            "tool_call",
            request_id = %ctx.request_id,
            tool = %ctx.tool_name
        );
        let started = ctx.clone();

        let outcome = ctx
            .scope(|| AssertUnwindSafe(self.dispatch_tool(request)).catch_unwind())
            .instrument(span.clone())
            .await;

        span.in_scope(|| match outcome {
            Ok(Ok(result)) => {
                info!(elapsed_ms = started.elapsed_ms(), "Tool call succeeded");
                result
            }
            Ok(Err(e)) => {
                let sanitized = sanitize_error(&e);
                warn!(
                    elapsed_ms = started.elapsed_ms(),
                    code = sanitized.code.as_deref().unwrap_or("none"),
                    error_code = e.code_str(),
                    "Tool call failed: {}",
                    sanitized.error
                );
                error_result(&sanitized)
            }
            Err(_) => {
                error!(elapsed_ms = started.elapsed_ms(), "Tool handler panicked");
                error_result(&SanitizedError::generic())
            }
        })
    }

    async fn dispatch_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        if let Some(action) = request.name.strip_prefix(AUTH_TOOL_PREFIX) {
            let action = action.to_string();
            return self
                .handle_auth_tool(&action, request.arguments.unwrap_or_default())
                .await;
        }

        let (connector_name, tool_name) = request
            .name
            .split_once('/')
            .ok_or_else(|| ConnectorError::ToolNotFound(request.name.to_string()))?;
        let connector = self
            .registry
            .get_provider(connector_name)
            .ok_or_else(|| ConnectorError::ToolNotFound(request.name.to_string()))?;

        debug!(connector = connector_name, tool = tool_name, "Dispatching tool call");
        let unprefixed_request = CallToolRequestParam {
            name: tool_name.to_string().into(),
            arguments: request.arguments.clone(),
        };
        connector
            .call_tool(unprefixed_request)
            .await
            .map_err(|e| match e {
                ConnectorError::ToolNotFound(_) => {
                    ConnectorError::ToolNotFound(request.name.to_string())
                }
                other => other,
            })
    }

    async fn handle_auth_tool(
        &self,
        action: &str,
        args: JsonObject,
    ) -> Result<CallToolResult, ConnectorError> {
        match action {
            "start_device" => {
                let _: NoArgs = parse_args(args)?;
                let start = self.auth.start_device().await?;
                // The device code stays server-side; poll_device uses it.
                structured_result_with_text(
                    &json!({
                        "userCode": start.user_code,
                        "verificationUri": start.verification_uri,
                        "verificationUriComplete": start.verification_uri_complete,
                        "expiresIn": start.expires_in,
                        "interval": start.interval,
                        "message": start.message,
                    }),
                    None,
                )
            }
            "poll_device" => {
                let args: PollDeviceArgs = parse_args(args)?;
                let status = self.auth.poll_device(args.device_code.as_deref()).await?;
                structured_result_with_text(&status, None)
            }
            "status" => {
                let _: NoArgs = parse_args(args)?;
                let status = self.auth.status()?;
                let health = self.client.health();
                structured_result_with_text(
                    &json!({
                        "auth": status,
                        "circuitState": health.circuit_state,
                        "availableTokens": health.available_tokens,
                        "capacity": health.capacity,
                    }),
                    None,
                )
            }
            "logout" => {
                let _: NoArgs = parse_args(args)?;
                self.auth.logout()?;
                structured_result_with_text(&json!({ "signedOut": true }), None)
            }
            other => Err(ConnectorError::ToolNotFound(format!(
                "{}{}",
                AUTH_TOOL_PREFIX, other
            ))),
        }
    }

    pub fn handle_set_level(&self, params: SetLevelParams) -> Result<(), ConnectorError> {
        if let Some(hook) = &self.level_hook {
            hook(params.level).map_err(ConnectorError::Internal)?;
        }
        *self.log_level.lock().unwrap_or_else(|e| e.into_inner()) = params.level;
        info!(level = ?params.level, "Log level changed");
        Ok(())
    }
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &McpServer {
        &self.server
    }

    /// Process one JSON-RPC message. Notifications produce no response.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        debug!(method = %method, "Handling JSON-RPC request");

        if method.starts_with("notifications/") {
            debug!(method = %method, "Notification received");
            return None;
        }

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let params = request.get("params").cloned().unwrap_or(json!({}));

        let result = match method.as_str() {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => to_json(self.server.handle_initialize(req)),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => to_json(self.server.handle_list_tools(req)),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => to_json(Ok(self.server.handle_call_tool(req).await)),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "resources/list" => to_json(Ok(ListResourcesResult {
                resources: Vec::new(),
                next_cursor: None,
            })),
            "prompts/list" => to_json(Ok(ListPromptsResult {
                prompts: Vec::new(),
                next_cursor: None,
            })),
            "logging/setLevel" => match serde_json::from_value::<SetLevelParams>(params) {
                Ok(req) => self
                    .server
                    .handle_set_level(req)
                    .map(|_| json!({}))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            _ => Err(ConnectorError::MethodNotFound.to_jsonrpc_error()),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}

fn to_json<T: serde::Serialize>(result: Result<T, ConnectorError>) -> Result<Value, Value> {
    result
        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
        .map_err(|e| e.to_jsonrpc_error())
}
