// src/lib.rs
pub mod auth;
pub mod clock;
pub mod config;
pub mod connectors;
pub mod error;
pub mod graph_client;
pub mod http;
pub mod logging;
pub mod mcp_server;
pub mod models;
pub mod request_context;
pub mod resilience;
pub mod sanitize;
pub mod services;
pub mod transport;
pub mod utils;
pub mod validation;

use std::collections::BTreeMap;
use std::sync::Arc;

// Re-export types from rmcp that users of the library need
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, Tool,
};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::auth::{
    AuthService, FileTokenStore, MemoryTokenStore, MicrosoftOAuth, OAuthTokenProvider,
    StaticTokenProvider, TokenProvider, TokenStore,
};
use crate::config::{Config, TokenStoreKind, ACCESS_TOKEN_ENV};
pub use crate::error::{ConnectorError, GraphError};
use crate::graph_client::GraphClient;
use crate::http::ReqwestTransport;
use crate::services::{CalendarService, PlannerService, TodoService};

/// A named group of MCP tools backed by one Graph resource.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Unique name; also the prefix of every tool it exposes.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Tools with unprefixed names.
    fn list_tools(&self) -> Result<Vec<Tool>, ConnectorError>;

    /// `request.name` is the unprefixed tool name.
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub description: String,
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn Connector>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, provider: Arc<dyn Connector>) {
        self.providers
            .insert(provider.name().to_string(), provider);
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.providers.get(name).cloned()
    }

    pub fn list_providers(&self) -> Vec<ServerInfo> {
        self.providers
            .values()
            .map(|c| ServerInfo {
                name: c.name().to_string(),
                description: c.description().to_string(),
            })
            .collect()
    }

    /// Every tool of every connector, named `<connector>/<tool>`.
    pub fn get_provider_tools(&self) -> Result<Vec<Tool>, ConnectorError> {
        let mut all_tools = Vec::new();
        for (name, provider) in &self.providers {
            for mut tool in provider.list_tools()? {
                tool.name = format!("{}/{}", name, tool.name).into();
                all_tools.push(tool);
            }
        }
        Ok(all_tools)
    }
}

/// Registry with the To Do, Planner and Calendar connectors over one client.
pub fn build_registry(client: Arc<GraphClient>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register_provider(Arc::new(connectors::todo::TodoConnector::new(Arc::new(
        TodoService::new(client.clone()),
    ))));
    registry.register_provider(Arc::new(connectors::planner::PlannerConnector::new(
        Arc::new(PlannerService::new(client.clone())),
    )));
    registry.register_provider(Arc::new(connectors::calendar::CalendarConnector::new(
        Arc::new(CalendarService::new(client)),
    )));
    registry
}

/// Everything a binary needs, wired from one [`Config`].
pub struct AppContext {
    pub config: Config,
    pub auth: Arc<AuthService>,
    pub client: Arc<GraphClient>,
    pub registry: Arc<ProviderRegistry>,
}

impl AppContext {
    pub fn from_config(config: Config) -> Result<Self, GraphError> {
        let store: Arc<dyn TokenStore> = match config.auth.token_store {
            TokenStoreKind::File => Arc::new(match &config.auth.token_path {
                Some(path) => FileTokenStore::new(path.clone()),
                None => FileTokenStore::new_default(),
            }),
            TokenStoreKind::Memory => Arc::new(MemoryTokenStore::new()),
        };

        let oauth = match config.auth.client_id.as_deref() {
            Some(_) => {
                let transport = ReqwestTransport::new(config.graph.request_timeout())
                    .map_err(|e| GraphError::api(e.to_string(), None))?;
                Some(Arc::new(MicrosoftOAuth::new(&config.auth, Arc::new(transport))?))
            }
            None => {
                warn!("No client id configured; device sign-in is disabled");
                None
            }
        };

        let provider: Arc<dyn TokenProvider> = match std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
        {
            Some(token) => {
                info!("Using access token from {}", ACCESS_TOKEN_ENV);
                Arc::new(StaticTokenProvider::new(token.trim()))
            }
            None => match &oauth {
                Some(oauth) => Arc::new(OAuthTokenProvider::new(oauth.clone(), store.clone())),
                None => Arc::new(StaticTokenProvider::signed_out()),
            },
        };

        let client = Arc::new(GraphClient::from_config(&config, provider)?);
        let registry = Arc::new(build_registry(client.clone()));
        let auth = Arc::new(AuthService::new(oauth, store));

        Ok(Self {
            config,
            auth,
            client,
            registry,
        })
    }
}
