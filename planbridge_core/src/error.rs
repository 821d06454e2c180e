// src/error.rs
use serde_json::json;

/// Failure taxonomy for everything that talks to Microsoft Graph.
///
/// The set is closed on purpose: the sanitizer matches on it exhaustively,
/// so adding a variant will not compile until the trust boundary handles it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Caller-supplied input was rejected before any request was built.
    #[error("{0}")]
    Validation(String),

    /// The local token bucket is empty. `retry_after_ms` is the exact wait;
    /// the message carries a rounded, human-friendly version of it.
    #[error("{message}")]
    RateLimit { message: String, retry_after_ms: u64 },

    /// No usable credential. Never retried automatically.
    #[error("{0}")]
    Authentication(String),

    /// Upstream failure: unexpected status, unavailable service, network
    /// error, or an open circuit.
    #[error("{message}")]
    GraphApi {
        message: String,
        status: Option<u16>,
        transient: bool,
    },

    /// Credential persistence failed.
    #[error("{0}")]
    TokenStorage(String),
}

impl GraphError {
    pub fn validation(message: impl Into<String>) -> Self {
        GraphError::Validation(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        GraphError::Authentication(message.into())
    }

    pub fn token_storage(message: impl Into<String>) -> Self {
        GraphError::TokenStorage(message.into())
    }

    /// Upstream failure that is not worth retrying.
    pub fn api(message: impl Into<String>, status: Option<u16>) -> Self {
        GraphError::GraphApi {
            message: message.into(),
            status,
            transient: false,
        }
    }

    /// Upstream failure that the retry loop may absorb.
    pub fn transient(message: impl Into<String>, status: Option<u16>) -> Self {
        GraphError::GraphApi {
            message: message.into(),
            status,
            transient: true,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GraphError::Validation(_) => "ValidationError",
            GraphError::RateLimit { .. } => "RateLimitError",
            GraphError::Authentication(_) => "AuthenticationError",
            GraphError::GraphApi { .. } => "GraphAPIError",
            GraphError::TokenStorage(_) => "TokenStorageError",
        }
    }

    /// Retry classification: only transient upstream failures qualify.
    /// Authentication failures never do.
    pub fn is_transient(&self) -> bool {
        match self {
            GraphError::GraphApi {
                message, transient, ..
            } => *transient || message.contains("temporarily unavailable"),
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GraphError::GraphApi { status, .. } => *status,
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::Graph(GraphError::Validation(_)) => "invalid_input",
            ConnectorError::Graph(GraphError::RateLimit { .. }) => "rate_limited",
            ConnectorError::Graph(GraphError::Authentication(_)) => "auth_failed",
            ConnectorError::Graph(GraphError::GraphApi { .. }) => "upstream_error",
            ConnectorError::Graph(GraphError::TokenStorage(_)) => "storage_error",
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::ToolNotFound(_) => "tool_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::ParseError => "parse_error",
            ConnectorError::SerdeJson(_) | ConnectorError::Internal(_) => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ToolNotFound(name) => (-32602, format!("Tool not found: {}", name)),
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::ParseError => (-32700, "Parse error".to_string()),
            ConnectorError::SerdeJson(_) => (-32602, "Invalid params".to_string()),
            ConnectorError::Internal(_) => (-32603, "Internal error".to_string()),
            ConnectorError::Graph(err) => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
        })
    }
}

/// Parse tool arguments into a typed struct, reporting failures as caller
/// input errors.
pub fn parse_args<T: serde::de::DeserializeOwned>(
    args: serde_json::Map<String, serde_json::Value>,
) -> Result<T, ConnectorError> {
    serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| ConnectorError::InvalidParams(format!("Invalid arguments: {}", e)))
}
