//! Resilient Microsoft Graph client.
//!
//! Every verb runs the same pipeline:
//!
//! 1. `RateLimiter::check_limit`: fail fast, nothing is sent.
//! 2. URL building: the endpoint is always resolved *relative* to the base,
//!    so a leading `/` never replaces the `/v1.0/` path.
//! 3. `CircuitBreaker::execute` around
//! 4. `RetryPolicy::run` around one attempt: fetch a token, send, map the
//!    status to a [`GraphError`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::GraphError;
use crate::http::{
    HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport, TransportError,
};
use crate::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig,
    RetryPolicy,
};
use crate::request_context::current_context;

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0/";

const UNAVAILABLE_MESSAGE: &str = "Microsoft Graph service temporarily unavailable";

/// Extra per-call request shaping.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Sent as `If-Match`; Planner requires it on PATCH and DELETE.
    pub if_match: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match = Some(etag.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphClientConfig {
    pub base_url: Option<String>,
    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

impl From<&Config> for GraphClientConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: Some(config.graph.base_url.clone()),
            rate_limiter: config.rate_limiter,
            circuit_breaker: config.circuit_breaker,
            retry: config.retry,
        }
    }
}

/// Snapshot returned by [`GraphClient::health`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHealth {
    pub circuit_state: CircuitState,
    pub available_tokens: f64,
    pub capacity: f64,
}

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Deserialize)]
struct GraphErrorBody {
    #[serde(default)]
    code: Option<String>,
}

pub struct GraphClient {
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    token_provider: Arc<dyn TokenProvider>,
    rate_limiter: RateLimiter,
    circuit_breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url.as_str())
            .field("rate_limiter", &self.rate_limiter)
            .field("circuit_breaker", &self.circuit_breaker)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    pub fn new(
        config: GraphClientConfig,
        transport: Arc<dyn HttpTransport>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, GraphError> {
        Self::with_clock(config, transport, token_provider, Arc::new(SystemClock::new()))
    }

    /// Production client: reqwest transport with the configured timeout.
    pub fn from_config(
        config: &Config,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Result<Self, GraphError> {
        let transport = ReqwestTransport::new(config.graph.request_timeout())
            .map_err(|e| GraphError::api(e.to_string(), None))?;
        Self::new(config.into(), Arc::new(transport), token_provider)
    }

    pub fn with_clock(
        config: GraphClientConfig,
        transport: Arc<dyn HttpTransport>,
        token_provider: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GraphError> {
        let mut base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| GraphError::api(format!("Invalid Graph base URL: {}", e), None))?;

        Ok(Self {
            base_url,
            transport,
            token_provider,
            rate_limiter: RateLimiter::with_clock(config.rate_limiter, clock.clone()),
            circuit_breaker: CircuitBreaker::with_clock(config.circuit_breaker, clock),
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    pub fn get_circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    pub fn get_available_tokens(&self) -> f64 {
        self.rate_limiter.available_tokens()
    }

    pub fn health(&self) -> ClientHealth {
        ClientHealth {
            circuit_state: self.get_circuit_state(),
            available_tokens: self.get_available_tokens(),
            capacity: self.rate_limiter.capacity(),
        }
    }

    /// Restore a full bucket and a closed circuit.
    pub fn reset(&self) {
        self.rate_limiter.reset();
        self.circuit_breaker.reset();
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, GraphError> {
        let value = self.request(Method::Get, path, None, options).await?;
        decode(value)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, GraphError> {
        let body = encode(body)?;
        let value = self.request(Method::Post, path, Some(body), options).await?;
        decode(value)
    }

    /// A 204 reply decodes from `{}`.
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> Result<T, GraphError> {
        let body = encode(body)?;
        let value = self.request(Method::Patch, path, Some(body), options).await?;
        decode(value)
    }

    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<(), GraphError> {
        self.request(Method::Delete, path, None, options).await?;
        Ok(())
    }

    /// Resolve `path` against the base URL and append query parameters.
    pub fn build_url(&self, path: &str, query: &[(String, String)]) -> Result<Url, GraphError> {
        let relative = path.trim_start_matches('/');
        let mut url = self
            .base_url
            .join(relative)
            .map_err(|e| GraphError::validation(format!("Invalid endpoint path: {}", e)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
        options: RequestOptions,
    ) -> Result<Value, GraphError> {
        self.rate_limiter.check_limit()?;
        let url = self.build_url(path, &options.query)?;

        let options = &options;
        let run_attempt = |attempt: u32| {
            let url = url.clone();
            let body = body.clone();
            async move { self.attempt(method, url, body, options, attempt).await }
        };

        self.circuit_breaker
            .execute(|| self.retry.run(run_attempt))
            .await
    }

    async fn attempt(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<Value, GraphError> {
        let token = self.token_provider.get_valid_access_token().await?;

        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {}", token)),
            ("Accept".to_string(), "application/json".to_string()),
        ];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if let Some(etag) = &options.if_match {
            headers.push(("If-Match".to_string(), etag.clone()));
        }
        headers.extend(options.headers.iter().cloned());

        let request_id = current_context().map(|ctx| ctx.request_id);
        debug!(
            %method,
            path = url.path(),
            attempt,
            request_id = request_id.as_deref().unwrap_or("-"),
            "Graph request"
        );
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url,
                headers,
                body,
            })
            .await
            .map_err(|e| match e {
                TransportError::Network(_) => GraphError::transient(e.to_string(), None),
                TransportError::InvalidRequest(_) => GraphError::api(e.to_string(), None),
            })?;

        interpret(response)
    }
}

fn interpret(response: HttpResponse) -> Result<Value, GraphError> {
    let status = response.status;
    if response.is_success() {
        if status == 204 || response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Object(Default::default()));
        }
        return serde_json::from_slice(&response.body).map_err(|e| {
            GraphError::api(
                format!("Invalid JSON in Graph response: {}", e),
                Some(status),
            )
        });
    }

    match status {
        401 => Err(GraphError::authentication(
            "Authentication with Microsoft Graph failed. Sign in again",
        )),
        429 => Err(GraphError::api(
            "Rate limit exceeded. Please try again later.",
            Some(status),
        )),
        503 | 504 => Err(GraphError::transient(UNAVAILABLE_MESSAGE, Some(status))),
        _ => {
            let code = serde_json::from_slice::<GraphErrorEnvelope>(&response.body)
                .ok()
                .and_then(|envelope| envelope.error.code)
                .filter(|code| !code.is_empty());
            let detail = match code {
                Some(code) => code,
                None if !response.status_text.is_empty() => response.status_text,
                None => "Unknown error".to_string(),
            };
            Err(GraphError::api(
                format!("Graph API error {}: {}", status, detail),
                Some(status),
            ))
        }
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>, GraphError> {
    serde_json::to_vec(body)
        .map_err(|e| GraphError::validation(format!("Request body is not serializable: {}", e)))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, GraphError> {
    serde_json::from_value(value)
        .map_err(|e| GraphError::api(format!("Unexpected Graph response shape: {}", e), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_bodies() {
        assert_eq!(
            interpret(HttpResponse::new(204, Vec::new())).unwrap(),
            json!({})
        );
        assert_eq!(
            interpret(HttpResponse::json(200, &json!({"id": "1"}))).unwrap(),
            json!({"id": "1"})
        );
        let err = interpret(HttpResponse::new(200, "<html>")).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn status_mapping() {
        let auth = interpret(HttpResponse::new(401, "")).unwrap_err();
        assert_eq!(auth.kind_name(), "AuthenticationError");

        let throttled = interpret(HttpResponse::new(429, "")).unwrap_err();
        assert!(throttled.to_string().starts_with("Rate limit exceeded"));
        assert!(!throttled.is_transient());

        for status in [503, 504] {
            let err = interpret(HttpResponse::new(status, "")).unwrap_err();
            assert!(err.is_transient());
            assert!(err.to_string().contains("temporarily unavailable"));
        }

        let not_found = interpret(HttpResponse::json(
            404,
            &json!({"error": {"code": "ErrorItemNotFound", "message": "secret internal detail"}}),
        ))
        .unwrap_err();
        assert_eq!(not_found.to_string(), "Graph API error 404: ErrorItemNotFound");
        assert_eq!(not_found.status(), Some(404));

        let html = interpret(HttpResponse::new(500, "<html>oops</html>")).unwrap_err();
        assert_eq!(html.to_string(), "Graph API error 500: Internal Server Error");
    }
}
