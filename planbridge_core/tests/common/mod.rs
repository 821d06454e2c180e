#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use planbridge_core::auth::StaticTokenProvider;
use planbridge_core::clock::ManualClock;
use planbridge_core::graph_client::{GraphClient, GraphClientConfig};
use planbridge_core::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use planbridge_core::resilience::RetryPolicy;

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Option<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        })
    }

    /// Answers every request with `response`.
    pub fn always(response: HttpResponse) -> Arc<Self> {
        Arc::new(Self {
            fallback: Some(response),
            ..Self::default()
        })
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request(&self, index: usize) -> HttpRequest {
        self.requests()[index].clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn body_json(&self, index: usize) -> Value {
        let body = self.request(index).body.expect("request has a body");
        serde_json::from_slice(&body).expect("body is JSON")
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => Err(TransportError::Network("script exhausted".to_string())),
        }
    }
}

/// Fast retries so paused-time tests stay short.
pub fn test_config() -> GraphClientConfig {
    GraphClientConfig {
        retry: RetryPolicy::new(3, 10),
        ..GraphClientConfig::default()
    }
}

pub fn client_with(
    transport: Arc<ScriptedTransport>,
    config: GraphClientConfig,
    clock: Arc<ManualClock>,
) -> GraphClient {
    GraphClient::with_clock(
        config,
        transport,
        Arc::new(StaticTokenProvider::new("test-token")),
        clock,
    )
    .unwrap()
}

pub fn client(transport: Arc<ScriptedTransport>) -> Arc<GraphClient> {
    Arc::new(client_with(
        transport,
        test_config(),
        Arc::new(ManualClock::new()),
    ))
}

pub fn ok(value: Value) -> HttpResponse {
    HttpResponse::json(200, &value)
}
