use std::future::Future;

use chrono::Utc;
use uuid::Uuid;

/// Per-call correlation data. Created for every `tools/call` and dropped
/// once the call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub tool_name: String,
    pub timestamp_ms: i64,
}

impl RequestContext {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            timestamp_ms: Utc::now().timestamp_millis(),
        }
    }

    pub async fn scope<F, Fut, T>(self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        REQUEST_CONTEXT.scope(self, f()).await
    }

    pub fn elapsed_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.timestamp_ms
    }
}

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

/// The context of the tool call running on this task, if any.
pub fn current_context() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.clone()).ok()
}
