//! Credentials for Microsoft Graph.
//!
//! The Graph client only sees [`TokenProvider`]. Everything else here
//! (device-code sign-in, refresh, persistence) sits behind it and is wired
//! up explicitly at startup.

pub mod oauth;
pub mod provider;
pub mod service;
pub mod token_store;

use async_trait::async_trait;

use crate::error::GraphError;

pub use oauth::{DeviceAuthStart, MicrosoftOAuth, PollOutcome};
pub use provider::OAuthTokenProvider;
pub use service::{AuthService, AuthStatus, DevicePollStatus};
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredTokens, TokenStore};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token usable right now. Fails with
    /// [`GraphError::Authentication`] when no valid credential exists.
    async fn get_valid_access_token(&self) -> Result<String, GraphError>;
}

/// Fixed token, for tests and for callers that manage tokens themselves.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// A provider that always reports "not signed in".
    pub fn signed_out() -> Self {
        Self { token: None }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_valid_access_token(&self) -> Result<String, GraphError> {
        self.token
            .clone()
            .ok_or_else(|| GraphError::authentication("Not signed in to Microsoft Graph"))
    }
}
