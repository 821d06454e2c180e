use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::GraphError;

use super::oauth::MicrosoftOAuth;
use super::token_store::{StoredTokens, TokenStore};
use super::TokenProvider;

/// Tokens closer than this to expiry are refreshed before use.
pub const EXPIRY_SKEW_SECS: i64 = 60;

/// Reads the token store on every call and refreshes through the identity
/// platform when the access token is about to expire. Concurrent callers
/// share a single refresh.
pub struct OAuthTokenProvider {
    oauth: Arc<MicrosoftOAuth>,
    store: Arc<dyn TokenStore>,
    refresh_lock: Mutex<()>,
}

impl OAuthTokenProvider {
    pub fn new(oauth: Arc<MicrosoftOAuth>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            oauth,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    fn load_signed_in(&self) -> Result<StoredTokens, GraphError> {
        self.store.load()?.ok_or_else(|| {
            GraphError::authentication(
                "Not signed in to Microsoft Graph. Run auth/microsoft/start_device or `planbridge login`",
            )
        })
    }
}

#[async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn get_valid_access_token(&self) -> Result<String, GraphError> {
        let now = chrono::Utc::now().timestamp();
        let tokens = self.load_signed_in()?;
        if tokens.is_fresh(now, EXPIRY_SKEW_SECS) {
            return Ok(tokens.access_token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let tokens = self.load_signed_in()?;
        if tokens.is_fresh(chrono::Utc::now().timestamp(), EXPIRY_SKEW_SECS) {
            return Ok(tokens.access_token);
        }

        let refresh_token = tokens
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GraphError::authentication("Session expired. Sign in again"))?;

        debug!("Access token expiring, refreshing");
        let mut fresh = self.oauth.refresh(&refresh_token).await?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        if fresh.scope.is_none() {
            fresh.scope = tokens.scope;
        }

        if let Err(e) = self.store.save(&fresh) {
            warn!(error = %e, "Refreshed token could not be persisted");
        } else {
            info!("Access token refreshed");
        }
        Ok(fresh.access_token)
    }
}
