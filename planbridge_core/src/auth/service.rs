use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::GraphError;

use super::oauth::{DeviceAuthStart, MicrosoftOAuth, PollOutcome};
use super::token_store::TokenStore;

/// Result of one device-code poll, as reported to callers. Never carries
/// token material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePollStatus {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub signed_in: bool,
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub can_refresh: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Sign-in lifecycle used by the auth tools and the CLI.
pub struct AuthService {
    oauth: Option<Arc<MicrosoftOAuth>>,
    store: Arc<dyn TokenStore>,
    pending_device_code: Mutex<Option<String>>,
}

impl AuthService {
    /// `oauth` is `None` when no client id is configured; sign-in is then
    /// unavailable but status and logout still work.
    pub fn new(oauth: Option<Arc<MicrosoftOAuth>>, store: Arc<dyn TokenStore>) -> Self {
        Self {
            oauth,
            store,
            pending_device_code: Mutex::new(None),
        }
    }

    fn oauth(&self) -> Result<&MicrosoftOAuth, GraphError> {
        self.oauth.as_deref().ok_or_else(|| {
            GraphError::authentication(
                "Sign-in is not configured. Set PLANBRIDGE_CLIENT_ID or auth.client_id",
            )
        })
    }

    pub async fn start_device(&self) -> Result<DeviceAuthStart, GraphError> {
        let start = self.oauth()?.device_authorize().await?;
        *self
            .pending_device_code
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(start.device_code.clone());
        info!(user_code = %start.user_code, "Device sign-in started");
        Ok(start)
    }

    /// Poll once. Without an explicit code, the one from the last
    /// `start_device` is used.
    pub async fn poll_device(&self, device_code: Option<&str>) -> Result<DevicePollStatus, GraphError> {
        let code = match device_code {
            Some(code) => code.to_string(),
            None => self
                .pending_device_code
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
                .ok_or_else(|| {
                    GraphError::validation("No device sign-in in progress. Call start_device first")
                })?,
        };

        let outcome = self.oauth()?.device_poll(&code).await;
        match outcome {
            Ok(PollOutcome::Pending) => Ok(DevicePollStatus {
                status: "pending".into(),
                message: "Waiting for the user to finish signing in".into(),
            }),
            Ok(PollOutcome::SlowDown) => Ok(DevicePollStatus {
                status: "slow_down".into(),
                message: "Polling too quickly; wait a few seconds before polling again".into(),
            }),
            Ok(PollOutcome::Complete(tokens)) => {
                self.store.save(&tokens)?;
                self.clear_pending();
                info!("Device sign-in completed");
                Ok(DevicePollStatus {
                    status: "complete".into(),
                    message: "Signed in to Microsoft Graph".into(),
                })
            }
            Err(e) => {
                self.clear_pending();
                Err(e)
            }
        }
    }

    pub fn status(&self) -> Result<AuthStatus, GraphError> {
        let now = chrono::Utc::now().timestamp();
        Ok(match self.store.load()? {
            Some(tokens) => AuthStatus {
                signed_in: true,
                expired: !tokens.is_fresh(now, 0),
                expires_at: chrono::DateTime::from_timestamp(tokens.expires_at, 0)
                    .map(|dt| dt.to_rfc3339()),
                can_refresh: tokens.refresh_token.as_deref().is_some_and(|t| !t.is_empty()),
                scope: tokens.scope,
            },
            None => AuthStatus {
                signed_in: false,
                expired: false,
                expires_at: None,
                can_refresh: false,
                scope: None,
            },
        })
    }

    pub fn logout(&self) -> Result<(), GraphError> {
        self.clear_pending();
        self.store.clear()?;
        info!("Signed out of Microsoft Graph");
        Ok(())
    }

    fn clear_pending(&self) {
        *self
            .pending_device_code
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
    }
}
