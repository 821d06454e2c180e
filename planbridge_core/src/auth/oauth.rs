//! Microsoft identity platform device-code flow and refresh-token grant.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::AuthConfig;
use crate::error::GraphError;
use crate::http::{HttpRequest, HttpTransport, Method};

use super::token_store::StoredTokens;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthStart {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub interval: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_expires_in() -> i64 {
    900
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The user has not finished signing in yet.
    Pending,
    /// Polling too fast; back off by at least five seconds.
    SlowDown,
    Complete(StoredTokens),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, now_secs: i64) -> StoredTokens {
        StoredTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now_secs + self.expires_in.unwrap_or(3_600),
            scope: self.scope,
        }
    }
}

#[derive(Deserialize, Default)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
}

pub struct MicrosoftOAuth {
    transport: Arc<dyn HttpTransport>,
    authority: Url,
    tenant_id: String,
    client_id: String,
    scopes: String,
}

impl MicrosoftOAuth {
    pub fn new(config: &AuthConfig, transport: Arc<dyn HttpTransport>) -> Result<Self, GraphError> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                GraphError::authentication(
                    "No client id configured. Set PLANBRIDGE_CLIENT_ID or auth.client_id",
                )
            })?;
        let mut authority = config.authority.clone();
        if !authority.ends_with('/') {
            authority.push('/');
        }
        let authority = Url::parse(&authority)
            .map_err(|e| GraphError::authentication(format!("Invalid authority URL: {}", e)))?;
        let tenant_id = if config.tenant_id.trim().is_empty() {
            "common".to_string()
        } else {
            config.tenant_id.trim().to_string()
        };
        Ok(Self {
            transport,
            authority,
            tenant_id,
            client_id,
            scopes: config.scopes.join(" "),
        })
    }

    fn endpoint(&self, leaf: &str) -> Result<Url, GraphError> {
        self.authority
            .join(&format!("{}/oauth2/v2.0/{}", self.tenant_id, leaf))
            .map_err(|e| GraphError::authentication(format!("Invalid authority URL: {}", e)))
    }

    async fn post_form(
        &self,
        url: Url,
        fields: &[(&str, &str)],
    ) -> Result<(u16, serde_json::Value), GraphError> {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter().copied())
            .finish();
        let request = HttpRequest {
            method: Method::Post,
            url,
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                ("Accept".to_string(), "application/json".to_string()),
            ],
            body: Some(body.into_bytes()),
        };
        let response = self.transport.send(request).await.map_err(|e| {
            GraphError::transient(
                format!("Could not reach the Microsoft identity platform: {}", e),
                None,
            )
        })?;
        let value = serde_json::from_slice(&response.body).unwrap_or(serde_json::Value::Null);
        Ok((response.status, value))
    }

    pub async fn device_authorize(&self) -> Result<DeviceAuthStart, GraphError> {
        let url = self.endpoint("devicecode")?;
        let (status, body) = self
            .post_form(
                url,
                &[("client_id", self.client_id.as_str()), ("scope", self.scopes.as_str())],
            )
            .await?;
        if !(200..300).contains(&status) {
            let err: OAuthErrorBody = serde_json::from_value(body).unwrap_or_default();
            return Err(GraphError::authentication(format!(
                "Device authorization failed: {}",
                non_empty(&err.error, "unknown_error")
            )));
        }
        serde_json::from_value(body).map_err(|e| {
            GraphError::authentication(format!("Unexpected device authorization response: {}", e))
        })
    }

    pub async fn device_poll(&self, device_code: &str) -> Result<PollOutcome, GraphError> {
        let url = self.endpoint("token")?;
        let (status, body) = self
            .post_form(
                url,
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", self.client_id.as_str()),
                    ("device_code", device_code),
                ],
            )
            .await?;
        if (200..300).contains(&status) {
            let tokens: TokenResponse = serde_json::from_value(body).map_err(|e| {
                GraphError::authentication(format!("Unexpected token response: {}", e))
            })?;
            return Ok(PollOutcome::Complete(
                tokens.into_stored(chrono::Utc::now().timestamp()),
            ));
        }

        let err: OAuthErrorBody = serde_json::from_value(body).unwrap_or_default();
        match err.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "expired_token" | "code_expired" => Err(GraphError::authentication(
                "The sign-in code expired. Start the device sign-in again",
            )),
            "authorization_declined" | "access_denied" => {
                Err(GraphError::authentication("Sign-in was declined"))
            }
            other => Err(GraphError::authentication(format!(
                "Sign-in failed: {}",
                non_empty(other, "unknown_error")
            ))),
        }
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<StoredTokens, GraphError> {
        let url = self.endpoint("token")?;
        let (status, body) = self
            .post_form(
                url,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", self.client_id.as_str()),
                    ("refresh_token", refresh_token),
                    ("scope", self.scopes.as_str()),
                ],
            )
            .await?;
        if !(200..300).contains(&status) {
            let err: OAuthErrorBody = serde_json::from_value(body).unwrap_or_default();
            return Err(GraphError::authentication(format!(
                "Session expired ({}). Sign in again",
                non_empty(&err.error, "refresh_failed")
            )));
        }
        let tokens: TokenResponse = serde_json::from_value(body)
            .map_err(|e| GraphError::authentication(format!("Unexpected token response: {}", e)))?;
        Ok(tokens.into_stored(chrono::Utc::now().timestamp()))
    }
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}
