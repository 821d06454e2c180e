use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Persisted Microsoft credential set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

impl StoredTokens {
    /// True while the access token stays valid for at least `skew_secs`.
    pub fn is_fresh(&self, now_secs: i64, skew_secs: i64) -> bool {
        !self.access_token.is_empty() && self.expires_at - skew_secs > now_secs
    }
}

impl std::fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredTokens>, GraphError>;
    fn save(&self, tokens: &StoredTokens) -> Result<(), GraphError>;
    fn clear(&self) -> Result<(), GraphError>;
}

/// In-process store, mainly for tests and `token_store = "memory"`.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<StoredTokens>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: StoredTokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, GraphError> {
        self.tokens
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| GraphError::token_storage(format!("lock poisoned: {}", e)))
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), GraphError> {
        *self
            .tokens
            .lock()
            .map_err(|e| GraphError::token_storage(format!("lock poisoned: {}", e)))? =
            Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), GraphError> {
        *self
            .tokens
            .lock()
            .map_err(|e| GraphError::token_storage(format!("lock poisoned: {}", e)))? = None;
        Ok(())
    }
}

/// JSON file, by default `<config_dir>/planbridge/tokens.json`, written with
/// owner-only permissions on Unix.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn new_default() -> Self {
        Self::new(Self::default_path())
    }

    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("planbridge").join("tokens.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<StoredTokens>, GraphError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GraphError::token_storage(format!(
                    "Could not read token cache: {}",
                    e
                )))
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| GraphError::token_storage(format!("Token cache is corrupt: {}", e)))
    }

    fn save(&self, tokens: &StoredTokens) -> Result<(), GraphError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                GraphError::token_storage(format!("Could not create token directory: {}", e))
            })?;
        }
        let json = serde_json::to_string_pretty(tokens)
            .map_err(|e| GraphError::token_storage(format!("serde: {}", e)))?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .map_err(|e| GraphError::token_storage(format!("Could not open token cache: {}", e)))?;

        // The creation mode only applies to new files; tighten an existing one
        // before any token bytes land in it.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .map_err(|e| GraphError::token_storage(format!("chmod: {}", e)))?;
        }

        file.write_all(json.as_bytes())
            .map_err(|e| GraphError::token_storage(format!("Could not write token cache: {}", e)))
    }

    fn clear(&self) -> Result<(), GraphError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GraphError::token_storage(format!(
                "Could not remove token cache: {}",
                e
            ))),
        }
    }
}
