pub mod auth;
pub mod call;
pub mod config;
pub mod tools;

use planbridge_core::config::{Config, ConfigError};
use planbridge_core::error::{ConnectorError, GraphError};
use planbridge_core::AppContext;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Connector '{0}' not found")]
    ConnectorNotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Tool error: {0}")]
    ToolFailed(String),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Graph(#[from] GraphError),

    #[error("Core library error: {0}")]
    Core(#[from] ConnectorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] planbridge_core::config::TomlSerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

/// Load configuration and wire the Graph client, auth service and registry.
pub fn load_context() -> Result<AppContext> {
    let config = Config::load_default()?;
    Ok(AppContext::from_config(config)?)
}
