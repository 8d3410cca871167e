use ras_identity_oidc::OidcError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while running a relying party command
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Configuration file {path} does not exist")]
    ConfigFileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error(transparent)]
    Oidc(#[from] OidcError),

    #[error("Failed to serialize output: {0}")]
    Output(#[from] serde_json::Error),
}
