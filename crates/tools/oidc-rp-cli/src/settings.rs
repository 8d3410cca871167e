//! Layered settings for the relying party CLI.
//!
//! Sources, later ones taking precedence:
//! - TOML file (`--config`, else `OIDC_CONFIG_FILE`, else `oidc.toml` when present)
//! - Environment variables with the `OIDC` prefix, e.g. `OIDC__RP__CLIENT_ID`

use config::{Config as ConfigBuilder, Environment, File};
use ras_identity_oidc::RelyingPartyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ToolError;

const DEFAULT_CONFIG_FILE: &str = "oidc.toml";
const CONFIG_FILE_VAR: &str = "OIDC_CONFIG_FILE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Relying party configuration
    pub rp: RelyingPartyConfig,

    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from an optional file and the environment.
    ///
    /// An explicitly requested file must exist; the default `oidc.toml` is
    /// skipped when absent.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ToolError> {
        let mut builder = ConfigBuilder::builder();

        let requested = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_VAR).map(PathBuf::from));

        match requested {
            Some(path) if !path.exists() => {
                return Err(ToolError::ConfigFileNotFound { path });
            }
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                builder = builder.add_source(File::from(path));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                debug!("Loading configuration from {}", DEFAULT_CONFIG_FILE);
                builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
            }
            None => debug!("No configuration file, using environment only"),
        }

        builder = builder.add_source(
            Environment::with_prefix("OIDC")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ToolError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ToolError::InvalidSetting(format!(
                "log level '{}' must be one of {:?}",
                self.logging.level, valid_levels
            )));
        }
        Ok(())
    }
}
