use std::path::Path;

use magi_models::{MagiConfig, ProviderKind, TradeMode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load the TOML config. A missing file yields the defaults.
pub fn load_config(path: &str) -> Result<MagiConfig, ConfigError> {
    if !Path::new(path).exists() {
        tracing::info!(path, "Config file not found, using defaults");
        return Ok(MagiConfig::default());
    }
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_string(),
        source,
    })
}

/// Command-line or environment overrides applied on top of the file.
pub fn apply_overrides(
    config: &mut MagiConfig,
    provider: Option<ProviderKind>,
    mode: Option<TradeMode>,
) {
    if let Some(kind) = provider {
        if kind != config.provider.kind {
            // A model or endpoint picked for another vendor does not carry over.
            config.provider.model = None;
            config.provider.base_url = None;
            config.provider.api_key_env = None;
        }
        config.provider.kind = kind;
    }
    if let Some(mode) = mode {
        config.trading.mode = mode;
    }
}

/// Read a credential from the named environment variable.
pub fn secret(env_var: &str) -> Result<String, ConfigError> {
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnv(env_var.to_string())),
    }
}

pub fn provider_api_key(config: &MagiConfig) -> Result<String, ConfigError> {
    let env_var = config
        .provider
        .api_key_env
        .clone()
        .unwrap_or_else(|| config.provider.kind.default_api_key_env().to_string());
    secret(&env_var)
}
