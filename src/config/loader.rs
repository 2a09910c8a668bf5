//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources:
//! 1. Built-in defaults (Serialized)
//! 2. Config file (gitscribe.toml, or an explicit path)
//! 3. Environment variables (GITSCRIBE_ prefix, double underscore as the
//!    section separator: GITSCRIBE_OPENAI__CHAT_API_KEY -> openai.chat_api_key)

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use tracing::debug;

use super::Config;
use crate::types::{Result, ScribeError};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with the full resolution chain:
    /// defaults -> gitscribe.toml -> env vars.
    pub fn load() -> Result<Config> {
        Self::load_with_file(Path::new("gitscribe.toml"))
    }

    /// Load configuration using an explicit file path.
    pub fn load_with_file(path: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if path.exists() {
            debug!("loading config from: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("GITSCRIBE_").split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| ScribeError::Config(format!("configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}
