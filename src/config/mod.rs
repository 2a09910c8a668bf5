//! Configuration Types
//!
//! Process-wide settings loaded once at startup and passed by `Arc`
//! through the worker, orchestrator, and kernel constructors. Never
//! mutated after load.

mod loader;

pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{Result, ScribeError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite store
    pub database_path: String,

    /// Base directory for cloned working trees
    pub repositories_path: String,

    /// LLM endpoint settings
    pub openai: OpenAiConfig,

    /// Documentation pipeline settings
    pub document: DocumentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "gitscribe.db".to_string(),
            repositories_path: "repositories".to_string(),
            openai: OpenAiConfig::default(),
            document: DocumentConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.openai.endpoint.is_empty() {
            return Err(ScribeError::Config(
                "openai.endpoint must be set".to_string(),
            ));
        }
        if self.openai.chat_model.is_empty() {
            return Err(ScribeError::Config(
                "openai.chat_model must be set".to_string(),
            ));
        }
        if self.document.update_interval_days == 0 {
            return Err(ScribeError::Config(
                "document.update_interval_days must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Model Provider
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelProvider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
}

impl FromStr for ModelProvider {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azureopenai" => Ok(Self::AzureOpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ScribeError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "OpenAI"),
            Self::AzureOpenAi => write!(f, "AzureOpenAI"),
            Self::Anthropic => write!(f, "Anthropic"),
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

/// Connection settings for the chat endpoint.
///
/// The API key is skipped on serialization and redacted in Debug output;
/// the kernel converts it to a SecretString at construction.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,

    #[serde(skip_serializing)]
    pub chat_api_key: String,

    /// Model used by the documentation stages
    pub chat_model: String,

    /// Model used by analysis-heavy calls (directory simplifier)
    pub analysis_model: String,

    /// One of: OpenAI, AzureOpenAI, Anthropic
    pub model_provider: String,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("endpoint", &self.endpoint)
            .field("chat_api_key", &"[REDACTED]")
            .field("chat_model", &self.chat_model)
            .field("analysis_model", &self.analysis_model)
            .field("model_provider", &self.model_provider)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            chat_api_key: String::new(),
            chat_model: "gpt-4o".to_string(),
            analysis_model: "gpt-4o".to_string(),
            model_provider: "OpenAI".to_string(),
        }
    }
}

impl OpenAiConfig {
    pub fn provider(&self) -> Result<ModelProvider> {
        self.model_provider.parse()
    }
}

// =============================================================================
// Document Pipeline Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CatalogueFormat {
    #[default]
    Compact,
    Json,
    Pathlist,
}

impl FromStr for CatalogueFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            "pathlist" => Ok(Self::Pathlist),
            other => Err(format!(
                "unknown catalogue format: {} (valid: compact, json, pathlist)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// LLM-filter large directory trees in the catalogue stage
    pub enable_smart_filter: bool,

    /// Strip blank/comment lines from code returned by the file tools
    pub enable_code_compression: bool,

    /// Expose the dependency-analysis tools to the model
    pub enable_code_dependency_analysis: bool,

    /// Representation handed to the catalogue stage
    pub catalogue_format: CatalogueFormat,

    /// Staleness threshold for the incremental updater (days)
    pub update_interval_days: u32,

    /// Regenerate the commit record set on each successful run
    pub enable_warehouse_commit: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            enable_smart_filter: true,
            enable_code_compression: false,
            enable_code_dependency_analysis: true,
            catalogue_format: CatalogueFormat::Compact,
            update_interval_days: 7,
            enable_warehouse_commit: true,
        }
    }
}
