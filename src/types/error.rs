//! Unified Error Type System
//!
//! Centralized error types for the entire application.
//! Classification is intentionally coarse: the only routing decision the
//! pipeline makes is "retry this stage attempt or fail the run".
//!
//! ## Error Categories
//!
//! - Transport/LLM errors are retryable by the per-stage retry policy
//! - Store precondition failures mean the lease was lost; the worker
//!   abandons the row without further writes
//! - Everything else is terminal for the current run

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScribeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // LLM Errors
    // -------------------------------------------------------------------------
    /// Transport-level or provider-level failure reaching the model.
    /// Retryable by the per-stage policy.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    #[error("unsupported model provider: {0}")]
    UnsupportedProvider(String),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// A stage exhausted its retry budget or hit a non-retryable error.
    #[error("stage {stage} failed after {attempts} attempt(s): {message}")]
    Stage {
        stage: &'static str,
        attempts: u32,
        message: String,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("invalid scan root: {}", .0.display())]
    InvalidRoot(PathBuf),

    #[error("git operation failed: {0}")]
    Git(String),

    #[error("unsupported repository type: {0}")]
    UnsupportedRepositoryType(String),

    /// Conditional write matched zero rows: another worker holds the lease.
    #[error("store precondition failed: {0}")]
    StorePreconditionFailed(String),

    /// Shutdown requested mid-run. Partial state is valid for resume, so
    /// the worker abandons the row without a terminal status write.
    #[error("cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ScribeError {
    /// Create an LLM error from a message
    pub fn llm(message: impl Into<String>) -> Self {
        Self::LlmApi(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Errors the per-stage retry policy is allowed to retry.
    ///
    /// Network hiccups, rate limits, and malformed streaming chunks all
    /// surface as `LlmApi` or `Http`; everything else fails the stage
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmApi(_) | Self::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, ScribeError>;

/// Context extension trait for adding context to storage errors
pub trait ResultExt<T> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| ScribeError::Storage(format!("{}: {}", context.into(), e)))
    }
}
