//! GitScribe - Repository Ingestion & Documentation Pipeline
//!
//! A long-running background worker that turns Git repositories into
//! structured documentation artifacts: a README, an optimized directory
//! manifest, a classification, a knowledge-graph mind map, a project
//! overview, a hierarchical documentation catalogue with per-node
//! documents, and an update log.
//!
//! ## Architecture
//!
//! ```text
//! Worker Loop -> lease row -> clone/pull -> Pipeline Orchestrator
//!     -> Stage Runners -> Tool Kernel -> LLM + tools -> persisted artifacts
//! ```
//!
//! - [`worker`]: queue claiming, status transitions, the incremental updater
//! - [`pipeline`]: the eight-stage orchestrator and per-stage retry policy
//! - [`kernel`]: LLM connection, tool harness, wrapper extraction
//! - [`analyzer`]: per-file and per-function dependency graphs
//! - [`scanner`]: gitignore-aware tree scanning and compaction
//! - [`store`]: SQLite persistence with atomic repository leases
//!
//! Interrupted runs resume: each stage's skip rule is derived from store
//! state, regenerating stages delete-then-insert, and per-document
//! generation tracks completion per catalogue node.

pub mod analyzer;
pub mod config;
pub mod constants;
pub mod git;
pub mod kernel;
pub mod pipeline;
pub mod prompts;
pub mod scanner;
pub mod store;
pub mod types;
pub mod worker;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{CatalogueFormat, Config, ConfigLoader, ModelProvider};
pub use types::{Result, ScribeError};

pub use store::{SharedStore, Store};

pub use kernel::{Kernel, ToolSet};

pub use worker::{updater::Updater, Worker};

pub use analyzer::DependencyAnalyzer;
