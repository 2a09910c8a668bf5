//! Core Types
//!
//! Error types and domain entities shared by every module.

pub mod error;
pub mod models;

pub use error::{Result, ResultExt, ScribeError};
pub use models::{
    Classification, CommitRecord, Document, DocumentCatalogue, DocumentFileItem, DocumentOverview,
    MiniMapNode, Repository, RepositoryKind, RepositoryStatus,
};
