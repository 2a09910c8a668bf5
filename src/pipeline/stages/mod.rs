//! Stage Runners
//!
//! One module per pipeline stage. Every stage is a re-invokable async
//! function over the shared [`StageContext`]; skip rules are derived
//! from store state so that re-entry after a crash resumes from the
//! first incomplete stage.

pub mod catalogue;
pub mod changelog;
pub mod classify;
pub mod mindmap;
pub mod overview;
pub mod per_doc;
pub mod readme;
pub mod think_catalogue;

use std::path::PathBuf;

use crate::config::Config;
use crate::kernel::Kernel;
use crate::store::Store;
use crate::types::{Document, Repository, Result, ScribeError};

pub struct StageContext<'a> {
    pub repository: &'a mut Repository,
    pub document: &'a Document,
    /// Kernel with the code-analysis plugin enabled
    pub kernel: &'a Kernel,
    /// Kernel restricted to the plain file tools
    pub file_kernel: &'a Kernel,
    pub store: &'a Store,
    pub config: &'a Config,
}

impl StageContext<'_> {
    pub fn work_dir(&self) -> Result<PathBuf> {
        self.repository
            .work_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| {
                ScribeError::Storage(format!(
                    "repository {} has no working tree",
                    self.repository.id
                ))
            })
    }

    pub fn branch(&self) -> String {
        self.repository
            .branch
            .clone()
            .unwrap_or_else(|| "main".to_string())
    }

    pub fn manifest(&self) -> String {
        self.repository
            .optimized_directory_structure
            .clone()
            .unwrap_or_default()
    }

    pub fn readme(&self) -> String {
        self.repository.readme.clone().unwrap_or_default()
    }

    pub fn repository_name(&self) -> String {
        self.repository
            .name
            .clone()
            .unwrap_or_else(|| self.repository.web_address())
    }
}

/// Kebab-case slug for catalogue urls.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = true;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
