//! Path Scanner & Tree Compactor
//!
//! Deterministic, gitignore-aware working-tree scanning and the compact
//! string forms consumed by the pipeline and the file tools.

pub mod gitignore;
pub mod tree;

pub use gitignore::{IgnoreList, IgnoreRule};
pub use tree::{
    build_tree, compact, file_count, render, scan, to_json, to_pathlist, FileTreeNode, PathInfo,
};
