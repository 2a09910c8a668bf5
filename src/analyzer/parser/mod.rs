//! Language Parser Registry
//!
//! Text parsers extract imports, functions, and call sites from single
//! files. Semantic analyzers return a whole-project model and take
//! precedence over text parsers for extensions they claim.

mod c_family;
mod go;
mod go_semantic;
mod java;
mod javascript;
mod python;

pub use c_family::CFamilyParser;
pub use go::GoParser;
pub use go_semantic::GoSemanticAnalyzer;
pub use java::JavaParser;
pub use javascript::JavaScriptParser;
pub use python::PythonParser;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A function extracted from source text.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub body: String,
    /// 1-based line of the definition
    pub line: usize,
}

/// Capability set for single-file text analysis.
pub trait LanguageParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str];

    /// Import tokens as written in the source
    fn extract_imports(&self, source: &str) -> Vec<String>;

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo>;

    /// Callee identifiers referenced inside a function body
    fn extract_calls(&self, body: &str) -> Vec<String>;

    /// Resolve an import token to a project-relative file path.
    /// None for externals and anything that does not exist on disk.
    fn resolve_import(&self, import: &str, current_file: &Path, root: &Path) -> Option<PathBuf>;
}

/// Per-type method grouping in a semantic model.
#[derive(Debug, Clone, Default)]
pub struct TypeModel {
    pub name: String,
    pub methods: Vec<FunctionInfo>,
}

#[derive(Debug, Clone, Default)]
pub struct FileModel {
    pub functions: Vec<FunctionInfo>,
    pub types: Vec<TypeModel>,
}

/// Whole-project model produced by a semantic analyzer.
#[derive(Debug, Default)]
pub struct ProjectModel {
    /// file -> extracted declarations
    pub files: HashMap<String, FileModel>,
    /// file -> set of project files it depends on
    pub dependencies: HashMap<String, HashSet<String>>,
}

/// Whole-project capability for languages with a real module system.
pub trait SemanticAnalyzer: Send + Sync {
    fn name(&self) -> &'static str;

    fn extensions(&self) -> &'static [&'static str];

    /// `sources` carries (relative path, file contents) pairs.
    fn analyze_project(&self, sources: &[(String, String)]) -> ProjectModel;
}

pub fn default_parsers() -> Vec<Arc<dyn LanguageParser>> {
    vec![
        Arc::new(JavaScriptParser::new()),
        Arc::new(PythonParser::new()),
        Arc::new(JavaParser::new()),
        Arc::new(CFamilyParser::new()),
        Arc::new(GoParser::new()),
    ]
}

pub fn default_semantic_analyzers() -> Vec<Arc<dyn SemanticAnalyzer>> {
    vec![Arc::new(GoSemanticAnalyzer::new())]
}

/// First candidate path that exists under the root, as a relative path.
pub(crate) fn first_existing(root: &Path, candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|candidate| root.join(candidate).is_file())
        .cloned()
}

/// Normalize `a/b/../c` style segments without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

/// Identifier tokens that look like calls but never are.
pub(crate) fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "if" | "for"
            | "while"
            | "switch"
            | "return"
            | "catch"
            | "match"
            | "new"
            | "function"
            | "def"
            | "func"
            | "print"
            | "println"
            | "sizeof"
            | "typeof"
            | "defer"
            | "go"
            | "else"
            | "do"
    )
}
