//! Dependency Analyzer
//!
//! Builds per-file and per-function dependency trees for a working tree.
//! The first call triggers an Initialize pass: source files are
//! enumerated through the gitignore-aware scanner, partitioned into
//! semantic-analyzable and text-parser groups, analyzed with fan-out
//! parallelism, and merged into three maps:
//!
//! - `file -> functions`
//! - `file -> dependency files`
//! - `"file:function" -> file`
//!
//! DFS over those maps threads an explicit visited set per branch, so
//! sibling subtrees are independent and re-entry is marked `is_cyclic`
//! rather than expanded.

pub mod graph;
pub mod parser;

pub use graph::{draw_file_tree, file_tree_to_dot, FileDependencyNode, FunctionDependencyNode, FunctionRef};
pub use parser::{FunctionInfo, LanguageParser, ProjectModel, SemanticAnalyzer};

use dashmap::DashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::constants::analyzer::{MAX_FILE_DEPTH, MAX_FUNCTION_DEPTH};
use crate::scanner;
use crate::types::Result;

pub struct DependencyAnalyzer {
    root: PathBuf,
    parsers: Vec<Arc<dyn LanguageParser>>,
    semantic: Vec<Arc<dyn SemanticAnalyzer>>,
    file_functions: DashMap<String, Vec<FunctionInfo>>,
    file_dependencies: DashMap<String, HashSet<String>>,
    /// `"file:function"` -> file
    function_index: DashMap<String, String>,
    init: OnceCell<()>,
}

impl DependencyAnalyzer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            parsers: parser::default_parsers(),
            semantic: parser::default_semantic_analyzers(),
            file_functions: DashMap::new(),
            file_dependencies: DashMap::new(),
            function_index: DashMap::new(),
            init: OnceCell::new(),
        }
    }

    fn parser_for(&self, path: &str) -> Option<Arc<dyn LanguageParser>> {
        let ext = Path::new(path).extension()?.to_str()?;
        self.parsers
            .iter()
            .find(|p| p.extensions().contains(&ext))
            .cloned()
    }

    fn semantic_for(&self, path: &str) -> Option<Arc<dyn SemanticAnalyzer>> {
        let ext = Path::new(path).extension()?.to_str()?;
        self.semantic
            .iter()
            .find(|a| a.extensions().contains(&ext))
            .cloned()
    }

    async fn ensure_initialized(&self) -> Result<()> {
        self.init.get_or_try_init(|| self.initialize()).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        let paths = scanner::scan(&self.root)?;

        // partition: semantic analyzers take precedence for their extensions
        let mut semantic_groups: Vec<(Arc<dyn SemanticAnalyzer>, Vec<String>)> = self
            .semantic
            .iter()
            .map(|a| (a.clone(), Vec::new()))
            .collect();
        let mut text_files: Vec<(Arc<dyn LanguageParser>, String)> = Vec::new();

        for info in paths.iter().filter(|p| !p.is_dir) {
            if let Some(analyzer) = self.semantic_for(&info.path) {
                if let Some(slot) = semantic_groups
                    .iter_mut()
                    .find(|(a, _)| a.name() == analyzer.name())
                {
                    slot.1.push(info.path.clone());
                }
            } else if let Some(parser) = self.parser_for(&info.path) {
                text_files.push((parser, info.path.clone()));
            }
            // unknown extensions are ignored
        }

        // text parsers fan out per file
        let mut set = JoinSet::new();
        for (parser, path) in text_files {
            let root = self.root.clone();
            set.spawn(async move {
                let source = match tokio::fs::read_to_string(root.join(&path)).await {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(file = %path, error = %e, "skipping unreadable file");
                        return None;
                    }
                };
                let functions = parser.extract_functions(&source);
                let deps: HashSet<String> = parser
                    .extract_imports(&source)
                    .iter()
                    .filter_map(|import| {
                        parser.resolve_import(import, Path::new(&path), &root)
                    })
                    .map(|p| p.to_string_lossy().replace('\\', "/"))
                    .collect();
                Some((path, functions, deps))
            });
        }

        while let Some(joined) = set.join_next().await {
            let Ok(Some((path, functions, deps))) = joined else {
                continue;
            };
            for function in &functions {
                self.function_index
                    .insert(format!("{}:{}", path, function.name), path.clone());
            }
            self.file_functions.insert(path.clone(), functions);
            self.file_dependencies.insert(path, deps);
        }

        // semantic analyzers run once per group over all their sources
        for (analyzer, files) in semantic_groups {
            if files.is_empty() {
                continue;
            }
            let mut sources = Vec::with_capacity(files.len());
            for path in files {
                match tokio::fs::read_to_string(self.root.join(&path)).await {
                    Ok(source) => sources.push((path, source)),
                    Err(e) => warn!(file = %path, error = %e, "skipping unreadable file"),
                }
            }
            let model = {
                let analyzer = analyzer.clone();
                tokio::task::spawn_blocking(move || analyzer.analyze_project(&sources))
                    .await
                    .map_err(|e| crate::types::ScribeError::Storage(e.to_string()))?
            };
            self.merge_model(model);
        }

        debug!(
            files = self.file_functions.len(),
            functions = self.function_index.len(),
            "dependency analyzer initialized"
        );
        Ok(())
    }

    fn merge_model(&self, model: ProjectModel) {
        for (path, file) in model.files {
            let mut functions = file.functions;
            for ty in file.types {
                functions.extend(ty.methods);
            }
            for function in &functions {
                self.function_index
                    .insert(format!("{}:{}", path, function.name), path.clone());
            }
            self.file_functions.insert(path, functions);
        }
        for (path, deps) in model.dependencies {
            self.file_dependencies.insert(path, deps);
        }
    }

    // =========================================================================
    // File dependency trees
    // =========================================================================

    pub async fn analyze_file_dependency_tree(&self, file: &str) -> Result<FileDependencyNode> {
        self.ensure_initialized().await?;
        Ok(self.file_dfs(file, 0, &HashSet::new()))
    }

    fn file_dfs(&self, file: &str, depth: usize, visited: &HashSet<String>) -> FileDependencyNode {
        let mut node = FileDependencyNode::new(file);

        if visited.contains(file) {
            node.is_cyclic = true;
            return node;
        }

        node.functions = self
            .file_functions
            .get(file)
            .map(|funcs| {
                funcs
                    .iter()
                    .map(|f| FunctionRef {
                        name: f.name.clone(),
                        line: f.line,
                    })
                    .collect()
            })
            .unwrap_or_default();

        // past the depth limit: return the node truncated, not cyclic
        if depth > MAX_FILE_DEPTH {
            return node;
        }

        let mut deps: Vec<String> = self
            .file_dependencies
            .get(file)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        deps.sort();

        // branch-local visited set keeps sibling subtrees independent
        let mut branch = visited.clone();
        branch.insert(file.to_string());
        for dep in deps {
            node.children.push(self.file_dfs(&dep, depth + 1, &branch));
        }
        node
    }

    // =========================================================================
    // Function call trees
    // =========================================================================

    pub async fn analyze_function_dependency_tree(
        &self,
        file: &str,
        function: &str,
    ) -> Result<FunctionDependencyNode> {
        self.ensure_initialized().await?;
        Ok(self.function_dfs(file, function, 0, &HashSet::new()))
    }

    fn function_dfs(
        &self,
        file: &str,
        function: &str,
        depth: usize,
        visited: &HashSet<String>,
    ) -> FunctionDependencyNode {
        let key = format!("{}:{}", file, function);
        let line = self
            .file_functions
            .get(file)
            .and_then(|funcs| funcs.iter().find(|f| f.name == function).map(|f| f.line))
            .unwrap_or(0);
        let mut node = FunctionDependencyNode::new(file, function, line);

        if visited.contains(&key) {
            node.is_cyclic = true;
            return node;
        }
        if depth > MAX_FUNCTION_DEPTH {
            return node;
        }

        let body = self
            .file_functions
            .get(file)
            .and_then(|funcs| funcs.iter().find(|f| f.name == function).map(|f| f.body.clone()));
        let Some(body) = body else {
            return node;
        };
        let Some(parser) = self.parser_for(file) else {
            return node;
        };

        let mut branch = visited.clone();
        branch.insert(key);
        for callee in parser.extract_calls(&body) {
            if callee == function {
                // direct recursion still gets a cyclic child
                let mut child = FunctionDependencyNode::new(file, &callee, line);
                child.is_cyclic = true;
                node.children.push(child);
                continue;
            }
            if let Some(target) = self.resolve_callee(file, &callee) {
                node.children
                    .push(self.function_dfs(&target, &callee, depth + 1, &branch));
            }
            // unresolved callees are external: ignored
        }
        node
    }

    /// Resolution order: same file, imported files, then a global
    /// fallback across every indexed function.
    fn resolve_callee(&self, file: &str, callee: &str) -> Option<String> {
        if self.function_index.contains_key(&format!("{}:{}", file, callee)) {
            return Some(file.to_string());
        }
        if let Some(deps) = self.file_dependencies.get(file) {
            let mut deps: Vec<&String> = deps.iter().collect();
            deps.sort();
            for dep in deps {
                if self.function_index.contains_key(&format!("{}:{}", dep, callee)) {
                    return Some(dep.clone());
                }
            }
        }
        let suffix = format!(":{}", callee);
        let mut matches: Vec<String> = self
            .function_index
            .iter()
            .filter(|entry| entry.key().ends_with(&suffix))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort();
        matches.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("main.py"),
            "from util import helper\n\ndef run():\n    return helper()\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("util.py"),
            "from main import run\n\ndef helper():\n    return other()\n\ndef other():\n    return 1\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_file_tree_with_cycle_marking() {
        let dir = fixture();
        let analyzer = DependencyAnalyzer::new(dir.path());
        let tree = analyzer.analyze_file_dependency_tree("main.py").await.unwrap();

        assert_eq!(tree.full_path, "main.py");
        assert!(!tree.is_cyclic);
        assert!(tree.functions.iter().any(|f| f.name == "run"));

        let util = &tree.children[0];
        assert_eq!(util.full_path, "util.py");
        // util.py imports main.py back: the re-entry is marked, not expanded
        let back = &util.children[0];
        assert_eq!(back.full_path, "main.py");
        assert!(back.is_cyclic);
        assert!(back.children.is_empty());
    }

    #[tokio::test]
    async fn test_function_tree_resolution() {
        let dir = fixture();
        let analyzer = DependencyAnalyzer::new(dir.path());
        let tree = analyzer
            .analyze_function_dependency_tree("main.py", "run")
            .await
            .unwrap();

        assert_eq!(tree.name, "main.py:run");
        let helper = tree
            .children
            .iter()
            .find(|c| c.function == "helper")
            .expect("helper resolved through import");
        assert_eq!(helper.file, "util.py");
        // helper calls other in the same file
        assert!(helper.children.iter().any(|c| c.name == "util.py:other"));
    }

    #[tokio::test]
    async fn test_depth_truncation() {
        let dir = tempfile::tempdir().unwrap();
        // a chain a0 -> a1 -> ... -> a14, each importing the next
        for i in 0..15 {
            let body = if i < 14 {
                format!("from a{} import noop\n\ndef noop():\n    pass\n", i + 1)
            } else {
                "def noop():\n    pass\n".to_string()
            };
            fs::write(dir.path().join(format!("a{}.py", i)), body).unwrap();
        }

        let analyzer = DependencyAnalyzer::new(dir.path());
        let tree = analyzer.analyze_file_dependency_tree("a0.py").await.unwrap();

        // walk to the deepest node
        let mut node = &tree;
        let mut depth = 0;
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        // nodes exist through depth 10; the node at depth 11 is truncated
        assert_eq!(depth, MAX_FILE_DEPTH + 1);
        assert!(!node.is_cyclic);
        assert!(node.children.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_extension_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not code").unwrap();
        fs::write(dir.path().join("a.py"), "def f():\n    pass\n").unwrap();

        let analyzer = DependencyAnalyzer::new(dir.path());
        let tree = analyzer.analyze_file_dependency_tree("a.py").await.unwrap();
        assert!(tree.functions.iter().any(|f| f.name == "f"));
    }
}
