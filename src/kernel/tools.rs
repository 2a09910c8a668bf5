//! Filesystem Tool Set
//!
//! The tools the kernel advertises to the model. Every handler is scoped
//! to one working tree, catches its own failures, and returns a string
//! payload either way so the model can react to errors instead of the
//! pipeline aborting. File accesses are recorded into the per-request
//! DocumentContext for downstream source attribution.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::analyzer::DependencyAnalyzer;
use crate::constants::tools::{MAX_LINE_CHARS, MAX_WHOLE_FILE_BYTES};
use crate::kernel::chat::ToolSpec;
use crate::kernel::compression;
use crate::scanner;

const FILE_NOT_FOUND: &str = "File not found";

/// Per-request container recording the files the model touched.
#[derive(Debug, Default)]
pub struct DocumentContext {
    files: Mutex<Vec<String>>,
}

impl DocumentContext {
    pub fn record(&self, path: &str) {
        let mut files = self.files.lock().unwrap();
        if !files.iter().any(|f| f == path) {
            files.push(path.to_string());
        }
    }

    /// Drain the accessed-file list.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.files.lock().unwrap())
    }
}

pub struct ToolSet {
    work_dir: PathBuf,
    compress_code: bool,
    analyzer: Option<Arc<DependencyAnalyzer>>,
    context: Arc<DocumentContext>,
}

impl ToolSet {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        compress_code: bool,
        analyzer: Option<Arc<DependencyAnalyzer>>,
        context: Arc<DocumentContext>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            compress_code,
            analyzer,
            context,
        }
    }

    /// Tool specifications advertised to the model. The dependency tools
    /// appear only when the analyzer was attached at construction.
    pub fn specs(&self) -> Vec<ToolSpec> {
        let paths_schema = json!({
            "type": "object",
            "properties": {
                "filePaths": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Repository-relative file paths"
                }
            },
            "required": ["filePaths"]
        });

        let mut specs = vec![
            ToolSpec {
                name: "GetTree".into(),
                description: "Return the compact directory tree of the repository.".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolSpec {
                name: "FileInfo".into(),
                description:
                    "Return name, size, extension and line count for a batch of files.".into(),
                parameters: paths_schema.clone(),
            },
            ToolSpec {
                name: "ReadFiles".into(),
                description: "Read several files at once. Large files are rejected with a hint to use the line-ranged File tool.".into(),
                parameters: paths_schema,
            },
            ToolSpec {
                name: "ReadFile".into(),
                description: "Read a single file. Large files are rejected with a hint to use the line-ranged File tool.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "filePath": {"type": "string", "description": "Repository-relative file path"}
                    },
                    "required": ["filePath"]
                }),
            },
            ToolSpec {
                name: "File".into(),
                description: "Read line ranges from files. offset/limit of -1 read the whole file; limit of -1 reads to the end.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "items": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "filePath": {"type": "string"},
                                    "offset": {"type": "integer"},
                                    "limit": {"type": "integer"}
                                },
                                "required": ["filePath"]
                            }
                        }
                    },
                    "required": ["items"]
                }),
            },
        ];

        if self.analyzer.is_some() {
            specs.push(ToolSpec {
                name: "AnalyzeFileDependencyTree".into(),
                description: "Dependency tree of a source file as JSON.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"filePath": {"type": "string"}},
                    "required": ["filePath"]
                }),
            });
            specs.push(ToolSpec {
                name: "AnalyzeFunctionDependencyTree".into(),
                description: "Call tree of one function as JSON.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "filePath": {"type": "string"},
                        "functionName": {"type": "string"}
                    },
                    "required": ["filePath", "functionName"]
                }),
            });
        }
        specs
    }

    /// Invoke a tool by name. Failures come back as string payloads.
    pub async fn invoke(&self, name: &str, args: Value) -> String {
        match name {
            "GetTree" => self.get_tree(),
            "FileInfo" => self.file_info(&args),
            "ReadFiles" => self.read_files(&args),
            "ReadFile" => self.read_file_tool(&args),
            "File" => self.read_items(&args),
            "AnalyzeFileDependencyTree" => self.analyze_file_tree(&args).await,
            "AnalyzeFunctionDependencyTree" => self.analyze_function_tree(&args).await,
            other => format!("Unknown tool: {}", other),
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    fn get_tree(&self) -> String {
        match scanner::scan(&self.work_dir) {
            Ok(paths) => {
                let tree = scanner::build_tree(&paths, "repository");
                scanner::compact(&tree)
            }
            Err(e) => format!("Failed to scan repository tree: {}", e),
        }
    }

    fn file_info(&self, args: &Value) -> String {
        let mut paths = string_array(args, "filePaths");
        paths.dedup();
        let mut out = serde_json::Map::new();
        for path in paths {
            let resolved = match self.resolve(&path) {
                Some(resolved) if resolved.is_file() => resolved,
                _ => {
                    out.insert(path, Value::String(FILE_NOT_FOUND.into()));
                    continue;
                }
            };
            let size = std::fs::metadata(&resolved).map(|m| m.len()).unwrap_or(0);
            let lines = std::fs::read_to_string(&resolved)
                .map(|s| s.lines().count())
                .unwrap_or(0);
            out.insert(
                path.clone(),
                json!({
                    "name": resolved.file_name().and_then(|n| n.to_str()).unwrap_or(&path),
                    "size": size,
                    "extension": resolved.extension().and_then(|e| e.to_str()).unwrap_or(""),
                    "lines": lines,
                }),
            );
        }
        serde_json::to_string_pretty(&Value::Object(out)).unwrap_or_default()
    }

    fn read_files(&self, args: &Value) -> String {
        let mut paths = string_array(args, "filePaths");
        paths.dedup();
        let mut out = serde_json::Map::new();
        for path in paths {
            out.insert(path.clone(), Value::String(self.read_one(&path)));
        }
        serde_json::to_string_pretty(&Value::Object(out)).unwrap_or_default()
    }

    fn read_file_tool(&self, args: &Value) -> String {
        let Some(path) = args.get("filePath").and_then(Value::as_str) else {
            return "Missing filePath argument".into();
        };
        self.read_one(path)
    }

    fn read_one(&self, path: &str) -> String {
        let Some(resolved) = self.resolve(path) else {
            return FILE_NOT_FOUND.into();
        };
        if !resolved.is_file() {
            return FILE_NOT_FOUND.into();
        }
        let size = std::fs::metadata(&resolved).map(|m| m.len()).unwrap_or(0);
        if size > MAX_WHOLE_FILE_BYTES {
            return format!(
                "File too large ({} bytes). Use the File tool to read line ranges instead.",
                size
            );
        }
        match std::fs::read_to_string(&resolved) {
            Ok(content) => {
                self.context.record(path);
                self.maybe_compress(path, content)
            }
            Err(e) => format!("Failed to read {}: {}", path, e),
        }
    }

    fn read_items(&self, args: &Value) -> String {
        let Some(items) = args.get("items").and_then(Value::as_array) else {
            return "Missing items argument".into();
        };
        let mut out = serde_json::Map::new();
        for item in items {
            let Some(path) = item.get("filePath").and_then(Value::as_str) else {
                continue;
            };
            let offset = item.get("offset").and_then(Value::as_i64).unwrap_or(-1);
            let limit = item.get("limit").and_then(Value::as_i64).unwrap_or(-1);
            out.insert(
                path.to_string(),
                Value::String(self.read_range(path, offset, limit)),
            );
        }
        serde_json::to_string_pretty(&Value::Object(out)).unwrap_or_default()
    }

    /// Line-ranged read. `offset < 0 && limit < 0` reads the whole file;
    /// `limit < 0` reads to the end; lines are truncated, never wrapped.
    fn read_range(&self, path: &str, offset: i64, limit: i64) -> String {
        let Some(resolved) = self.resolve(path) else {
            return FILE_NOT_FOUND.into();
        };
        if !resolved.is_file() {
            return FILE_NOT_FOUND.into();
        }
        let content = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(e) => return format!("Failed to read {}: {}", path, e),
        };
        self.context.record(path);
        let content = self.maybe_compress(path, content);
        let lines: Vec<&str> = content.lines().collect();

        let start = if offset < 0 { 0 } else { offset as usize };
        if start >= lines.len() {
            return format!("There is no content at or after line {} in this file.", start);
        }
        let end = if limit < 0 {
            lines.len()
        } else {
            (start + limit as usize).min(lines.len())
        };

        lines[start..end]
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let truncated: String = line.chars().take(MAX_LINE_CHARS).collect();
                format!("{}: {}", start + i + 1, truncated)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn analyze_file_tree(&self, args: &Value) -> String {
        let Some(analyzer) = &self.analyzer else {
            return "Dependency analysis is disabled".into();
        };
        let Some(path) = args.get("filePath").and_then(Value::as_str) else {
            return "Missing filePath argument".into();
        };
        match analyzer.analyze_file_dependency_tree(path).await {
            Ok(tree) => serde_json::to_string_pretty(&tree).unwrap_or_default(),
            Err(e) => format!("Failed to analyze {}: {}", path, e),
        }
    }

    async fn analyze_function_tree(&self, args: &Value) -> String {
        let Some(analyzer) = &self.analyzer else {
            return "Dependency analysis is disabled".into();
        };
        let (Some(path), Some(function)) = (
            args.get("filePath").and_then(Value::as_str),
            args.get("functionName").and_then(Value::as_str),
        ) else {
            return "Missing filePath or functionName argument".into();
        };
        match analyzer.analyze_function_dependency_tree(path, function).await {
            Ok(tree) => serde_json::to_string_pretty(&tree).unwrap_or_default(),
            Err(e) => format!("Failed to analyze {}:{}: {}", path, function, e),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let trimmed = path.trim_start_matches('/');
        if Path::new(trimmed)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return None;
        }
        Some(self.work_dir.join(trimmed))
    }

    fn maybe_compress(&self, path: &str, content: String) -> String {
        if !self.compress_code {
            return content;
        }
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if compression::is_code_extension(ext) {
            compression::compress(&content, ext)
        } else {
            content
        }
    }
}

fn string_array(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toolset(dir: &Path) -> ToolSet {
        ToolSet::new(dir, false, None, Arc::new(DocumentContext::default()))
    }

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "line one\nline two\nline three\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_read_file_and_not_found() {
        let dir = fixture();
        let tools = toolset(dir.path());
        let content = tools.invoke("ReadFile", json!({"filePath": "a.txt"})).await;
        assert!(content.contains("line one"));

        let missing = tools.invoke("ReadFile", json!({"filePath": "nope.txt"})).await;
        assert_eq!(missing, FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_read_file_size_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let exactly = vec![b'x'; MAX_WHOLE_FILE_BYTES as usize];
        std::fs::write(dir.path().join("exact.txt"), &exactly).unwrap();
        let over = vec![b'x'; MAX_WHOLE_FILE_BYTES as usize + 1];
        std::fs::write(dir.path().join("over.txt"), &over).unwrap();

        let tools = toolset(dir.path());
        let ok = tools.invoke("ReadFile", json!({"filePath": "exact.txt"})).await;
        assert!(ok.starts_with('x'));

        let too_large = tools.invoke("ReadFile", json!({"filePath": "over.txt"})).await;
        assert!(too_large.contains("File too large"));
    }

    #[tokio::test]
    async fn test_line_range_semantics() {
        let dir = fixture();
        let tools = toolset(dir.path());

        // whole file when offset and limit are both negative
        let all = tools
            .invoke("File", json!({"items": [{"filePath": "a.txt", "offset": -1, "limit": -1}]}))
            .await;
        assert!(all.contains("1: line one"));
        assert!(all.contains("3: line three"));

        // window [1, 2)
        let window = tools
            .invoke("File", json!({"items": [{"filePath": "a.txt", "offset": 1, "limit": 1}]}))
            .await;
        assert!(window.contains("2: line two"));
        assert!(!window.contains("line three"));

        // offset past the end
        let past = tools
            .invoke("File", json!({"items": [{"filePath": "a.txt", "offset": 99, "limit": 5}]}))
            .await;
        assert!(past.contains("no content"));
    }

    #[tokio::test]
    async fn test_long_lines_truncated_not_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let long = "y".repeat(MAX_LINE_CHARS + 500);
        std::fs::write(dir.path().join("wide.txt"), &long).unwrap();

        let tools = toolset(dir.path());
        let out = tools
            .invoke("File", json!({"items": [{"filePath": "wide.txt", "offset": 0, "limit": 1}]}))
            .await;
        let payload: Value = serde_json::from_str(&out).unwrap();
        let line = payload["wide.txt"].as_str().unwrap();
        // one prefixed line, truncated to the cap
        assert_eq!(line.lines().count(), 1);
        assert!(line.len() <= MAX_LINE_CHARS + 8);
    }

    #[tokio::test]
    async fn test_file_info_batch_with_missing() {
        let dir = fixture();
        let tools = toolset(dir.path());
        let out = tools
            .invoke("FileInfo", json!({"filePaths": ["a.txt", "a.txt", "missing.txt"]}))
            .await;
        let payload: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(payload["a.txt"]["lines"], 3);
        assert_eq!(payload["missing.txt"], FILE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_document_context_records_reads() {
        let dir = fixture();
        let context = Arc::new(DocumentContext::default());
        let tools = ToolSet::new(dir.path(), false, None, context.clone());
        tools.invoke("ReadFile", json!({"filePath": "a.txt"})).await;
        tools.invoke("ReadFile", json!({"filePath": "a.txt"})).await;

        let accessed = context.take();
        assert_eq!(accessed, vec!["a.txt".to_string()]);
        assert!(context.take().is_empty());
    }

    #[tokio::test]
    async fn test_parent_traversal_rejected() {
        let dir = fixture();
        let tools = toolset(dir.path());
        let out = tools
            .invoke("ReadFile", json!({"filePath": "../etc/passwd"}))
            .await;
        assert_eq!(out, FILE_NOT_FOUND);
    }

    #[test]
    fn test_dependency_tools_gated() {
        let dir = fixture();
        let without = toolset(dir.path());
        assert!(!without.specs().iter().any(|s| s.name == "AnalyzeFileDependencyTree"));

        let with = ToolSet::new(
            dir.path(),
            false,
            Some(Arc::new(DependencyAnalyzer::new(dir.path()))),
            Arc::new(DocumentContext::default()),
        );
        assert!(with.specs().iter().any(|s| s.name == "AnalyzeFileDependencyTree"));
    }
}
