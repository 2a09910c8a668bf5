//! Working-Tree Scanner and Compactor
//!
//! Produces a deterministic representation of a working tree: paths are
//! emitted lexically per directory, depth-first, honoring the composite
//! gitignore ruleset plus a built-in skip list for VCS and scratch
//! directories.

use serde::Serialize;
use std::path::Path;

use crate::config::CatalogueFormat;
use crate::scanner::gitignore::IgnoreList;
use crate::types::{Result, ScribeError};

/// Directories never worth scanning regardless of gitignore.
const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    ".svn",
    ".hg",
    ".idea",
    ".vscode",
    "node_modules",
    "__pycache__",
    ".venv",
];

/// One scanned entry, relative to the root with forward slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub path: String,
    pub is_dir: bool,
}

/// Walk the working tree. Fails with `InvalidRoot` when the root is not
/// a directory; unreadable subdirectories are skipped.
pub fn scan(root: &Path) -> Result<Vec<PathInfo>> {
    if !root.is_dir() {
        return Err(ScribeError::InvalidRoot(root.to_path_buf()));
    }
    let ignore = IgnoreList::load(root);
    let mut out = Vec::new();
    walk(root, root, &ignore, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, ignore: &IgnoreList, out: &mut Vec<PathInfo>) -> Result<()> {
    let mut entries: Vec<_> = match std::fs::read_dir(dir) {
        Ok(iter) => iter.filter_map(|e| e.ok()).collect(),
        Err(_) => return Ok(()),
    };
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let rel = relative(root, &path);
        let is_dir = path.is_dir();

        if is_dir {
            if DEFAULT_SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            if ignore.is_ignored(&rel, true) {
                continue;
            }
            out.push(PathInfo {
                path: rel,
                is_dir: true,
            });
            walk(root, &path, ignore, out)?;
        } else {
            if ignore.is_ignored(&rel, false) {
                continue;
            }
            out.push(PathInfo {
                path: rel,
                is_dir: false,
            });
        }
    }
    Ok(())
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Number of files (not directories) in a scan result.
pub fn file_count(paths: &[PathInfo]) -> usize {
    paths.iter().filter(|p| !p.is_dir).count()
}

// =============================================================================
// Tree
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FileTreeNode {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileTreeNode>,
}

impl FileTreeNode {
    fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "directory",
            children: Vec::new(),
        }
    }

    fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: "file",
            children: Vec::new(),
        }
    }

    fn is_dir(&self) -> bool {
        self.kind == "directory"
    }
}

/// Nest scanned paths into a tree. Deterministic: children keep the
/// scan order, which is already lexical per directory.
pub fn build_tree(paths: &[PathInfo], root_name: &str) -> FileTreeNode {
    let mut root = FileTreeNode::dir(root_name);
    for info in paths {
        insert(&mut root, &info.path, info.is_dir);
    }
    root
}

fn insert(root: &mut FileTreeNode, path: &str, is_dir: bool) {
    let mut node = root;
    let segments: Vec<&str> = path.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        let position = node.children.iter().position(|c| c.name == *segment);
        let idx = match position {
            Some(idx) => idx,
            None => {
                let child = if last && !is_dir {
                    FileTreeNode::file(*segment)
                } else {
                    FileTreeNode::dir(*segment)
                };
                node.children.push(child);
                node.children.len() - 1
            }
        };
        node = &mut node.children[idx];
    }
}

// =============================================================================
// Formatters
// =============================================================================

/// One line per path with short kind hints: `/D` directory, `/F` file.
pub fn compact(tree: &FileTreeNode) -> String {
    let mut out = String::new();
    for child in &tree.children {
        compact_node(child, 0, &mut out);
    }
    out
}

fn compact_node(node: &FileTreeNode, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&node.name);
    out.push_str(if node.is_dir() { "/D" } else { "/F" });
    out.push('\n');
    for child in &node.children {
        compact_node(child, depth + 1, out);
    }
}

/// Newline-separated relative file paths.
pub fn to_pathlist(tree: &FileTreeNode) -> String {
    let mut out = Vec::new();
    for child in &tree.children {
        pathlist_node(child, String::new(), &mut out);
    }
    out.join("\n")
}

fn pathlist_node(node: &FileTreeNode, prefix: String, out: &mut Vec<String>) {
    let path = if prefix.is_empty() {
        node.name.clone()
    } else {
        format!("{}/{}", prefix, node.name)
    };
    if node.is_dir() {
        for child in &node.children {
            pathlist_node(child, path.clone(), out);
        }
    } else {
        out.push(path);
    }
}

/// Structured JSON form.
pub fn to_json(tree: &FileTreeNode) -> Result<String> {
    Ok(serde_json::to_string_pretty(tree)?)
}

/// Render a tree in the configured catalogue format.
pub fn render(tree: &FileTreeNode, format: CatalogueFormat) -> Result<String> {
    match format {
        CatalogueFormat::Compact => Ok(compact(tree)),
        CatalogueFormat::Pathlist => Ok(to_pathlist(tree)),
        CatalogueFormat::Json => to_json(tree),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/util")).unwrap();
        fs::write(dir.path().join("README.md"), "# hi").unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("src/util/io.rs"), "pub fn f() {}").unwrap();
        fs::write(dir.path().join("debug.log"), "noise").unwrap();
        fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
        dir
    }

    #[test]
    fn test_scan_is_deterministic_and_filtered() {
        let dir = fixture();
        let first = scan(dir.path()).unwrap();
        let second = scan(dir.path()).unwrap();
        assert_eq!(first, second);

        let paths: Vec<&str> = first.iter().map(|p| p.path.as_str()).collect();
        assert!(paths.contains(&"src/main.rs"));
        assert!(paths.contains(&"src/util/io.rs"));
        assert!(!paths.contains(&"debug.log"));
        // depth-first: src comes before src/main.rs, which comes before src/util
        let src = paths.iter().position(|p| *p == "src").unwrap();
        let main = paths.iter().position(|p| *p == "src/main.rs").unwrap();
        let util = paths.iter().position(|p| *p == "src/util").unwrap();
        assert!(src < main && main < util);
    }

    #[test]
    fn test_scan_missing_root() {
        let err = scan(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, ScribeError::InvalidRoot(_)));
    }

    #[test]
    fn test_compact_format() {
        let dir = fixture();
        let paths = scan(dir.path()).unwrap();
        let tree = build_tree(&paths, "repo");
        let rendered = compact(&tree);
        assert!(rendered.contains("src/D\n"));
        assert!(rendered.contains("  main.rs/F\n"));
        assert!(rendered.contains("  util/D\n"));
        assert!(rendered.contains("    io.rs/F\n"));
    }

    #[test]
    fn test_pathlist_files_only() {
        let dir = fixture();
        let paths = scan(dir.path()).unwrap();
        let tree = build_tree(&paths, "repo");
        let list = to_pathlist(&tree);
        assert!(list.lines().any(|l| l == "src/util/io.rs"));
        assert!(!list.lines().any(|l| l == "src"));
    }

    #[test]
    fn test_json_round_trips_structure() {
        let dir = fixture();
        let paths = scan(dir.path()).unwrap();
        let tree = build_tree(&paths, "repo");
        let json: serde_json::Value = serde_json::from_str(&to_json(&tree).unwrap()).unwrap();
        assert_eq!(json["type"], "directory");
        assert!(json["children"].is_array());
    }

    #[test]
    fn test_compact_is_pure_function_of_root_and_rules() {
        let dir = fixture();
        let a = compact(&build_tree(&scan(dir.path()).unwrap(), "repo"));
        let b = compact(&build_tree(&scan(dir.path()).unwrap(), "repo"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_file_count_excludes_dirs() {
        let dir = fixture();
        let paths = scan(dir.path()).unwrap();
        assert_eq!(file_count(&paths), 4); // .gitignore, README.md, main.rs, io.rs
    }
}
