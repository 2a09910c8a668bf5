//! Dependency Tree Types and Visualization Helpers
//!
//! The tree-draw and dot renderers are conveniences for operators; the
//! JSON serialization of the node types is the tool-facing contract.

use serde::Serialize;

/// A function reference carried on a non-cyclic file node.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionRef {
    pub name: String,
    pub line: usize,
}

/// One node of a file dependency tree.
#[derive(Debug, Clone, Serialize)]
pub struct FileDependencyNode {
    /// File name (last path segment)
    pub name: String,
    pub full_path: String,
    pub is_cyclic: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FunctionRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileDependencyNode>,
}

impl FileDependencyNode {
    pub fn new(full_path: impl Into<String>) -> Self {
        let full_path = full_path.into();
        let name = full_path
            .rsplit('/')
            .next()
            .unwrap_or(full_path.as_str())
            .to_string();
        Self {
            name,
            full_path,
            is_cyclic: false,
            functions: Vec::new(),
            children: Vec::new(),
        }
    }
}

/// One node of a function call tree, keyed `file:function`.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDependencyNode {
    /// `file:function` key
    pub name: String,
    pub file: String,
    pub function: String,
    pub line: usize,
    pub is_cyclic: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FunctionDependencyNode>,
}

impl FunctionDependencyNode {
    pub fn new(file: impl Into<String>, function: impl Into<String>, line: usize) -> Self {
        let file = file.into();
        let function = function.into();
        Self {
            name: format!("{}:{}", file, function),
            file,
            function,
            line,
            is_cyclic: false,
            children: Vec::new(),
        }
    }
}

// =============================================================================
// Renderers
// =============================================================================

/// ASCII tree rendering of a file dependency tree.
pub fn draw_file_tree(node: &FileDependencyNode) -> String {
    let mut out = String::new();
    out.push_str(&node.name);
    if node.is_cyclic {
        out.push_str(" (cycle)");
    }
    out.push('\n');
    for (i, child) in node.children.iter().enumerate() {
        draw(child, "", i == node.children.len() - 1, &mut out);
    }
    out
}

fn draw(node: &FileDependencyNode, prefix: &str, is_last: bool, out: &mut String) {
    out.push_str(prefix);
    out.push_str(if is_last { "`-- " } else { "|-- " });
    out.push_str(&node.name);
    if node.is_cyclic {
        out.push_str(" (cycle)");
    }
    out.push('\n');

    let child_prefix = format!("{}{}", prefix, if is_last { "    " } else { "|   " });
    for (i, child) in node.children.iter().enumerate() {
        draw(child, &child_prefix, i == node.children.len() - 1, out);
    }
}

/// Graphviz dot rendering of a file dependency tree.
pub fn file_tree_to_dot(node: &FileDependencyNode) -> String {
    let mut out = String::from("digraph dependencies {\n  rankdir=LR;\n");
    dot_edges(node, &mut out);
    out.push_str("}\n");
    out
}

fn dot_edges(node: &FileDependencyNode, out: &mut String) {
    for child in &node.children {
        out.push_str(&format!(
            "  \"{}\" -> \"{}\"{};\n",
            node.full_path,
            child.full_path,
            if child.is_cyclic { " [style=dashed]" } else { "" }
        ));
        dot_edges(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileDependencyNode {
        let mut root = FileDependencyNode::new("src/main.rs");
        let mut child = FileDependencyNode::new("src/util.rs");
        let mut cyclic = FileDependencyNode::new("src/main.rs");
        cyclic.is_cyclic = true;
        child.children.push(cyclic);
        root.children.push(child);
        root
    }

    #[test]
    fn test_draw_marks_cycles() {
        let rendered = draw_file_tree(&sample());
        assert!(rendered.contains("main.rs"));
        assert!(rendered.contains("(cycle)"));
    }

    #[test]
    fn test_dot_contains_edges() {
        let dot = file_tree_to_dot(&sample());
        assert!(dot.contains("\"src/main.rs\" -> \"src/util.rs\""));
        assert!(dot.contains("style=dashed"));
    }

    #[test]
    fn test_node_name_is_last_segment() {
        let node = FileDependencyNode::new("a/b/c.py");
        assert_eq!(node.name, "c.py");
    }
}
