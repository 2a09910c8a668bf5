//! Code Compression
//!
//! Strips blank lines and comment-only lines from recognized code kinds
//! before file contents are returned to the model. Unknown extensions
//! pass through untouched.

/// Extensions the compressor recognizes as code.
const CODE_EXTENSIONS: &[&str] = &[
    "rs", "js", "jsx", "ts", "tsx", "mjs", "cjs", "py", "go", "java", "kt", "c", "h", "cpp",
    "hpp", "cc", "cs", "rb", "php", "swift", "scala", "sh",
];

pub fn is_code_extension(ext: &str) -> bool {
    CODE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

/// Comment prefixes per extension family.
fn comment_prefixes(ext: &str) -> &'static [&'static str] {
    match ext {
        "py" | "sh" | "rb" => &["#"],
        "rs" | "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "go" | "java" | "kt" | "c" | "h"
        | "cpp" | "hpp" | "cc" | "cs" | "swift" | "scala" | "php" => &["//", "/*", "*", "*/"],
        _ => &[],
    }
}

/// Drop blank lines and comment-only lines for recognized code kinds.
pub fn compress(content: &str, ext: &str) -> String {
    let ext = ext.to_lowercase();
    if !is_code_extension(&ext) {
        return content.to_string();
    }
    let prefixes = comment_prefixes(&ext);
    content
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return false;
            }
            !prefixes.iter().any(|p| trimmed.starts_with(p))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_rust() {
        let source = "// header\n\nfn main() {\n    // say hi\n    println!(\"hi\");\n}\n";
        let compressed = compress(source, "rs");
        assert_eq!(compressed, "fn main() {\n    println!(\"hi\");\n}");
    }

    #[test]
    fn test_compress_python() {
        let source = "# module\nimport os\n\n# helper\ndef f():\n    pass\n";
        let compressed = compress(source, "py");
        assert!(!compressed.contains("module"));
        assert!(compressed.contains("import os"));
    }

    #[test]
    fn test_unknown_extension_untouched() {
        let source = "# heading\n\nbody text\n";
        assert_eq!(compress(source, "md"), source);
    }
}
