//! JavaScript / TypeScript text parser

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{first_existing, is_keyword, normalize, FunctionInfo, LanguageParser};

pub struct JavaScriptParser {
    import_re: Regex,
    require_re: Regex,
    function_re: Regex,
    arrow_re: Regex,
    call_re: Regex,
}

impl JavaScriptParser {
    pub fn new() -> Self {
        Self {
            import_re: Regex::new(r#"import\s+(?:[^'"]+\s+from\s+)?['"]([^'"]+)['"]"#).unwrap(),
            require_re: Regex::new(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#).unwrap(),
            function_re: Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+([A-Za-z_$][\w$]*)\s*\(")
                .unwrap(),
            arrow_re: Regex::new(
                r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s*)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>",
            )
            .unwrap(),
            call_re: Regex::new(r"([A-Za-z_$][\w$]*)\s*\(").unwrap(),
        }
    }
}

impl Default for JavaScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaScriptParser {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["js", "jsx", "ts", "tsx", "mjs", "cjs"]
    }

    fn extract_imports(&self, source: &str) -> Vec<String> {
        let mut imports: Vec<String> = self
            .import_re
            .captures_iter(source)
            .chain(self.require_re.captures_iter(source))
            .map(|c| c[1].to_string())
            .collect();
        imports.dedup();
        imports
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut out = Vec::new();
        for caps in self.function_re.captures_iter(source).chain(self.arrow_re.captures_iter(source)) {
            let whole = caps.get(0).unwrap();
            let name = caps[1].to_string();
            let line = source[..whole.start()].matches('\n').count() + 1;
            out.push(FunctionInfo {
                name,
                body: brace_body(source, whole.end()),
                line,
            });
        }
        out.sort_by_key(|f| f.line);
        out
    }

    fn extract_calls(&self, body: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.call_re
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .filter(|t| !is_keyword(t) && seen.insert(t.clone()))
            .collect()
    }

    fn resolve_import(&self, import: &str, current_file: &Path, root: &Path) -> Option<PathBuf> {
        if !import.starts_with('.') {
            return None; // bare specifiers are external packages
        }
        let base = current_file.parent().unwrap_or(Path::new(""));
        let target = normalize(&base.join(import));
        let mut candidates = vec![target.clone()];
        for ext in ["js", "jsx", "ts", "tsx", "mjs", "cjs"] {
            candidates.push(target.with_extension(ext));
            candidates.push(target.join(format!("index.{}", ext)));
        }
        first_existing(root, &candidates)
    }
}

/// Capture a brace-balanced body starting at the first `{` after `from`.
fn brace_body(source: &str, from: usize) -> String {
    let bytes = source.as_bytes();
    let open = match source[from..].find('{') {
        Some(i) => from + i,
        None => {
            // arrow with expression body: take the rest of the line
            return source[from..]
                .lines()
                .next()
                .unwrap_or_default()
                .to_string();
        }
    };
    let mut depth = 0usize;
    for (i, &b) in bytes[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return source[open..=open + i].to_string();
                }
            }
            _ => {}
        }
    }
    source[open..].to_string()
}
