//! Go text parser
//!
//! Fallback only: the Go semantic analyzer claims `.go` files during the
//! initialize pass, so this parser is reached when semantic analysis is
//! unavailable for a file set.

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{is_keyword, FunctionInfo, LanguageParser};

pub struct GoParser {
    import_single_re: Regex,
    import_block_re: Regex,
    func_re: Regex,
    call_re: Regex,
}

impl GoParser {
    pub fn new() -> Self {
        Self {
            import_single_re: Regex::new(r#"(?m)^import\s+(?:\w+\s+)?"([^"]+)""#).unwrap(),
            import_block_re: Regex::new(r"(?s)import\s*\(([^)]*)\)").unwrap(),
            func_re: Regex::new(r"(?m)^func\s+(?:\([^)]+\)\s+)?(\w+)\s*\(").unwrap(),
            call_re: Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }
}

impl Default for GoParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for GoParser {
    fn name(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn extract_imports(&self, source: &str) -> Vec<String> {
        let mut imports: Vec<String> = self
            .import_single_re
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();
        let path_re = Regex::new(r#""([^"]+)""#).unwrap();
        for block in self.import_block_re.captures_iter(source) {
            for path in path_re.captures_iter(&block[1]) {
                imports.push(path[1].to_string());
            }
        }
        imports.dedup();
        imports
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut out = Vec::new();
        for caps in self.func_re.captures_iter(source) {
            let whole = caps.get(0).unwrap();
            let line = source[..whole.start()].matches('\n').count() + 1;
            out.push(FunctionInfo {
                name: caps[1].to_string(),
                body: brace_body(source, whole.end()),
                line,
            });
        }
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

    fn resolve_import(&self, import: &str, _current_file: &Path, root: &Path) -> Option<PathBuf> {
        // in-project imports resolve when a path suffix names a package dir
        let segments: Vec<&str> = import.split('/').collect();
        for start in 0..segments.len() {
            let rel: PathBuf = segments[start..].iter().collect();
            if root.join(&rel).is_dir() {
                return Some(rel);
            }
        }
        None
    }
}

fn brace_body(source: &str, from: usize) -> String {
    let bytes = source.as_bytes();
    let open = match source[from..].find('{') {
        Some(i) => from + i,
        None => return String::new(),
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
