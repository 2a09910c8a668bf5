//! C / C++ text parser

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{first_existing, is_keyword, normalize, FunctionInfo, LanguageParser};

pub struct CFamilyParser {
    include_re: Regex,
    function_re: Regex,
    call_re: Regex,
}

impl CFamilyParser {
    pub fn new() -> Self {
        Self {
            include_re: Regex::new(r#"(?m)^\s*#\s*include\s+"([^"]+)""#).unwrap(),
            function_re: Regex::new(
                r"(?m)^[A-Za-z_][\w\s\*:<>,&]*?\b(\w+)\s*\([^;{}]*\)\s*(?:const\s*)?\{",
            )
            .unwrap(),
            call_re: Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }
}

impl Default for CFamilyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for CFamilyParser {
    fn name(&self) -> &'static str {
        "c-family"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["c", "h", "cpp", "hpp", "cc", "hh", "cxx"]
    }

    fn extract_imports(&self, source: &str) -> Vec<String> {
        self.include_re
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect()
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut out = Vec::new();
        for caps in self.function_re.captures_iter(source) {
            let whole = caps.get(0).unwrap();
            let name = caps[1].to_string();
            if is_keyword(&name) {
                continue;
            }
            let line = source[..whole.start()].matches('\n').count() + 1;
            out.push(FunctionInfo {
                name,
                body: brace_body(source, whole.end() - 1),
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

    fn resolve_import(&self, import: &str, current_file: &Path, root: &Path) -> Option<PathBuf> {
        let base = current_file.parent().unwrap_or(Path::new(""));
        let candidates = vec![
            normalize(&base.join(import)),
            PathBuf::from(import),
            PathBuf::from("include").join(import),
            PathBuf::from("src").join(import),
        ];
        first_existing(root, &candidates)
    }
}

fn brace_body(source: &str, open: usize) -> String {
    let bytes = source.as_bytes();
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

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
#include "util/buffer.h"
#include <stdio.h>

int checksum(const char *data) {
    int sum = hash(data);
    return sum;
}
"#;

    #[test]
    fn test_quoted_includes_only() {
        let parser = CFamilyParser::new();
        assert_eq!(parser.extract_imports(SAMPLE), vec!["util/buffer.h".to_string()]);
    }

    #[test]
    fn test_functions_and_calls() {
        let parser = CFamilyParser::new();
        let functions = parser.extract_functions(SAMPLE);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].name, "checksum");

        let calls = parser.extract_calls(&functions[0].body);
        assert!(calls.contains(&"hash".to_string()));
    }

    #[test]
    fn test_resolve_relative_include() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/util")).unwrap();
        std::fs::write(dir.path().join("src/util/buffer.h"), "").unwrap();

        let parser = CFamilyParser::new();
        let resolved =
            parser.resolve_import("util/buffer.h", Path::new("src/main.c"), dir.path());
        assert_eq!(resolved, Some(PathBuf::from("src/util/buffer.h")));
    }
}
