//! Python text parser

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{first_existing, is_keyword, FunctionInfo, LanguageParser};

pub struct PythonParser {
    import_re: Regex,
    from_re: Regex,
    def_re: Regex,
    call_re: Regex,
}

impl PythonParser {
    pub fn new() -> Self {
        Self {
            import_re: Regex::new(r"(?m)^\s*import\s+([\w.]+)").unwrap(),
            from_re: Regex::new(r"(?m)^\s*from\s+([\w.]+)\s+import\b").unwrap(),
            def_re: Regex::new(r"(?m)^([ \t]*)(?:async\s+)?def\s+(\w+)\s*\(").unwrap(),
            call_re: Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn name(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["py"]
    }

    fn extract_imports(&self, source: &str) -> Vec<String> {
        let mut imports: Vec<String> = self
            .import_re
            .captures_iter(source)
            .chain(self.from_re.captures_iter(source))
            .map(|c| c[1].to_string())
            .collect();
        imports.dedup();
        imports
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let lines: Vec<&str> = source.lines().collect();
        let mut out = Vec::new();
        for caps in self.def_re.captures_iter(source) {
            let whole = caps.get(0).unwrap();
            let indent = caps[1].len();
            let name = caps[2].to_string();
            let line = source[..whole.start()].matches('\n').count() + 1;
            out.push(FunctionInfo {
                name,
                body: indented_body(&lines, line - 1, indent),
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
        // relative imports resolve against the current package
        let (dots, module) = {
            let stripped = import.trim_start_matches('.');
            (import.len() - stripped.len(), stripped)
        };
        let base: PathBuf = if dots > 0 {
            let mut dir = current_file.parent().unwrap_or(Path::new("")).to_path_buf();
            for _ in 1..dots {
                dir.pop();
            }
            dir
        } else {
            PathBuf::new()
        };

        let module_path = base.join(module.replace('.', "/"));
        let candidates = vec![
            module_path.with_extension("py"),
            module_path.join("__init__.py"),
        ];
        first_existing(root, &candidates)
    }
}

/// Body is the def line plus every following line indented deeper.
fn indented_body(lines: &[&str], def_index: usize, indent: usize) -> String {
    let mut body = vec![lines[def_index]];
    for line in &lines[def_index + 1..] {
        if line.trim().is_empty() {
            body.push(line);
            continue;
        }
        let this_indent = line.len() - line.trim_start().len();
        if this_indent <= indent {
            break;
        }
        body.push(line);
    }
    body.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
import os
from app.util import slugify

def build(page):
    data = load(page)
    return slugify(data)

def load(page):
    return os.path.join("data", page)
"#;

    #[test]
    fn test_imports() {
        let parser = PythonParser::new();
        let imports = parser.extract_imports(SAMPLE);
        assert_eq!(imports, vec!["os".to_string(), "app.util".to_string()]);
    }

    #[test]
    fn test_functions_have_bodies_and_lines() {
        let parser = PythonParser::new();
        let functions = parser.extract_functions(SAMPLE);
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0].name, "build");
        assert!(functions[0].body.contains("load(page)"));
        assert!(!functions[0].body.contains("os.path.join"));
        assert!(functions[0].line > 1);
    }

    #[test]
    fn test_calls() {
        let parser = PythonParser::new();
        let functions = parser.extract_functions(SAMPLE);
        let calls = parser.extract_calls(&functions[0].body);
        assert!(calls.contains(&"load".to_string()));
        assert!(calls.contains(&"slugify".to_string()));
    }

    #[test]
    fn test_resolve_module_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/util.py"), "").unwrap();

        let parser = PythonParser::new();
        let resolved = parser.resolve_import("app.util", Path::new("main.py"), dir.path());
        assert_eq!(resolved, Some(PathBuf::from("app/util.py")));
        assert_eq!(parser.resolve_import("os", Path::new("main.py"), dir.path()), None);
    }

    #[test]
    fn test_resolve_relative_import() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app")).unwrap();
        std::fs::write(dir.path().join("app/util.py"), "").unwrap();

        let parser = PythonParser::new();
        let resolved = parser.resolve_import(".util", Path::new("app/views.py"), dir.path());
        assert_eq!(resolved, Some(PathBuf::from("app/util.py")));
    }
}
