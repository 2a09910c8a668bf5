//! Java text parser

use regex::Regex;
use std::path::{Path, PathBuf};

use super::{first_existing, is_keyword, FunctionInfo, LanguageParser};

pub struct JavaParser {
    import_re: Regex,
    method_re: Regex,
    call_re: Regex,
}

impl JavaParser {
    pub fn new() -> Self {
        Self {
            import_re: Regex::new(r"(?m)^import\s+(?:static\s+)?([\w.]+)\s*;").unwrap(),
            method_re: Regex::new(
                r"(?m)^\s*(?:public|private|protected)\s+(?:static\s+)?(?:final\s+)?[\w<>\[\],\s]+?\s+(\w+)\s*\([^)]*\)\s*(?:throws\s+[\w.,\s]+)?\{",
            )
            .unwrap(),
            call_re: Regex::new(r"([A-Za-z_]\w*)\s*\(").unwrap(),
        }
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaParser {
    fn name(&self) -> &'static str {
        "java"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["java"]
    }

    fn extract_imports(&self, source: &str) -> Vec<String> {
        self.import_re
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect()
    }

    fn extract_functions(&self, source: &str) -> Vec<FunctionInfo> {
        let mut out = Vec::new();
        for caps in self.method_re.captures_iter(source) {
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

    fn resolve_import(&self, import: &str, _current_file: &Path, root: &Path) -> Option<PathBuf> {
        let as_path = import.replace('.', "/");
        let candidates = vec![
            PathBuf::from(format!("{}.java", as_path)),
            PathBuf::from(format!("src/main/java/{}.java", as_path)),
            PathBuf::from(format!("src/{}.java", as_path)),
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
import com.acme.widget.Formatter;

public class Report {
    public String render(String page) {
        String data = load(page);
        return Formatter.format(data);
    }

    private String load(String page) {
        return page;
    }
}
"#;

    #[test]
    fn test_imports_and_methods() {
        let parser = JavaParser::new();
        assert_eq!(
            parser.extract_imports(SAMPLE),
            vec!["com.acme.widget.Formatter".to_string()]
        );

        let methods = parser.extract_functions(SAMPLE);
        let names: Vec<&str> = methods.iter().map(|m| m.name.as_str()).collect();
        assert!(names.contains(&"render"));
        assert!(names.contains(&"load"));

        let render = methods.iter().find(|m| m.name == "render").unwrap();
        let calls = parser.extract_calls(&render.body);
        assert!(calls.contains(&"load".to_string()));
    }

    #[test]
    fn test_resolve_package_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/main/java/com/acme")).unwrap();
        std::fs::write(dir.path().join("src/main/java/com/acme/Widget.java"), "").unwrap();

        let parser = JavaParser::new();
        let resolved = parser.resolve_import("com.acme.Widget", Path::new("Main.java"), dir.path());
        assert_eq!(
            resolved,
            Some(PathBuf::from("src/main/java/com/acme/Widget.java"))
        );
    }
}
