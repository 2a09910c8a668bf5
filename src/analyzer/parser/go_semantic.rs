//! Go semantic analyzer
//!
//! Builds a whole-project model from all `.go` sources at once: packages
//! are grouped by directory, methods are attached to their receiver
//! types, and file dependencies follow import paths whose suffix names a
//! package directory inside the project.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{FileModel, FunctionInfo, ProjectModel, SemanticAnalyzer, TypeModel};

pub struct GoSemanticAnalyzer {
    import_single_re: Regex,
    import_block_re: Regex,
    import_path_re: Regex,
    func_re: Regex,
    method_re: Regex,
    type_re: Regex,
}

impl GoSemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            import_single_re: Regex::new(r#"(?m)^import\s+(?:\w+\s+)?"([^"]+)""#).unwrap(),
            import_block_re: Regex::new(r"(?s)import\s*\(([^)]*)\)").unwrap(),
            import_path_re: Regex::new(r#""([^"]+)""#).unwrap(),
            func_re: Regex::new(r"(?m)^func\s+(\w+)\s*\(").unwrap(),
            method_re: Regex::new(r"(?m)^func\s+\(\s*\w+\s+\*?(\w+)\s*\)\s+(\w+)\s*\(").unwrap(),
            type_re: Regex::new(r"(?m)^type\s+(\w+)\s+(?:struct|interface)\b").unwrap(),
        }
    }

    fn imports_of(&self, source: &str) -> Vec<String> {
        let mut imports: Vec<String> = self
            .import_single_re
            .captures_iter(source)
            .map(|c| c[1].to_string())
            .collect();
        for block in self.import_block_re.captures_iter(source) {
            for path in self.import_path_re.captures_iter(&block[1]) {
                imports.push(path[1].to_string());
            }
        }
        imports
    }
}

impl Default for GoSemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer for GoSemanticAnalyzer {
    fn name(&self) -> &'static str {
        "go-semantic"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["go"]
    }

    fn analyze_project(&self, sources: &[(String, String)]) -> ProjectModel {
        let mut model = ProjectModel::default();

        // package dir -> files in that package
        let mut packages: HashMap<String, Vec<String>> = HashMap::new();
        for (path, _) in sources {
            let dir = Path::new(path)
                .parent()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .unwrap_or_default();
            packages.entry(dir).or_default().push(path.clone());
        }

        for (path, source) in sources {
            let mut file = FileModel::default();

            // methods grouped under their receiver type
            let mut methods: HashMap<String, Vec<FunctionInfo>> = HashMap::new();
            for caps in self.method_re.captures_iter(source) {
                let whole = caps.get(0).unwrap();
                let line = source[..whole.start()].matches('\n').count() + 1;
                methods.entry(caps[1].to_string()).or_default().push(FunctionInfo {
                    name: caps[2].to_string(),
                    body: body_after(source, whole.end()),
                    line,
                });
            }
            for caps in self.type_re.captures_iter(source) {
                let name = caps[1].to_string();
                file.types.push(TypeModel {
                    methods: methods.remove(&name).unwrap_or_default(),
                    name,
                });
            }
            // methods whose type lives in another file of the package
            for (name, funcs) in methods {
                file.types.push(TypeModel { name, methods: funcs });
            }

            for caps in self.func_re.captures_iter(source) {
                let whole = caps.get(0).unwrap();
                let line = source[..whole.start()].matches('\n').count() + 1;
                file.functions.push(FunctionInfo {
                    name: caps[1].to_string(),
                    body: body_after(source, whole.end()),
                    line,
                });
            }

            // dependencies: imported project packages expand to their files
            let mut deps: HashSet<String> = HashSet::new();
            for import in self.imports_of(source) {
                let segments: Vec<&str> = import.split('/').collect();
                for start in 0..segments.len() {
                    let suffix = segments[start..].join("/");
                    if let Some(files) = packages.get(&suffix) {
                        for dep in files {
                            if dep != path {
                                deps.insert(dep.clone());
                            }
                        }
                        break;
                    }
                }
            }

            model.files.insert(path.clone(), file);
            model.dependencies.insert(path.clone(), deps);
        }

        model
    }
}

fn body_after(source: &str, from: usize) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<(String, String)> {
        vec![
            (
                "main.go".to_string(),
                r#"
package main

import "example.test/widget/store"

func main() {
    s := store.Open()
    _ = s
}
"#
                .to_string(),
            ),
            (
                "store/store.go".to_string(),
                r#"
package store

type Store struct{}

func (s *Store) Get(key string) string {
    return key
}

func Open() *Store {
    return &Store{}
}
"#
                .to_string(),
            ),
        ]
    }

    #[test]
    fn test_project_model_dependencies() {
        let analyzer = GoSemanticAnalyzer::new();
        let model = analyzer.analyze_project(&sources());

        let deps = &model.dependencies["main.go"];
        assert!(deps.contains("store/store.go"));
        assert!(model.dependencies["store/store.go"].is_empty());
    }

    #[test]
    fn test_methods_grouped_under_types() {
        let analyzer = GoSemanticAnalyzer::new();
        let model = analyzer.analyze_project(&sources());

        let store = &model.files["store/store.go"];
        let store_type = store.types.iter().find(|t| t.name == "Store").unwrap();
        assert_eq!(store_type.methods.len(), 1);
        assert_eq!(store_type.methods[0].name, "Get");
        assert!(store.functions.iter().any(|f| f.name == "Open"));
    }
}
