//! Gitignore Rule Engine
//!
//! Parses a repository's `.gitignore` into an ordered rule list and answers
//! ignore queries with last-match-wins semantics. Wildcards translate to
//! anchored regular expressions:
//!
//! - `*`   matches any run of non-separator characters
//! - `**/` matches any (possibly empty) directory prefix
//! - `?`   matches exactly one non-separator character
//! - bracket classes pass through unchanged
//! - every other regex metacharacter is escaped
//!
//! A parse failure on the file degrades to an empty ruleset rather than
//! failing the scan.

use regex::Regex;
use std::path::Path;
use tracing::debug;

/// A single parsed ignore rule.
#[derive(Debug)]
pub struct IgnoreRule {
    /// `!`-prefixed rules re-include previously ignored paths
    pub negated: bool,
    /// Trailing-`/` rules match directories (and everything under them)
    pub dir_only: bool,
    /// Leading-`/` rules match from the repository root only
    pub anchored: bool,
    pattern: Regex,
    raw: String,
}

impl IgnoreRule {
    /// Parse one `.gitignore` line. Returns None for blanks, comments,
    /// and patterns that fail to compile.
    pub fn parse(line: &str) -> Option<Self> {
        let mut text = line.trim_end();
        if text.trim().is_empty() || text.trim_start().starts_with('#') {
            return None;
        }
        let raw = text.to_string();

        let mut negated = false;
        if let Some(rest) = text.strip_prefix('!') {
            negated = true;
            text = rest;
        }

        let mut dir_only = false;
        if let Some(rest) = text.strip_suffix('/') {
            dir_only = true;
            text = rest;
        }

        let mut anchored = false;
        if let Some(rest) = text.strip_prefix('/') {
            anchored = true;
            text = rest;
        }

        let body = translate(text);
        let source = if anchored {
            format!("^{}$", body)
        } else {
            // unanchored patterns may match at any directory level
            format!("^(?:.*/)?{}$", body)
        };

        match Regex::new(&source) {
            Ok(pattern) => Some(Self {
                negated,
                dir_only,
                anchored,
                pattern,
                raw,
            }),
            Err(e) => {
                debug!("dropping unparseable ignore pattern {:?}: {}", raw, e);
                None
            }
        }
    }

    /// Does this rule match the given relative path?
    ///
    /// Directory rules match the path's ancestor directories in addition
    /// to the path itself; plain rules also ignore whole directories, so
    /// they check ancestors too.
    pub fn matches(&self, path: &str, is_dir: bool) -> bool {
        if self.dir_only {
            if is_dir && self.pattern.is_match(path) {
                return true;
            }
        } else if self.pattern.is_match(path) {
            return true;
        }
        ancestors(path).any(|dir| self.pattern.is_match(dir))
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Translate a gitignore glob body into regex source.
fn translate(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2);
    let bytes = glob.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    if bytes.get(i + 2) == Some(&b'/') {
                        out.push_str("(?:.*/)?");
                        i += 3;
                    } else {
                        out.push_str(".*");
                        i += 2;
                    }
                } else {
                    out.push_str("[^/]*");
                    i += 1;
                }
            }
            b'?' => {
                out.push_str("[^/]");
                i += 1;
            }
            b'[' => {
                // bracket classes pass through to the regex engine
                let close = glob[i + 1..].find(']').map(|j| i + 1 + j);
                match close {
                    Some(end) => {
                        out.push_str(&glob[i..=end]);
                        i = end + 1;
                    }
                    None => {
                        out.push_str("\\[");
                        i += 1;
                    }
                }
            }
            _ => {
                let ch = glob[i..].chars().next().unwrap();
                if "\\.+()|^$".contains(ch) || "{}".contains(ch) {
                    out.push('\\');
                }
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    out
}

fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/').map(move |(idx, _)| &path[..idx])
}

/// The composite ruleset for one working tree.
#[derive(Debug, Default)]
pub struct IgnoreList {
    rules: Vec<IgnoreRule>,
}

impl IgnoreList {
    /// Load `.gitignore` from the root, if present. Read errors degrade
    /// to "no ignore".
    pub fn load(root: &Path) -> Self {
        match std::fs::read_to_string(root.join(".gitignore")) {
            Ok(text) => Self::parse(&text),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(text: &str) -> Self {
        Self {
            rules: text.lines().filter_map(IgnoreRule::parse).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// A path is ignored when the last matching rule is non-negated.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.matches(path, is_dir) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}
