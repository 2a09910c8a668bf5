//! Wrapper Extraction
//!
//! Pulls structured output out of a named tag or fenced json block in a
//! model response. Extraction order: specific wrapper first, then a
//! fenced json block, then the raw output as a best-effort fallback.
//! Every extraction is a single regex with dot-matches-newline.

use regex::Regex;

/// Contents of `<tag>...</tag>`, if present.
pub fn extract_tag(output: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"(?s)<{tag}>(.*?)</{tag}>", tag = regex::escape(tag));
    Regex::new(&pattern)
        .ok()?
        .captures(output)
        .map(|caps| caps[1].trim().to_string())
}

/// Contents of the first ```json fenced block, if present.
pub fn extract_json_block(output: &str) -> Option<String> {
    Regex::new(r"(?s)```json\s*(.*?)```")
        .ok()?
        .captures(output)
        .map(|caps| caps[1].trim().to_string())
}

/// Tagged wrapper, falling back to a fenced json block, falling back to
/// the raw output. A missing wrapper is not an error.
pub fn extract(output: &str, tag: &str) -> String {
    extract_tag(output, tag)
        .or_else(|| extract_json_block(output))
        .unwrap_or_else(|| output.trim().to_string())
}

/// Remove every `<tag>...</tag>` span from the output.
pub fn strip_tag(output: &str, tag: &str) -> String {
    let pattern = format!(r"(?s)<{tag}>.*?</{tag}>", tag = regex::escape(tag));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(output, "").trim().to_string(),
        Err(_) => output.trim().to_string(),
    }
}

/// The classification token from `<classify>classifyName:<value></classify>`.
pub fn extract_classify(output: &str) -> Option<String> {
    let inner = extract_tag(output, "classify")?;
    let token = inner
        .trim()
        .strip_prefix("classifyName:")
        .unwrap_or(inner.trim())
        .trim()
        .to_string();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
