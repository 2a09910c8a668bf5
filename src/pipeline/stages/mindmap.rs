//! Stage 4: Mind Map
//!
//! Regenerated from scratch on every full run: the prior MiniMap row is
//! deleted and the new serialized tree inserted. Node URLs stay as bare
//! repository paths here; readers resolve them against the remote host.

use std::collections::HashMap;
use tracing::debug;

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::prompts::PromptLibrary;
use crate::types::{MiniMapNode, Result};

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    let template = PromptLibrary::get("GenerateMindMap").unwrap_or_default();
    let mut vars = HashMap::new();
    vars.insert("code_files", ctx.manifest());
    vars.insert("repository_url", ctx.repository.web_address());
    vars.insert("branch_name", ctx.branch());

    let kernel = ctx.kernel;
    let output = retry_exponential("mindmap", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move { kernel.invoke_prompt(template, &vars).await }
    })
    .await?;

    let cleaned = extract::strip_tag(&output, "thinking");
    let map = parse_mind_map(&cleaned, &ctx.repository_name());
    let serialized = serde_json::to_string(&map)?;
    debug!(nodes = map.nodes.len(), "mind map parsed");

    ctx.store.replace_mini_map(&ctx.repository.id, &serialized)?;
    Ok(())
}

/// Parse `#`-heading markdown into a mind map tree. A heading written
/// `Title:path` carries a navigation target; one top-level heading
/// becomes the root, several top-level headings hang off a synthetic
/// root named after the repository.
pub fn parse_mind_map(content: &str, fallback_title: &str) -> MiniMapNode {
    let mut roots: Vec<MiniMapNode> = Vec::new();
    // (level, index-path) stack of open nodes
    let mut stack: Vec<(usize, MiniMapNode)> = Vec::new();

    fn close_into(stack: &mut Vec<(usize, MiniMapNode)>, roots: &mut Vec<MiniMapNode>, level: usize) {
        while stack.last().is_some_and(|(l, _)| *l >= level) {
            let (_, node) = stack.pop().unwrap();
            match stack.last_mut() {
                Some((_, parent)) => parent.nodes.push(node),
                None => roots.push(node),
            }
        }
    }

    for line in content.lines() {
        let trimmed = line.trim();
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if level == 0 || trimmed.len() == level {
            continue;
        }
        let body = trimmed[level..].trim();
        let (title, url) = match body.split_once(':') {
            Some((title, url)) if !url.trim().is_empty() => {
                (title.trim().to_string(), Some(url.trim().to_string()))
            }
            _ => (body.to_string(), None),
        };

        close_into(&mut stack, &mut roots, level);
        stack.push((
            level,
            MiniMapNode {
                title,
                url,
                nodes: Vec::new(),
            },
        ));
    }
    close_into(&mut stack, &mut roots, 0);

    match roots.len() {
        1 => roots.into_iter().next().unwrap(),
        _ => MiniMapNode {
            title: fallback_title.to_string(),
            url: None,
            nodes: roots,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_root() {
        let content = "# Widget\n##Core:src/core.rs\n###Config:src/config.rs\n##Docs\n";
        let map = parse_mind_map(content, "fallback");
        assert_eq!(map.title, "Widget");
        assert_eq!(map.nodes.len(), 2);
        assert_eq!(map.nodes[0].title, "Core");
        assert_eq!(map.nodes[0].url.as_deref(), Some("src/core.rs"));
        assert_eq!(map.nodes[0].nodes[0].title, "Config");
        assert!(map.nodes[1].url.is_none());
    }

    #[test]
    fn test_parse_multiple_roots_get_synthetic_parent() {
        let content = "# One\n# Two\n";
        let map = parse_mind_map(content, "repo");
        assert_eq!(map.title, "repo");
        assert_eq!(map.nodes.len(), 2);
    }

    #[test]
    fn test_non_heading_lines_skipped() {
        let content = "prose\n# Root\nmore prose\n##Child:a/b.rs\n";
        let map = parse_mind_map(content, "x");
        assert_eq!(map.title, "Root");
        assert_eq!(map.nodes.len(), 1);
    }

    #[test]
    fn test_round_trips_through_json() {
        let content = "# Root\n##Child:a/b.rs\n";
        let map = parse_mind_map(content, "x");
        let json = serde_json::to_string(&map).unwrap();
        let back: MiniMapNode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }
}
