//! Stage 7: Per-Document Content
//!
//! One streamed generation per incomplete catalogue leaf. The upsert is
//! idempotent per node and `is_completed` flips only after the item is
//! committed, so an interrupted run re-enters exactly where it stopped.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::prompts::PromptLibrary;
use crate::types::{DocumentCatalogue, DocumentFileItem, Result};

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    let nodes = ctx.store.catalogues(&ctx.repository.id)?;
    let leaves = leaves_of(&nodes);

    let pending: Vec<&DocumentCatalogue> = leaves.iter().filter(|n| !n.is_completed).copied().collect();
    info!(
        leaves = leaves.len(),
        pending = pending.len(),
        "generating per-document content"
    );

    for node in pending {
        generate_leaf(ctx, node).await?;
    }
    Ok(())
}

/// Generate and persist one leaf document.
pub async fn generate_leaf(ctx: &StageContext<'_>, node: &DocumentCatalogue) -> Result<()> {
    debug!(node = %node.title, "generating document");
    let template = PromptLibrary::get("GenerateDocs").unwrap_or_default();
    let mut vars = HashMap::new();
    vars.insert("prompt", node.prompt.clone());
    vars.insert("title", node.name.clone());
    vars.insert("git_repository", ctx.repository.web_address());
    vars.insert("branch", ctx.branch());
    vars.insert("catalogue", ctx.manifest());

    let kernel = ctx.kernel;
    // drain accesses left over from earlier invocations so this node's
    // source list only reflects its own generation
    let _ = kernel.take_accessed_files();
    // the stream buffer is rebuilt on every attempt; partial attempts are
    // never concatenated
    let buffer = retry_exponential("per_doc", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move {
            let mut buffer = String::new();
            let mut sink = |chunk: &str| buffer.push_str(chunk);
            kernel
                .invoke_template_streaming(template, &vars, &mut sink)
                .await
        }
    })
    .await?;

    let content = extract::extract(&buffer, "blog");
    let sources = ctx.kernel.take_accessed_files();

    ctx.store.upsert_file_item(&DocumentFileItem {
        id: uuid::Uuid::new_v4().to_string(),
        catalogue_id: node.id.clone(),
        title: node.name.clone(),
        content,
        sources,
        created_at: Utc::now(),
    })?;
    // completion flips only after the item row is committed
    ctx.store.set_catalogue_completed(&node.id, true)?;
    Ok(())
}

/// Catalogue nodes with no non-deleted children.
pub fn leaves_of(nodes: &[DocumentCatalogue]) -> Vec<&DocumentCatalogue> {
    let parents: HashSet<&str> = nodes
        .iter()
        .filter_map(|n| n.parent_id.as_deref())
        .collect();
    nodes.iter().filter(|n| !parents.contains(n.id.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent: Option<&str>, completed: bool) -> DocumentCatalogue {
        DocumentCatalogue {
            id: id.to_string(),
            repository_id: "repo".into(),
            parent_id: parent.map(str::to_string),
            title: id.to_string(),
            name: id.to_string(),
            url: id.to_string(),
            description: String::new(),
            prompt: String::new(),
            order_index: 0,
            is_completed: completed,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_leaves_exclude_folders() {
        let nodes = vec![
            node("root", None, false),
            node("child-a", Some("root"), false),
            node("child-b", Some("root"), true),
        ];
        let leaves = leaves_of(&nodes);
        let ids: Vec<&str> = leaves.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["child-a", "child-b"]);
    }
}
