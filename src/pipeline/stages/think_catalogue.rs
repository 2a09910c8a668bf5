//! Stage 6: Documentation Catalogue
//!
//! Selects the classification-specific outline prompt, parses the
//! returned JSON into the catalogue forest, and replaces the stored
//! forest wholesale. New nodes start incomplete; nodes matching an
//! existing url keep their id and completion, so stage 7 only fills
//! what is actually missing after a re-entry.

use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::{slugify, StageContext};
use crate::prompts::PromptLibrary;
use crate::types::{DocumentCatalogue, Result, ScribeError};

#[derive(Debug, Deserialize)]
struct CatalogueDocument {
    #[serde(default)]
    items: Vec<CatalogueItem>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogueItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub children: Vec<CatalogueItem>,
}

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    let template = PromptLibrary::select("AnalyzeCatalogue", ctx.repository.classify);
    let mut vars = HashMap::new();
    vars.insert("code_files", ctx.manifest());
    vars.insert("git_repository", ctx.repository.web_address());
    vars.insert("repository_name", ctx.repository_name());

    let kernel = ctx.kernel;
    let items = retry_exponential("think_catalogue", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move {
            let output = kernel.invoke_prompt(template, &vars).await?;
            let payload = extract::extract(&output, "documentation_structure");
            // a malformed structure is worth another attempt
            let parsed: CatalogueDocument = serde_json::from_str(&payload)
                .map_err(|e| ScribeError::llm(format!("catalogue structure unparseable: {}", e)))?;
            Ok(parsed.items)
        }
    })
    .await?;

    let existing = ctx.store.catalogues(&ctx.repository.id)?;
    let rows = to_forest(&items, &ctx.repository.id, &existing);
    info!(nodes = rows.len(), "catalogue forest generated");
    ctx.store.replace_catalogues(&ctx.repository.id, &rows)?;
    Ok(())
}

/// Flatten the item tree into store rows. Url slugs are deduplicated per
/// repository; order indexes are monotone within each parent. A node
/// whose url matches an existing one keeps that node's id and completion
/// flag, so regenerating the forest never discards per-leaf progress.
pub fn to_forest(
    items: &[CatalogueItem],
    repository_id: &str,
    existing: &[DocumentCatalogue],
) -> Vec<DocumentCatalogue> {
    let carried: HashMap<&str, (&str, bool)> = existing
        .iter()
        .map(|node| (node.url.as_str(), (node.id.as_str(), node.is_completed)))
        .collect();
    let mut rows = Vec::new();
    let mut seen_urls = HashSet::new();
    build(items, repository_id, None, &carried, &mut rows, &mut seen_urls);
    rows
}

fn build(
    items: &[CatalogueItem],
    repository_id: &str,
    parent_id: Option<&str>,
    carried: &HashMap<&str, (&str, bool)>,
    rows: &mut Vec<DocumentCatalogue>,
    seen_urls: &mut HashSet<String>,
) {
    for (index, item) in items.iter().enumerate() {
        let title = if item.title.is_empty() {
            slugify(&item.name)
        } else {
            item.title.clone()
        };
        let name = if item.name.is_empty() {
            title.clone()
        } else {
            item.name.clone()
        };

        let base_url = {
            let slug = slugify(&title);
            if slug.is_empty() { format!("section-{}", index) } else { slug }
        };
        let mut url = base_url.clone();
        let mut suffix = 1;
        while !seen_urls.insert(url.clone()) {
            suffix += 1;
            url = format!("{}-{}", base_url, suffix);
        }

        let prompt = if item.prompt.is_empty() {
            format!("Document the {} area of this repository.", name)
        } else {
            item.prompt.clone()
        };

        let (id, is_completed) = match carried.get(url.as_str()) {
            Some((id, completed)) => (id.to_string(), *completed),
            None => (uuid::Uuid::new_v4().to_string(), false),
        };
        rows.push(DocumentCatalogue {
            id: id.clone(),
            repository_id: repository_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            title,
            name,
            url,
            description: item.description.clone(),
            prompt,
            order_index: index as i64,
            is_completed,
            is_deleted: false,
            created_at: Utc::now(),
        });
        build(&item.children, repository_id, Some(&id), carried, rows, seen_urls);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items_from(json: &str) -> Vec<CatalogueItem> {
        let doc: CatalogueDocument = serde_json::from_str(json).unwrap();
        doc.items
    }

    #[test]
    fn test_forest_conversion() {
        let items = items_from(
            r#"{"items": [
                {"title": "getting-started", "name": "Getting Started", "prompt": "install docs"},
                {"title": "core", "name": "Core", "children": [
                    {"title": "engine", "name": "Engine", "prompt": "engine docs"}
                ]}
            ]}"#,
        );
        let rows = to_forest(&items, "repo-1", &[]);
        assert_eq!(rows.len(), 3);

        let core = rows.iter().find(|r| r.title == "core").unwrap();
        let engine = rows.iter().find(|r| r.title == "engine").unwrap();
        assert_eq!(engine.parent_id.as_deref(), Some(core.id.as_str()));
        assert!(rows.iter().all(|r| !r.is_completed));
        // placeholder prompt filled where missing
        assert!(core.prompt.contains("Core"));
    }

    #[test]
    fn test_url_slugs_unique() {
        let items = items_from(
            r#"{"items": [
                {"title": "api", "name": "API"},
                {"title": "api", "name": "API again"}
            ]}"#,
        );
        let rows = to_forest(&items, "repo-1", &[]);
        assert_eq!(rows[0].url, "api");
        assert_eq!(rows[1].url, "api-2");
    }

    #[test]
    fn test_regeneration_carries_completed_nodes() {
        let items = items_from(
            r#"{"items": [
                {"title": "api", "name": "API"},
                {"title": "internals", "name": "Internals"}
            ]}"#,
        );
        let existing = vec![DocumentCatalogue {
            id: "old-api".into(),
            repository_id: "repo-1".into(),
            parent_id: None,
            title: "api".into(),
            name: "API".into(),
            url: "api".into(),
            description: String::new(),
            prompt: String::new(),
            order_index: 0,
            is_completed: true,
            is_deleted: false,
            created_at: Utc::now(),
        }];

        let rows = to_forest(&items, "repo-1", &existing);
        let api = rows.iter().find(|r| r.url == "api").unwrap();
        assert_eq!(api.id, "old-api");
        assert!(api.is_completed);
        let internals = rows.iter().find(|r| r.url == "internals").unwrap();
        assert!(!internals.is_completed);
    }

    #[test]
    fn test_order_index_monotone_per_parent() {
        let items = items_from(
            r#"{"items": [
                {"title": "a", "name": "A"},
                {"title": "b", "name": "B"},
                {"title": "c", "name": "C"}
            ]}"#,
        );
        let rows = to_forest(&items, "repo-1", &[]);
        let indexes: Vec<i64> = rows.iter().map(|r| r.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
