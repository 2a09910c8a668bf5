//! Incremental Updater
//!
//! A second periodic loop over repositories that finished a full run.
//! For each completed repository whose document is older than the
//! configured staleness threshold, it pulls new commits, asks the model
//! which catalogue entries the commits touch, applies the returned
//! add/update/delete actions, regenerates only the affected leaves, and
//! refreshes the stored version and commit records.

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::constants::retry::STAGE_ATTEMPTS;
use crate::constants::updater::SWEEP_INTERVAL_SECS;
use crate::constants::worker::FAILURE_BACKOFF_SECS;
use crate::git;
use crate::kernel::{extract, Kernel};
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::{changelog, per_doc, slugify, StageContext};
use crate::prompts::PromptLibrary;
use crate::store::SharedStore;
use crate::types::{
    Document, DocumentCatalogue, Repository, RepositoryStatus, Result, ScribeError,
};

#[derive(Debug, Default, Deserialize)]
struct CatalogueDiff {
    #[serde(default)]
    update: Vec<String>,
    #[serde(default)]
    add: Vec<AddedItem>,
    #[serde(default)]
    delete: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AddedItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    parent_id: Option<String>,
}

pub struct Updater {
    store: SharedStore,
    config: Arc<Config>,
}

impl Updater {
    pub fn new(store: SharedStore, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!("incremental updater starting");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.sweep(&cancel).await {
                error!(error = %e, "updater sweep failed");
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(SWEEP_INTERVAL_SECS)) => {}
            }
        }
        info!("incremental updater stopped");
    }

    async fn sweep(&self, cancel: &CancellationToken) -> Result<()> {
        let cutoff =
            Utc::now() - ChronoDuration::days(self.config.document.update_interval_days as i64);
        let stale = self.store.stale_completed(cutoff)?;
        if stale.is_empty() {
            return Ok(());
        }
        info!(repositories = stale.len(), "stale repositories found");

        for (mut repository, document) in stale {
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.refresh(&mut repository, &document).await {
                error!(repository.id = %repository.id, error = %e, "incremental update failed");
                tokio::time::sleep(Duration::from_secs(FAILURE_BACKOFF_SECS)).await;
                let _ = self.store.update_status(
                    &repository.id,
                    RepositoryStatus::Failed,
                    Some(&e.to_string()),
                );
            }
        }
        Ok(())
    }

    async fn refresh(&self, repository: &mut Repository, document: &Document) -> Result<()> {
        let work_dir = PathBuf::from(repository.work_path.as_deref().ok_or_else(|| {
            ScribeError::Storage(format!("repository {} has no working tree", repository.id))
        })?);

        let pull = git::pull(
            &work_dir,
            repository.version.as_deref(),
            repository.git_user_name.as_deref(),
            repository.git_password.as_deref(),
        )
        .await?;

        if pull.commits.is_empty() {
            info!(repository.id = %repository.id, "no new commits");
            self.store.touch_document(&document.id, RepositoryStatus::Completed)?;
            return Ok(());
        }
        info!(
            repository.id = %repository.id,
            commits = pull.commits.len(),
            "reconciling catalogue with new commits"
        );
        // completed rows legitimately re-enter processing during updates
        self.store
            .update_status(&repository.id, RepositoryStatus::Processing, None)?;

        let summary = self
            .commit_summaries(&work_dir, repository.version.as_deref(), &pull.commits)
            .await;

        let kernel = Kernel::new(&self.config, &work_dir, &self.config.openai.chat_model, true)?;
        let file_kernel =
            Kernel::new(&self.config, &work_dir, &self.config.openai.chat_model, false)?;

        let catalogues = self.store.catalogues(&repository.id)?;
        let diff = self
            .analyze_catalogue_diff(&kernel, repository, &catalogues, &summary)
            .await?;

        self.apply_diff(repository, &catalogues, diff)?;

        // regenerate only the leaves the diff left incomplete, then the
        // commit records
        let mut ctx = StageContext {
            repository,
            document,
            kernel: &kernel,
            file_kernel: &file_kernel,
            store: &self.store,
            config: &self.config,
        };
        per_doc::run(&mut ctx).await?;
        changelog::run(&mut ctx).await?;

        self.store.set_version(&repository.id, &pull.head_version)?;
        repository.version = Some(pull.head_version);
        self.store
            .update_status(&repository.id, RepositoryStatus::Completed, None)?;
        self.store.touch_document(&document.id, RepositoryStatus::Completed)?;
        info!(repository.id = %repository.id, "incremental update complete");
        Ok(())
    }

    /// `<commit>` blocks with per-commit name-status diffs.
    async fn commit_summaries(
        &self,
        work_dir: &PathBuf,
        since: Option<&str>,
        commits: &[git::CommitInfo],
    ) -> String {
        let mut out = String::new();
        let mut previous = since.map(str::to_string);
        for commit in commits {
            out.push_str("<commit>\n");
            out.push_str(&commit.message);
            out.push('\n');
            if let Some(prev) = &previous {
                match git::diff(work_dir, prev, &commit.hash).await {
                    Ok(changes) => {
                        for change in changes {
                            out.push_str(&format!(" - {}: {}\n", change.status, change.path));
                        }
                    }
                    Err(e) => warn!(error = %e, "diff failed, summarizing message only"),
                }
            }
            out.push_str("</commit>\n");
            previous = Some(commit.hash.clone());
        }
        out
    }

    async fn analyze_catalogue_diff(
        &self,
        kernel: &Kernel,
        repository: &Repository,
        catalogues: &[DocumentCatalogue],
        summary: &str,
    ) -> Result<CatalogueDiff> {
        let template = PromptLibrary::get("AnalyzeNewCatalogue").unwrap_or_default();
        let catalogue_json = serde_json::to_string_pretty(
            &catalogues
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "title": c.title,
                        "name": c.name,
                        "description": c.description,
                        "parent_id": c.parent_id,
                    })
                })
                .collect::<Vec<_>>(),
        )?;

        let mut vars = HashMap::new();
        vars.insert("document_catalogue", catalogue_json);
        vars.insert("git_commit", summary.to_string());
        vars.insert(
            "catalogue",
            repository
                .optimized_directory_structure
                .clone()
                .unwrap_or_default(),
        );
        vars.insert("git_repository", repository.web_address());

        retry_exponential("analyze_new_catalogue", STAGE_ATTEMPTS, |_| {
            let vars = vars.clone();
            async move {
                let output = kernel.invoke_prompt(template, &vars).await?;
                let payload = extract::extract(&output, "documentation_structure");
                serde_json::from_str::<CatalogueDiff>(&payload)
                    .map_err(|e| ScribeError::llm(format!("catalogue diff unparseable: {}", e)))
            }
        })
        .await
    }

    /// Soft-delete removed entries, reset updated ones, insert additions.
    fn apply_diff(
        &self,
        repository: &Repository,
        catalogues: &[DocumentCatalogue],
        diff: CatalogueDiff,
    ) -> Result<()> {
        let known: HashSet<&str> = catalogues.iter().map(|c| c.id.as_str()).collect();

        for id in &diff.delete {
            if known.contains(id.as_str()) {
                self.store.soft_delete_catalogue(id)?;
            }
        }
        for id in &diff.update {
            if known.contains(id.as_str()) {
                self.store.set_catalogue_completed(id, false)?;
            }
        }

        let mut seen_urls: HashSet<String> =
            catalogues.iter().map(|c| c.url.clone()).collect();
        let sibling_count = catalogues.len() as i64;
        for (offset, item) in diff.add.into_iter().enumerate() {
            let title = if item.title.is_empty() {
                slugify(&item.name)
            } else {
                item.title
            };
            let base_url = {
                let slug = slugify(&title);
                if slug.is_empty() { "section".to_string() } else { slug }
            };
            let mut url = base_url.clone();
            let mut suffix = 1;
            while !seen_urls.insert(url.clone()) {
                suffix += 1;
                url = format!("{}-{}", base_url, suffix);
            }
            let parent_id = item
                .parent_id
                .filter(|p| known.contains(p.as_str()));

            self.store.insert_catalogue(&DocumentCatalogue {
                id: uuid::Uuid::new_v4().to_string(),
                repository_id: repository.id.clone(),
                parent_id,
                name: if item.name.is_empty() { title.clone() } else { item.name },
                title,
                url,
                description: String::new(),
                prompt: item.prompt,
                order_index: sibling_count + offset as i64,
                is_completed: false,
                is_deleted: false,
                created_at: Utc::now(),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::RepositoryKind;

    fn catalogue_row(id: &str, repo: &str, url: &str, completed: bool) -> DocumentCatalogue {
        DocumentCatalogue {
            id: id.to_string(),
            repository_id: repo.to_string(),
            parent_id: None,
            title: url.to_string(),
            name: url.to_string(),
            url: url.to_string(),
            description: String::new(),
            prompt: String::new(),
            order_index: 0,
            is_completed: completed,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_diff_actions() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let repo = Repository::pending("https://example.test/a/b.git", RepositoryKind::Git, None);
        store.insert_repository(&repo).unwrap();

        let rows = vec![
            catalogue_row("keep", &repo.id, "keep", true),
            catalogue_row("stale", &repo.id, "stale", true),
            catalogue_row("gone", &repo.id, "gone", true),
        ];
        store.replace_catalogues(&repo.id, &rows).unwrap();

        let updater = Updater::new(store.clone(), Arc::new(Config::default()));
        let diff = CatalogueDiff {
            update: vec!["stale".into()],
            delete: vec!["gone".into(), "unknown-id".into()],
            add: vec![AddedItem {
                title: "keep".into(), // collides with an existing slug
                name: "Keep Again".into(),
                prompt: "new area".into(),
                parent_id: Some("keep".into()),
            }],
        };
        updater.apply_diff(&repo, &rows, diff).unwrap();

        let after = store.catalogues(&repo.id).unwrap();
        // soft-deleted entry invisible
        assert!(!after.iter().any(|c| c.id == "gone"));
        // updated entry reset for regeneration
        let stale = after.iter().find(|c| c.id == "stale").unwrap();
        assert!(!stale.is_completed);
        // untouched entry keeps its completion
        assert!(after.iter().find(|c| c.id == "keep").unwrap().is_completed);
        // added entry got a deduplicated slug and starts incomplete
        let added = after.iter().find(|c| c.url == "keep-2").unwrap();
        assert!(!added.is_completed);
        assert_eq!(added.parent_id.as_deref(), Some("keep"));
        assert_eq!(added.prompt, "new area");
    }
}
