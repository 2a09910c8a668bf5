//! Stage 8: Change Log
//!
//! Git repositories only: recent history is summarized into reader-facing
//! update entries and the CommitRecord set is replaced wholesale. File
//! repositories skip the stage and keep an empty record set.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::git;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::types::{CommitRecord, RepositoryKind, Result, ScribeError};

/// Commits considered for the update log on a full run.
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct LogEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    date: String,
}

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    if ctx.repository.kind != RepositoryKind::Git {
        debug!("non-git repository, skipping change log");
        return Ok(());
    }
    if !ctx.config.document.enable_warehouse_commit {
        debug!("warehouse commit disabled, skipping change log");
        return Ok(());
    }

    let work_dir = ctx.work_dir()?;
    let commits = git::recent_commits(&work_dir, HISTORY_LIMIT).await?;
    if commits.is_empty() {
        ctx.store.replace_commit_records(&ctx.repository.id, &[])?;
        return Ok(());
    }

    let summary: String = commits
        .iter()
        .map(|c| format!("<commit>\n{} {}\n</commit>\n", c.date.to_rfc3339(), c.message))
        .collect();

    let mut vars = HashMap::new();
    vars.insert("git_commit", summary);
    vars.insert("readme", ctx.readme());
    vars.insert("git_repository", ctx.repository.web_address());
    vars.insert("branch", ctx.branch());

    let kernel = ctx.kernel;
    let entries = retry_exponential("changelog", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move {
            let output = kernel
                .invoke_plugin("CodeAnalysis", "CommitAnalyze", &vars)
                .await?;
            let payload = extract::extract(&output, "response_file");
            let entries: Vec<LogEntry> = serde_json::from_str(&payload)
                .map_err(|e| ScribeError::llm(format!("update log unparseable: {}", e)))?;
            Ok(entries)
        }
    })
    .await?;

    let now = Utc::now();
    let records: Vec<CommitRecord> = entries
        .into_iter()
        .filter(|e| !e.title.is_empty())
        .map(|e| CommitRecord {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: ctx.repository.id.clone(),
            title: e.title,
            description: e.description,
            commit_date: DateTime::parse_from_rfc3339(&e.date)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(now),
            created_at: now,
        })
        .collect();

    info!(entries = records.len(), "update log regenerated");
    ctx.store.replace_commit_records(&ctx.repository.id, &records)?;
    Ok(())
}
