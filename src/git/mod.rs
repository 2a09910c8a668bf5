//! Git Primitives
//!
//! Clone/pull/diff wrappers over the `git` CLI. Credentials ride in the
//! remote URL for private remotes and are scrubbed from every error
//! message before it can reach logs or the store.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::{Result, ScribeError};

#[derive(Debug, Clone)]
pub struct CloneResult {
    pub local_path: PathBuf,
    pub repository_name: String,
    pub branch_name: String,
    pub organization: String,
    /// Head commit hash
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub hash: String,
    pub message: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PullResult {
    /// Commits newer than `since_version`, oldest first
    pub commits: Vec<CommitInfo>,
    pub head_version: String,
}

#[derive(Debug, Clone)]
pub struct FileChange {
    /// Single-letter git status (A/M/D/R...)
    pub status: String,
    pub path: String,
}

/// Clone a remote into `<base_dir>/<organization>/<name>`, or refresh the
/// checkout when it already exists.
pub async fn clone(
    address: &str,
    user: Option<&str>,
    password: Option<&str>,
    branch: Option<&str>,
    base_dir: &Path,
) -> Result<CloneResult> {
    let (organization, repository_name) = split_remote(address)?;
    let local_path = base_dir.join(&organization).join(&repository_name);

    if local_path.join(".git").is_dir() {
        debug!(path = %local_path.display(), "checkout exists, pulling instead");
        run_git(&["pull", "--ff-only"], Some(&local_path)).await?;
    } else {
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let url = authenticated_url(address, user, password);
        let mut args = vec!["clone".to_string()];
        if let Some(branch) = branch {
            if !branch.is_empty() {
                args.push("--branch".to_string());
                args.push(branch.to_string());
            }
        }
        args.push(url);
        args.push(local_path.to_string_lossy().to_string());
        let args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
        run_git(&args, None).await?;
        info!(repo = %repository_name, "clone complete");
    }

    let branch_name = run_git(&["rev-parse", "--abbrev-ref", "HEAD"], Some(&local_path))
        .await?
        .trim()
        .to_string();
    let version = run_git(&["rev-parse", "HEAD"], Some(&local_path))
        .await?
        .trim()
        .to_string();

    Ok(CloneResult {
        local_path,
        repository_name,
        branch_name,
        organization,
        version,
    })
}

/// Pull the checkout and list commits since a known version, oldest first.
pub async fn pull(
    local_path: &Path,
    since_version: Option<&str>,
    _user: Option<&str>,
    _password: Option<&str>,
) -> Result<PullResult> {
    run_git(&["pull", "--ff-only"], Some(local_path)).await?;
    let head_version = run_git(&["rev-parse", "HEAD"], Some(local_path))
        .await?
        .trim()
        .to_string();

    let range = match since_version {
        Some(since) if !since.is_empty() => format!("{}..HEAD", since),
        _ => "HEAD".to_string(),
    };
    let log = run_git(
        &["log", "--reverse", "--format=%H%x09%s%x09%aI", &range],
        Some(local_path),
    )
    .await?;

    Ok(PullResult {
        commits: parse_log(&log),
        head_version,
    })
}

/// Recent commits from the checkout, newest first.
pub async fn recent_commits(local_path: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
    let count = limit.to_string();
    let log = run_git(
        &["log", "-n", &count, "--format=%H%x09%s%x09%aI"],
        Some(local_path),
    )
    .await?;
    Ok(parse_log(&log))
}

/// Name-status diff between two commits.
pub async fn diff(local_path: &Path, from: &str, to: &str) -> Result<Vec<FileChange>> {
    let output = run_git(&["diff", "--name-status", from, to], Some(local_path)).await?;
    Ok(output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let status = parts.next()?.trim();
            let path = parts.next_back()?.trim();
            if status.is_empty() || path.is_empty() {
                return None;
            }
            Some(FileChange {
                status: status.chars().next().unwrap_or('M').to_string(),
                path: path.to_string(),
            })
        })
        .collect())
}

fn parse_log(log: &str) -> Vec<CommitInfo> {
    log.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let hash = parts.next()?.to_string();
            let message = parts.next()?.to_string();
            let date = parts
                .next()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|t| t.with_timezone(&Utc))?;
            Some(CommitInfo { hash, message, date })
        })
        .collect()
}

async fn run_git(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut command = Command::new("git");
    command.args(args);
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }
    let output = command
        .output()
        .await
        .map_err(|e| ScribeError::Git(format!("failed to spawn git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ScribeError::Git(redact_credentials(&format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        ))));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Embed basic auth into an https remote when a user is configured.
fn authenticated_url(address: &str, user: Option<&str>, password: Option<&str>) -> String {
    match (user, password) {
        (Some(user), Some(password)) if !user.is_empty() => {
            if let Some(rest) = address.strip_prefix("https://") {
                format!("https://{}:{}@{}", user, password, rest)
            } else if let Some(rest) = address.strip_prefix("http://") {
                format!("http://{}:{}@{}", user, password, rest)
            } else {
                address.to_string()
            }
        }
        _ => address.to_string(),
    }
}

/// Strip `user:password@` userinfo out of any URL in a message.
fn redact_credentials(message: &str) -> String {
    let re = Regex::new(r"(https?://)[^/@\s]+@").unwrap();
    re.replace_all(message, "$1").to_string()
}

/// Organization and repository name from a remote address or local path.
fn split_remote(address: &str) -> Result<(String, String)> {
    let trimmed = address.trim_end_matches('/').trim_end_matches(".git");
    let without_scheme = trimmed
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let mut segments: Vec<&str> = without_scheme.split('/').filter(|s| !s.is_empty()).collect();

    let name = segments
        .pop()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ScribeError::Git(format!("cannot parse repository name from {}", address)))?;
    // first segment after the host is the organization for remote URLs
    let organization = if without_scheme.contains('.') && segments.len() >= 2 {
        segments[1].to_string()
    } else {
        segments.last().map(|s| s.to_string()).unwrap_or_default()
    };
    Ok((organization, name.to_string()))
}
