//! Domain Entities
//!
//! Row types for the repository queue and its documentation artifacts.
//! Identifiers are opaque UUID strings; ownership follows the schema:
//! Repository owns Document, MiniMap, CommitRecords, and the catalogue
//! forest; leaf catalogue nodes own their DocumentFileItem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for RepositoryStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown repository status: {}", other)),
        }
    }
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    Git,
    File,
    /// A row whose stored type the worker does not recognize. Never
    /// written by this process; processing it marks the row failed.
    Unsupported,
}

impl RepositoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::File => "file",
            Self::Unsupported => "unsupported",
        }
    }
}

impl FromStr for RepositoryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "git" => Ok(Self::Git),
            "file" => Ok(Self::File),
            other => Err(format!("unknown repository type: {}", other)),
        }
    }
}

/// A queued repository work item.
///
/// Credentials are opaque strings owned by the submitting API; the worker
/// only threads them into the git transport. The password never appears
/// in Debug output.
#[derive(Clone)]
pub struct Repository {
    pub id: String,
    pub address: String,
    pub kind: RepositoryKind,
    pub branch: Option<String>,
    pub git_user_name: Option<String>,
    pub git_password: Option<String>,
    /// Local working tree, set after clone (or the address for file repos)
    pub work_path: Option<String>,
    pub status: RepositoryStatus,
    pub error: Option<String>,
    pub organization: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Head commit hash after clone/pull
    pub version: Option<String>,
    pub optimized_directory_structure: Option<String>,
    pub classify: Option<Classification>,
    pub readme: Option<String>,
    /// Worker id holding the lease, if any
    pub owner: Option<String>,
    pub lease_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("branch", &self.branch)
            .field("git_user_name", &self.git_user_name)
            .field("git_password", &self.git_password.as_ref().map(|_| "[REDACTED]"))
            .field("work_path", &self.work_path)
            .field("status", &self.status)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("classify", &self.classify)
            .field("owner", &self.owner)
            .finish()
    }
}

impl Repository {
    /// A fresh pending row for the queue.
    pub fn pending(address: impl Into<String>, kind: RepositoryKind, branch: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            address: address.into(),
            kind,
            branch,
            git_user_name: None,
            git_password: None,
            work_path: None,
            status: RepositoryStatus::Pending,
            error: None,
            organization: None,
            name: None,
            description: None,
            version: None,
            optimized_directory_structure: None,
            classify: None,
            readme: None,
            owner: None,
            lease_deadline: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Remote address with any trailing `.git` removed, for display links.
    pub fn web_address(&self) -> String {
        self.address.trim_end_matches(".git").to_string()
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Canonical repository classification tags.
///
/// The tag steers which documentation outline prompt variant is used.
/// Parsing is case-insensitive; an unrecognized token stays unset and the
/// pipeline continues with the base prompt variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Applications,
    Frameworks,
    Libraries,
    DevelopmentTools,
    CliTools,
    DevOpsConfiguration,
    Documentation,
}

impl Classification {
    pub const ALL: [Classification; 7] = [
        Self::Applications,
        Self::Frameworks,
        Self::Libraries,
        Self::DevelopmentTools,
        Self::CliTools,
        Self::DevOpsConfiguration,
        Self::Documentation,
    ];

    /// Canonical name as it appears in prompt variants and the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applications => "Applications",
            Self::Frameworks => "Frameworks",
            Self::Libraries => "Libraries",
            Self::DevelopmentTools => "DevelopmentTools",
            Self::CliTools => "CLITools",
            Self::DevOpsConfiguration => "DevOpsConfiguration",
            Self::Documentation => "Documentation",
        }
    }

    /// Case-insensitive parse; returns None for unrecognized tokens.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().to_lowercase() == token)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub repository_id: String,
    pub git_path: String,
    pub status: RepositoryStatus,
    pub last_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Catalogue
// =============================================================================

/// A node in the repository's documentation catalogue forest.
///
/// A node with children is a folder; a node without children is a leaf
/// and owns one generated DocumentFileItem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentCatalogue {
    pub id: String,
    pub repository_id: String,
    pub parent_id: Option<String>,
    /// Stable identifier slug
    pub title: String,
    /// Display name
    pub name: String,
    /// Unique url slug within the repository
    pub url: String,
    pub description: String,
    /// Per-node generation hint fed to the content prompt
    pub prompt: String,
    pub order_index: i64,
    pub is_completed: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DocumentFileItem {
    pub id: String,
    pub catalogue_id: String,
    pub title: String,
    /// Generated markdown, wrapper already stripped
    pub content: String,
    /// Source paths the model touched while writing this item
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DocumentOverview {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// MiniMap
// =============================================================================

/// One node of the serialized knowledge-graph mind map.
///
/// `url` holds the bare repository-relative path as generated; it is
/// resolved against the remote web host at read time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiniMapNode {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<MiniMapNode>,
}

impl MiniMapNode {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
            nodes: Vec::new(),
        }
    }

    /// Rewrite relative node paths into web links for known hosts.
    ///
    /// Only github.com and gitee.com remotes get `<remote>/tree/<branch>/`
    /// prefixes; other hosts keep the bare path.
    pub fn resolve_urls(&mut self, remote: &str, branch: &str) {
        let remote = remote.trim_end_matches(".git").trim_end_matches('/');
        let linkable = remote.contains("github.com") || remote.contains("gitee.com");
        if let Some(url) = &self.url {
            if linkable && !url.is_empty() && !url.starts_with("http") {
                let path = url.trim_start_matches('/');
                self.url = Some(format!("{}/tree/{}/{}", remote, branch, path));
            }
        }
        for child in &mut self.nodes {
            child.resolve_urls(remote, branch);
        }
    }
}

// =============================================================================
// Commit Records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub id: String,
    pub repository_id: String,
    pub title: String,
    pub description: String,
    pub commit_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_parse_case_insensitive() {
        for token in ["Applications", "applications", "APPLICATIONS"] {
            assert_eq!(Classification::parse(token), Some(Classification::Applications));
        }
        assert_eq!(Classification::parse("clitools"), Some(Classification::CliTools));
        assert_eq!(Classification::parse("CLITools"), Some(Classification::CliTools));
        assert_eq!(Classification::parse("spaceships"), None);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RepositoryStatus::Pending,
            RepositoryStatus::Processing,
            RepositoryStatus::Completed,
            RepositoryStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RepositoryStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_mini_map_url_resolution() {
        let mut root = MiniMapNode::new("Core");
        root.url = Some("src/main.rs".to_string());
        root.nodes.push(MiniMapNode {
            title: "Config".into(),
            url: Some("src/config.rs".into()),
            nodes: vec![],
        });

        root.resolve_urls("https://github.com/acme/widget.git", "main");
        assert_eq!(
            root.url.as_deref(),
            Some("https://github.com/acme/widget/tree/main/src/main.rs")
        );
        assert_eq!(
            root.nodes[0].url.as_deref(),
            Some("https://github.com/acme/widget/tree/main/src/config.rs")
        );
    }

    #[test]
    fn test_mini_map_unknown_host_untouched() {
        let mut node = MiniMapNode {
            title: "Core".into(),
            url: Some("src/main.rs".into()),
            nodes: vec![],
        };
        node.resolve_urls("https://git.example.test/acme/widget", "main");
        assert_eq!(node.url.as_deref(), Some("src/main.rs"));
    }

    #[test]
    fn test_repository_debug_redacts_password() {
        let mut repo = Repository::pending("https://example.test/a/b.git", RepositoryKind::Git, None);
        repo.git_password = Some("hunter2".into());
        let rendered = format!("{:?}", repo);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn test_web_address_strips_git_suffix() {
        let repo = Repository::pending("https://example.test/a/b.git", RepositoryKind::Git, None);
        assert_eq!(repo.web_address(), "https://example.test/a/b");
    }
}
