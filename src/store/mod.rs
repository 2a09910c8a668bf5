//! Store Layer with Connection Pooling and Atomic Leases
//!
//! SQLite behind an r2d2 pool, WAL mode, short transactions only. The
//! store is the sole coordination point between workers: claiming a
//! repository is a conditional update checked by affected-row count, and
//! status writes from a worker are guarded by its lease ownership.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::{
    CommitRecord, Document, DocumentCatalogue, DocumentFileItem, DocumentOverview, Repository,
    RepositoryStatus, Result, ResultExt, ScribeError,
};

/// Shared store handle for async contexts.
pub type SharedStore = Arc<Store>;

const SCHEMA: &str = include_str!("schema.sql");

pub struct Store {
    pool: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open the store at the given path and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure);
        let pool = Pool::builder()
            .max_size(8)
            .connection_timeout(Duration::from_secs(30))
            .build(manager)
            .map_err(|e| ScribeError::Storage(format!("failed to create connection pool: {}", e)))?;
        let store = Self { pool };
        store.initialize()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(Self::configure);
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| ScribeError::Storage(format!("failed to create in-memory pool: {}", e)))?;
        let store = Self { pool };
        store.initialize()?;
        Ok(store)
    }

    fn configure(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| ScribeError::Storage(format!("failed to acquire connection: {}", e)))
    }

    fn initialize(&self) -> Result<()> {
        self.conn()?
            .execute_batch(SCHEMA)
            .with_context("failed to initialize schema")
    }

    // =========================================================================
    // Repository queue
    // =========================================================================

    pub fn insert_repository(&self, repo: &Repository) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO repository (id, address, kind, branch, git_user_name, git_password,
                work_path, status, error, organization, name, description, version,
                optimized_directory_structure, classify, readme, owner, lease_deadline,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                ?17, ?18, ?19, ?20)",
            params![
                repo.id,
                repo.address,
                repo.kind.as_str(),
                repo.branch,
                repo.git_user_name,
                repo.git_password,
                repo.work_path,
                repo.status.as_str(),
                repo.error,
                repo.organization,
                repo.name,
                repo.description,
                repo.version,
                repo.optimized_directory_structure,
                repo.classify.map(|c| c.as_str()),
                repo.readme,
                repo.owner,
                repo.lease_deadline.map(|t| t.to_rfc3339()),
                repo.created_at.to_rfc3339(),
                repo.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn repository(&self, id: &str) -> Result<Option<Repository>> {
        self.conn()?
            .query_row(
                "SELECT * FROM repository WHERE id = ?1",
                params![id],
                map_repository,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Claim the next pending (or interrupted) repository with an atomic
    /// lease: conditional update on the owner/lease columns followed by a
    /// re-read. Interrupted `processing` rows are served before fresh
    /// `pending` ones.
    pub fn lease_next(&self, worker: &str, lease: Duration) -> Result<Option<Repository>> {
        let conn = self.conn()?;
        let now = Utc::now();
        let deadline = now + chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::hours(24));

        let candidate: Option<String> = conn
            .query_row(
                "SELECT id FROM repository
                 WHERE status IN ('pending', 'processing')
                   AND (owner IS NULL OR owner = ?1 OR lease_deadline < ?2)
                 ORDER BY (status = 'processing') DESC, created_at ASC
                 LIMIT 1",
                params![worker, now.to_rfc3339()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(id) = candidate else {
            return Ok(None);
        };

        let claimed = conn.execute(
            "UPDATE repository
             SET owner = ?1, lease_deadline = ?2, updated_at = ?3
             WHERE id = ?4 AND (owner IS NULL OR owner = ?1 OR lease_deadline < ?3)",
            params![worker, deadline.to_rfc3339(), now.to_rfc3339(), id],
        )?;
        if claimed == 0 {
            // another worker won the race
            return Ok(None);
        }

        conn.query_row(
            "SELECT * FROM repository WHERE id = ?1",
            params![id],
            map_repository,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn release_lease(&self, id: &str, worker: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE repository SET owner = NULL, lease_deadline = NULL, updated_at = ?1
             WHERE id = ?2 AND owner = ?3",
            params![Utc::now().to_rfc3339(), id, worker],
        )?;
        Ok(())
    }

    /// Unguarded status write, used by the incremental updater which
    /// operates on completed rows outside the lease discipline.
    pub fn update_status(
        &self,
        id: &str,
        status: RepositoryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn()?.execute(
            "UPDATE repository SET status = ?1, error = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), error, Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Status transition guarded by lease ownership. Zero affected rows
    /// means the lease was lost; the caller must abandon the row.
    pub fn update_status_guarded(
        &self,
        id: &str,
        worker: &str,
        status: RepositoryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let affected = self.conn()?.execute(
            "UPDATE repository SET status = ?1, error = ?2, updated_at = ?3
             WHERE id = ?4 AND owner = ?5",
            params![status.as_str(), error, Utc::now().to_rfc3339(), id, worker],
        )?;
        if affected == 0 {
            return Err(ScribeError::StorePreconditionFailed(format!(
                "repository {} is no longer leased by {}",
                id, worker
            )));
        }
        Ok(())
    }

    pub fn update_clone_info(
        &self,
        id: &str,
        name: &str,
        branch: &str,
        version: &str,
        organization: &str,
        work_path: &str,
    ) -> Result<()> {
        self.conn()?.execute(
            "UPDATE repository
             SET name = ?1, branch = ?2, version = ?3, organization = ?4, work_path = ?5,
                 updated_at = ?6
             WHERE id = ?7",
            params![
                name,
                branch,
                version,
                organization,
                work_path,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn set_work_path(&self, id: &str, work_path: &str) -> Result<()> {
        self.update_field(id, "work_path", Some(work_path))
    }

    pub fn set_readme(&self, id: &str, readme: &str) -> Result<()> {
        self.update_field(id, "readme", Some(readme))
    }

    pub fn set_manifest(&self, id: &str, manifest: &str) -> Result<()> {
        self.update_field(id, "optimized_directory_structure", Some(manifest))
    }

    pub fn set_classification(&self, id: &str, classify: &str) -> Result<()> {
        self.update_field(id, "classify", Some(classify))
    }

    pub fn set_version(&self, id: &str, version: &str) -> Result<()> {
        self.update_field(id, "version", Some(version))
    }

    fn update_field(&self, id: &str, column: &str, value: Option<&str>) -> Result<()> {
        // column names come from the fixed setter list above
        let sql = format!(
            "UPDATE repository SET {} = ?1, updated_at = ?2 WHERE id = ?3",
            column
        );
        self.conn()?
            .execute(&sql, params![value, Utc::now().to_rfc3339(), id])?;
        Ok(())
    }

    pub fn count_by_status(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM repository GROUP BY status ORDER BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Documents
    // =========================================================================

    pub fn upsert_document(&self, repository_id: &str, git_path: &str) -> Result<Document> {
        if let Some(existing) = self.document_for(repository_id)? {
            if existing.git_path != git_path {
                self.conn()?.execute(
                    "UPDATE document SET git_path = ?1 WHERE id = ?2",
                    params![git_path, existing.id],
                )?;
            }
            return Ok(Document {
                git_path: git_path.to_string(),
                ..existing
            });
        }

        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repository_id.to_string(),
            git_path: git_path.to_string(),
            status: RepositoryStatus::Pending,
            last_update: Utc::now(),
            created_at: Utc::now(),
        };
        self.conn()?.execute(
            "INSERT INTO document (id, repository_id, git_path, status, last_update, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc.id,
                doc.repository_id,
                doc.git_path,
                doc.status.as_str(),
                doc.last_update.to_rfc3339(),
                doc.created_at.to_rfc3339(),
            ],
        )?;
        Ok(doc)
    }

    pub fn document_for(&self, repository_id: &str) -> Result<Option<Document>> {
        self.conn()?
            .query_row(
                "SELECT id, repository_id, git_path, status, last_update, created_at
                 FROM document WHERE repository_id = ?1",
                params![repository_id],
                map_document,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn touch_document(&self, id: &str, status: RepositoryStatus) -> Result<()> {
        self.conn()?.execute(
            "UPDATE document SET status = ?1, last_update = ?2 WHERE id = ?3",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    // =========================================================================
    // Overview / MiniMap (delete-then-insert artifacts)
    // =========================================================================

    pub fn replace_overview(&self, document_id: &str, content: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM document_overview WHERE document_id = ?1",
            params![document_id],
        )?;
        tx.execute(
            "INSERT INTO document_overview (id, document_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                uuid::Uuid::new_v4().to_string(),
                document_id,
                content,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn overview(&self, document_id: &str) -> Result<Option<DocumentOverview>> {
        self.conn()?
            .query_row(
                "SELECT id, document_id, content, created_at FROM document_overview
                 WHERE document_id = ?1",
                params![document_id],
                |row| {
                    Ok(DocumentOverview {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        content: row.get(2)?,
                        created_at: parse_ts(row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn replace_mini_map(&self, repository_id: &str, value: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM mini_map WHERE repository_id = ?1",
            params![repository_id],
        )?;
        tx.execute(
            "INSERT INTO mini_map (id, repository_id, value, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                uuid::Uuid::new_v4().to_string(),
                repository_id,
                value,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn mini_map(&self, repository_id: &str) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT value FROM mini_map WHERE repository_id = ?1",
                params![repository_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    // =========================================================================
    // Catalogue forest
    // =========================================================================

    /// Delete the existing forest for the repository and insert a new one
    /// in a single transaction.
    pub fn replace_catalogues(&self, repository_id: &str, rows: &[DocumentCatalogue]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM document_catalogue WHERE repository_id = ?1",
            params![repository_id],
        )?;
        for row in rows {
            insert_catalogue_row(&tx, row)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_catalogue(&self, row: &DocumentCatalogue) -> Result<()> {
        let conn = self.conn()?;
        insert_catalogue_row(&conn, row)
    }

    /// Non-deleted catalogue rows ordered by parent and order index.
    pub fn catalogues(&self, repository_id: &str) -> Result<Vec<DocumentCatalogue>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, parent_id, title, name, url, description, prompt,
                    order_index, is_completed, is_deleted, created_at
             FROM document_catalogue
             WHERE repository_id = ?1 AND is_deleted = 0
             ORDER BY parent_id NULLS FIRST, order_index",
        )?;
        let rows = stmt
            .query_map(params![repository_id], map_catalogue)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn catalogue(&self, id: &str) -> Result<Option<DocumentCatalogue>> {
        self.conn()?
            .query_row(
                "SELECT id, repository_id, parent_id, title, name, url, description, prompt,
                        order_index, is_completed, is_deleted, created_at
                 FROM document_catalogue WHERE id = ?1",
                params![id],
                map_catalogue,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn set_catalogue_completed(&self, id: &str, completed: bool) -> Result<()> {
        self.conn()?.execute(
            "UPDATE document_catalogue SET is_completed = ?1 WHERE id = ?2",
            params![completed as i64, id],
        )?;
        Ok(())
    }

    pub fn soft_delete_catalogue(&self, id: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE document_catalogue SET is_deleted = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // =========================================================================
    // File items
    // =========================================================================

    /// Idempotent per-leaf upsert keyed by catalogue id.
    pub fn upsert_file_item(&self, item: &DocumentFileItem) -> Result<()> {
        let sources = serde_json::to_string(&item.sources)?;
        self.conn()?.execute(
            "INSERT INTO document_file_item (id, catalogue_id, title, content, sources, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(catalogue_id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                sources = excluded.sources",
            params![
                item.id,
                item.catalogue_id,
                item.title,
                item.content,
                sources,
                item.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn file_item(&self, catalogue_id: &str) -> Result<Option<DocumentFileItem>> {
        self.conn()?
            .query_row(
                "SELECT id, catalogue_id, title, content, sources, created_at
                 FROM document_file_item WHERE catalogue_id = ?1",
                params![catalogue_id],
                |row| {
                    let sources: String = row.get(4)?;
                    Ok(DocumentFileItem {
                        id: row.get(0)?,
                        catalogue_id: row.get(1)?,
                        title: row.get(2)?,
                        content: row.get(3)?,
                        sources: serde_json::from_str(&sources).unwrap_or_default(),
                        created_at: parse_ts(row.get::<_, String>(5)?),
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    // =========================================================================
    // Commit records
    // =========================================================================

    pub fn replace_commit_records(
        &self,
        repository_id: &str,
        records: &[CommitRecord],
    ) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM commit_record WHERE repository_id = ?1",
            params![repository_id],
        )?;
        for record in records {
            tx.execute(
                "INSERT INTO commit_record (id, repository_id, title, description, commit_date,
                    created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id,
                    record.repository_id,
                    record.title,
                    record.description,
                    record.commit_date.to_rfc3339(),
                    record.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn commit_records(&self, repository_id: &str) -> Result<Vec<CommitRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, repository_id, title, description, commit_date, created_at
             FROM commit_record WHERE repository_id = ?1 ORDER BY commit_date",
        )?;
        let rows = stmt
            .query_map(params![repository_id], |row| {
                Ok(CommitRecord {
                    id: row.get(0)?,
                    repository_id: row.get(1)?,
                    title: row.get(2)?,
                    description: row.get(3)?,
                    commit_date: parse_ts(row.get::<_, String>(4)?),
                    created_at: parse_ts(row.get::<_, String>(5)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // =========================================================================
    // Incremental updater queries
    // =========================================================================

    /// Completed repositories whose document has not been refreshed since
    /// the cutoff.
    pub fn stale_completed(&self, cutoff: DateTime<Utc>) -> Result<Vec<(Repository, Document)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.id FROM repository r
             JOIN document d ON d.repository_id = r.id
             WHERE r.status = 'completed' AND d.last_update < ?1
             ORDER BY d.last_update",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff.to_rfc3339()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let (Some(repo), Some(doc)) = (self.repository(&id)?, self.document_for(&id)?) {
                out.push((repo, doc));
            }
        }
        Ok(out)
    }
}

fn insert_catalogue_row(conn: &Connection, row: &DocumentCatalogue) -> Result<()> {
    conn.execute(
        "INSERT INTO document_catalogue (id, repository_id, parent_id, title, name, url,
            description, prompt, order_index, is_completed, is_deleted, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            row.id,
            row.repository_id,
            row.parent_id,
            row.title,
            row.name,
            row.url,
            row.description,
            row.prompt,
            row.order_index,
            row.is_completed as i64,
            row.is_deleted as i64,
            row.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn map_repository(row: &Row<'_>) -> rusqlite::Result<Repository> {
    let status: String = row.get("status")?;
    let kind: String = row.get("kind")?;
    let classify: Option<String> = row.get("classify")?;
    Ok(Repository {
        id: row.get("id")?,
        address: row.get("address")?,
        kind: kind
            .parse()
            .unwrap_or(crate::types::RepositoryKind::Unsupported),
        branch: row.get("branch")?,
        git_user_name: row.get("git_user_name")?,
        git_password: row.get("git_password")?,
        work_path: row.get("work_path")?,
        status: status.parse().unwrap_or(RepositoryStatus::Pending),
        error: row.get("error")?,
        organization: row.get("organization")?,
        name: row.get("name")?,
        description: row.get("description")?,
        version: row.get("version")?,
        optimized_directory_structure: row.get("optimized_directory_structure")?,
        classify: classify.as_deref().and_then(crate::types::Classification::parse),
        readme: row.get("readme")?,
        owner: row.get("owner")?,
        lease_deadline: row
            .get::<_, Option<String>>("lease_deadline")?
            .map(parse_ts),
        created_at: parse_ts(row.get::<_, String>("created_at")?),
        updated_at: parse_ts(row.get::<_, String>("updated_at")?),
    })
}

fn map_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let status: String = row.get(3)?;
    Ok(Document {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        git_path: row.get(2)?,
        status: status.parse().unwrap_or(RepositoryStatus::Pending),
        last_update: parse_ts(row.get::<_, String>(4)?),
        created_at: parse_ts(row.get::<_, String>(5)?),
    })
}

fn map_catalogue(row: &Row<'_>) -> rusqlite::Result<DocumentCatalogue> {
    Ok(DocumentCatalogue {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        name: row.get(4)?,
        url: row.get(5)?,
        description: row.get(6)?,
        prompt: row.get(7)?,
        order_index: row.get(8)?,
        is_completed: row.get::<_, i64>(9)? != 0,
        is_deleted: row.get::<_, i64>(10)? != 0,
        created_at: parse_ts(row.get::<_, String>(11)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Classification, RepositoryKind};

    fn store_with_repo() -> (Store, Repository) {
        let store = Store::open_in_memory().unwrap();
        let repo = Repository::pending("https://example.test/org/repo.git", RepositoryKind::Git, None);
        store.insert_repository(&repo).unwrap();
        (store, repo)
    }

    #[test]
    fn test_lease_claims_pending_row() {
        let (store, repo) = store_with_repo();
        let leased = store
            .lease_next("worker-a", Duration::from_secs(3600))
            .unwrap()
            .expect("claims the pending row");
        assert_eq!(leased.id, repo.id);
        assert_eq!(leased.owner.as_deref(), Some("worker-a"));
        assert!(leased.lease_deadline.is_some());
    }

    #[test]
    fn test_lease_excludes_rows_held_by_others() {
        let (store, _) = store_with_repo();
        store
            .lease_next("worker-a", Duration::from_secs(3600))
            .unwrap()
            .unwrap();
        // a second worker finds nothing while the lease is live
        assert!(store
            .lease_next("worker-b", Duration::from_secs(3600))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_expired_lease_is_reclaimable() {
        let (store, repo) = store_with_repo();
        // simulate a crashed worker: processing with an expired lease
        store.conn().unwrap().execute(
            "UPDATE repository SET status = 'processing', owner = 'dead',
                lease_deadline = '2000-01-01T00:00:00+00:00' WHERE id = ?1",
            params![repo.id],
        ).unwrap();

        let leased = store
            .lease_next("worker-b", Duration::from_secs(3600))
            .unwrap()
            .expect("expired lease is claimable");
        assert_eq!(leased.owner.as_deref(), Some("worker-b"));
        assert_eq!(leased.status, RepositoryStatus::Processing);
    }

    #[test]
    fn test_processing_rows_served_first() {
        let store = Store::open_in_memory().unwrap();
        let mut older = Repository::pending("https://example.test/a.git", RepositoryKind::Git, None);
        older.created_at = Utc::now() - chrono::Duration::hours(2);
        store.insert_repository(&older).unwrap();

        let mut interrupted = Repository::pending("https://example.test/b.git", RepositoryKind::Git, None);
        interrupted.status = RepositoryStatus::Processing;
        store.insert_repository(&interrupted).unwrap();

        let leased = store
            .lease_next("worker-a", Duration::from_secs(3600))
            .unwrap()
            .unwrap();
        assert_eq!(leased.id, interrupted.id);
    }

    #[test]
    fn test_guarded_status_write_fails_without_lease() {
        let (store, repo) = store_with_repo();
        let err = store
            .update_status_guarded(&repo.id, "worker-x", RepositoryStatus::Processing, None)
            .unwrap_err();
        assert!(matches!(err, ScribeError::StorePreconditionFailed(_)));
    }

    #[test]
    fn test_repository_field_updates() {
        let (store, repo) = store_with_repo();
        store.set_readme(&repo.id, "# Widget").unwrap();
        store.set_manifest(&repo.id, "src/D\n").unwrap();
        store.set_classification(&repo.id, Classification::Libraries.as_str()).unwrap();

        let loaded = store.repository(&repo.id).unwrap().unwrap();
        assert_eq!(loaded.readme.as_deref(), Some("# Widget"));
        assert_eq!(loaded.optimized_directory_structure.as_deref(), Some("src/D\n"));
        assert_eq!(loaded.classify, Some(Classification::Libraries));
    }

    #[test]
    fn test_document_upsert_is_stable() {
        let (store, repo) = store_with_repo();
        let first = store.upsert_document(&repo.id, "/work/repo").unwrap();
        let second = store.upsert_document(&repo.id, "/work/repo").unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_overview_replace_keeps_single_row() {
        let (store, repo) = store_with_repo();
        let doc = store.upsert_document(&repo.id, "/work/repo").unwrap();
        store.replace_overview(&doc.id, "first").unwrap();
        store.replace_overview(&doc.id, "second").unwrap();

        let overview = store.overview(&doc.id).unwrap().unwrap();
        assert_eq!(overview.content, "second");
    }

    #[test]
    fn test_file_item_upsert_idempotent() {
        let (store, repo) = store_with_repo();
        let node = DocumentCatalogue {
            id: "cat-1".into(),
            repository_id: repo.id.clone(),
            parent_id: None,
            title: "getting-started".into(),
            name: "Getting Started".into(),
            url: "getting-started".into(),
            description: String::new(),
            prompt: String::new(),
            order_index: 0,
            is_completed: false,
            is_deleted: false,
            created_at: Utc::now(),
        };
        store.replace_catalogues(&repo.id, &[node]).unwrap();

        for content in ["v1", "v2"] {
            store
                .upsert_file_item(&DocumentFileItem {
                    id: uuid::Uuid::new_v4().to_string(),
                    catalogue_id: "cat-1".into(),
                    title: "Getting Started".into(),
                    content: content.into(),
                    sources: vec!["src/main.rs".into()],
                    created_at: Utc::now(),
                })
                .unwrap();
        }
        let item = store.file_item("cat-1").unwrap().unwrap();
        assert_eq!(item.content, "v2");
        assert_eq!(item.sources, vec!["src/main.rs".to_string()]);
    }

    #[test]
    fn test_soft_deleted_catalogues_invisible() {
        let (store, repo) = store_with_repo();
        let node = DocumentCatalogue {
            id: "cat-1".into(),
            repository_id: repo.id.clone(),
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
        };
        store.replace_catalogues(&repo.id, &[node]).unwrap();
        store.soft_delete_catalogue("cat-1").unwrap();
        assert!(store.catalogues(&repo.id).unwrap().is_empty());
    }

    #[test]
    fn test_commit_records_ordered_by_date() {
        let (store, repo) = store_with_repo();
        let base = Utc::now();
        let records: Vec<CommitRecord> = (0..3)
            .map(|i| CommitRecord {
                id: uuid::Uuid::new_v4().to_string(),
                repository_id: repo.id.clone(),
                title: format!("commit {}", i),
                description: String::new(),
                commit_date: base - chrono::Duration::days(3 - i),
                created_at: base,
            })
            .collect();
        // insert newest-first; read back oldest-first
        let mut reversed = records.clone();
        reversed.reverse();
        store.replace_commit_records(&repo.id, &reversed).unwrap();

        let loaded = store.commit_records(&repo.id).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded.windows(2).all(|w| w[0].commit_date <= w[1].commit_date));
    }

    #[test]
    fn test_stale_completed_query() {
        let (store, repo) = store_with_repo();
        let doc = store.upsert_document(&repo.id, "/work/repo").unwrap();
        store.conn().unwrap().execute(
            "UPDATE repository SET status = 'completed' WHERE id = ?1",
            params![repo.id],
        ).unwrap();
        store.conn().unwrap().execute(
            "UPDATE document SET last_update = '2000-01-01T00:00:00+00:00' WHERE id = ?1",
            params![doc.id],
        ).unwrap();

        let stale = store.stale_completed(Utc::now()).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0.id, repo.id);
    }
}
