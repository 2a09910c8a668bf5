//! Worker Loop
//!
//! One long-running task per worker process, one repository at a time.
//! The loop claims a row through the store's atomic lease, materializes
//! the working tree, drives the pipeline, and writes exactly one status
//! transition at the end. A lost lease (`StorePreconditionFailed`) means
//! another worker owns the row now: abandon it without further writes.

pub mod updater;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::constants::worker::{FAILURE_BACKOFF_SECS, IDLE_POLL_SECS, LEASE_SECS};
use crate::git;
use crate::kernel::Kernel;
use crate::pipeline;
use crate::store::SharedStore;
use crate::types::{Repository, RepositoryKind, RepositoryStatus, Result, ScribeError};

pub struct Worker {
    store: SharedStore,
    config: Arc<Config>,
    id: String,
}

impl Worker {
    pub fn new(store: SharedStore, config: Arc<Config>) -> Self {
        Self {
            store,
            config,
            id: format!("worker-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The main loop. Exits only on cancellation; no error aborts the
    /// process.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(worker = %self.id, "worker loop starting");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let leased = self
                .store
                .lease_next(&self.id, Duration::from_secs(LEASE_SECS));
            match leased {
                Ok(Some(repository)) => self.process(repository, &cancel).await,
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(IDLE_POLL_SECS)) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "queue poll failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(FAILURE_BACKOFF_SECS)) => {}
                    }
                }
            }
        }
        info!(worker = %self.id, "worker loop stopped");
    }

    async fn process(&self, mut repository: Repository, cancel: &CancellationToken) {
        info!(
            repository.id = %repository.id,
            address = %repository.address,
            kind = repository.kind.as_str(),
            "processing repository"
        );

        match self.execute(&mut repository, cancel).await {
            Ok(()) => {
                if let Err(e) = self.finish(&repository, RepositoryStatus::Completed, None) {
                    warn!(error = %e, "completion write failed");
                }
                info!(repository.id = %repository.id, "repository completed");
            }
            Err(ScribeError::StorePreconditionFailed(message)) => {
                // lease lost: another worker owns the row, walk away
                warn!(repository.id = %repository.id, %message, "lease lost, abandoning row");
            }
            Err(ScribeError::Cancelled) => {
                // partial state is valid for resume; release so the next
                // leasing cycle can pick the row back up
                info!(repository.id = %repository.id, "run cancelled, leaving row resumable");
                let _ = self.store.release_lease(&repository.id, &self.id);
            }
            Err(e) => {
                error!(repository.id = %repository.id, error = %e, "repository failed");
                tokio::time::sleep(Duration::from_secs(FAILURE_BACKOFF_SECS)).await;
                if let Err(write_err) =
                    self.finish(&repository, RepositoryStatus::Failed, Some(&e.to_string()))
                {
                    warn!(error = %write_err, "failure write failed");
                }
            }
        }
    }

    async fn execute(&self, repository: &mut Repository, cancel: &CancellationToken) -> Result<()> {
        // materialize the working tree and move the row to processing
        let work_dir: PathBuf = match repository.kind {
            RepositoryKind::Git => {
                let base = PathBuf::from(&self.config.repositories_path);
                let cloned = git::clone(
                    &repository.address,
                    repository.git_user_name.as_deref(),
                    repository.git_password.as_deref(),
                    repository.branch.as_deref(),
                    &base,
                )
                .await?;
                let work_path = cloned.local_path.to_string_lossy().to_string();
                self.store.update_clone_info(
                    &repository.id,
                    &cloned.repository_name,
                    &cloned.branch_name,
                    &cloned.version,
                    &cloned.organization,
                    &work_path,
                )?;
                repository.name = Some(cloned.repository_name);
                repository.branch = Some(cloned.branch_name);
                repository.version = Some(cloned.version);
                repository.organization = Some(cloned.organization);
                repository.work_path = Some(work_path);
                self.store.update_status_guarded(
                    &repository.id,
                    &self.id,
                    RepositoryStatus::Processing,
                    None,
                )?;
                repository.status = RepositoryStatus::Processing;
                cloned.local_path
            }
            RepositoryKind::File => {
                let path = repository.address.clone();
                self.store.set_work_path(&repository.id, &path)?;
                repository.work_path = Some(path.clone());
                self.store.update_status_guarded(
                    &repository.id,
                    &self.id,
                    RepositoryStatus::Processing,
                    None,
                )?;
                repository.status = RepositoryStatus::Processing;
                PathBuf::from(path)
            }
            RepositoryKind::Unsupported => {
                return Err(ScribeError::UnsupportedRepositoryType(
                    repository.kind.as_str().to_string(),
                ));
            }
        };

        let document = self
            .store
            .upsert_document(&repository.id, &work_dir.to_string_lossy())?;

        let kernel = Kernel::new(&self.config, &work_dir, &self.config.openai.chat_model, true)?;
        let file_kernel =
            Kernel::new(&self.config, &work_dir, &self.config.openai.chat_model, false)?;

        pipeline::run(
            &self.store,
            &self.config,
            &kernel,
            &file_kernel,
            repository,
            &document,
            cancel,
        )
        .await
    }

    /// The single terminal status write for this run, mirrored onto the
    /// document row, followed by lease release.
    fn finish(
        &self,
        repository: &Repository,
        status: RepositoryStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.store
            .update_status_guarded(&repository.id, &self.id, status, error)?;
        if let Some(document) = self.store.document_for(&repository.id)? {
            self.store.touch_document(&document.id, status)?;
        }
        self.store.release_lease(&repository.id, &self.id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_type_marks_failed() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let config = Arc::new(Config::default());

        let repo = Repository::pending("/data/somewhere", RepositoryKind::Unsupported, None);
        store.insert_repository(&repo).unwrap();

        let worker = Worker::new(store.clone(), config);
        let leased = store
            .lease_next(worker.id(), Duration::from_secs(60))
            .unwrap()
            .unwrap();
        worker.process(leased, &CancellationToken::new()).await;

        let loaded = store.repository(&repo.id).unwrap().unwrap();
        assert_eq!(loaded.status, RepositoryStatus::Failed);
        assert!(loaded.error.unwrap().contains("unsupported repository type"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_file_repository_records_error() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let config = Arc::new(Config::default());

        // file repository pointing at a missing directory: the scan in
        // stage 2 fails and the worker marks the row failed
        let repo = Repository::pending("/definitely/not/here", RepositoryKind::File, None);
        store.insert_repository(&repo).unwrap();

        let worker = Worker::new(store.clone(), config);
        let leased = store
            .lease_next(worker.id(), Duration::from_secs(60))
            .unwrap()
            .unwrap();
        worker.process(leased, &CancellationToken::new()).await;

        let loaded = store.repository(&repo.id).unwrap().unwrap();
        assert_eq!(loaded.status, RepositoryStatus::Failed);
        assert!(loaded.error.is_some());
        // lease released for the next cycle
        assert!(loaded.owner.is_none());
    }
}
