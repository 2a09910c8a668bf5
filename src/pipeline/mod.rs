//! Pipeline Orchestrator
//!
//! Drives the eight stages in dependency order under per-stage tracing
//! spans. The orchestrator itself is idempotent: each stage's skip rule
//! combined with its persistence contract means re-entry after a crash
//! resumes from the first not-yet-completed stage inferable from store
//! state. Stages 4-6 always re-run (delete-then-insert); stage 7 keeps
//! partial progress through the per-node completion flag.

pub mod retry;
pub mod stages;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, Instrument};

use crate::config::Config;
use crate::kernel::Kernel;
use crate::store::Store;
use crate::types::{Document, Repository, Result, ScribeError};

use stages::StageContext;

/// Stage execution order.
const STAGE_ORDER: [&str; 8] = [
    "readme",
    "catalogue",
    "classify",
    "mindmap",
    "overview",
    "think_catalogue",
    "per_doc",
    "changelog",
];

/// Run the full pipeline against one leased repository.
#[instrument(skip_all, fields(repository.id = %repository.id))]
pub async fn run(
    store: &Store,
    config: &Config,
    kernel: &Kernel,
    file_kernel: &Kernel,
    repository: &mut Repository,
    document: &Document,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ctx = StageContext {
        repository,
        document,
        kernel,
        file_kernel,
        store,
        config,
    };

    for name in STAGE_ORDER {
        // every stage's persistence contract tolerates stopping here
        if cancel.is_cancelled() {
            return Err(ScribeError::Cancelled);
        }
        let span = tracing::info_span!(
            "stage",
            stage = name,
            repository.id = %ctx.repository.id,
            manifest_len = ctx.repository.optimized_directory_structure.as_deref().map(str::len),
        );
        async {
            info!("stage starting");
            match name {
                "readme" => stages::readme::run(&mut ctx).await,
                "catalogue" => stages::catalogue::run(&mut ctx).await,
                "classify" => stages::classify::run(&mut ctx).await,
                "mindmap" => stages::mindmap::run(&mut ctx).await,
                "overview" => stages::overview::run(&mut ctx).await,
                "think_catalogue" => stages::think_catalogue::run(&mut ctx).await,
                "per_doc" => stages::per_doc::run(&mut ctx).await,
                "changelog" => stages::changelog::run(&mut ctx).await,
                _ => Ok(()),
            }
        }
        .instrument(span)
        .await?;
    }

    info!("pipeline complete");
    Ok(())
}
