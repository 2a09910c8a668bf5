//! Stage 1: README
//!
//! Reuse an existing README from the working tree when one exists;
//! otherwise have the model write one from the code. Either way the
//! result is re-synced onto the repository row.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::scanner;
use crate::types::Result;

const README_CANDIDATES: &[&str] = &[
    "README.md",
    "readme.md",
    "Readme.md",
    "README.MD",
    "README.txt",
    "readme.txt",
    "README",
    "readme",
];

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    if ctx
        .repository
        .readme
        .as_deref()
        .is_some_and(|r| !r.is_empty())
    {
        debug!("readme already set, passing through");
        return Ok(());
    }

    let work_dir = ctx.work_dir()?;

    let readme = match README_CANDIDATES
        .iter()
        .map(|name| work_dir.join(name))
        .find(|p| p.is_file())
    {
        Some(path) => {
            info!(path = %path.display(), "using existing readme");
            tokio::fs::read_to_string(&path).await?
        }
        None => {
            info!("no readme found, generating one");
            let paths = scanner::scan(&work_dir)?;
            let tree = scanner::build_tree(&paths, &ctx.repository_name());
            let mut vars = HashMap::new();
            vars.insert("catalogue", scanner::to_pathlist(&tree));
            vars.insert("git_repository", ctx.repository.web_address());
            vars.insert("branch", ctx.branch());

            let kernel = ctx.kernel;
            let output = retry_exponential("readme", STAGE_ATTEMPTS, |_| {
                let vars = vars.clone();
                async move {
                    kernel
                        .invoke_plugin("CodeAnalysis", "GenerateReadme", &vars)
                        .await
                }
            })
            .await?;
            extract::extract(&output, "readme")
        }
    };

    // unconditional overwrite: the working tree is the source of truth
    ctx.store.set_readme(&ctx.repository.id, &readme)?;
    ctx.repository.readme = Some(readme);
    Ok(())
}
