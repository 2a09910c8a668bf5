//! Stage 2: Optimized Directory Manifest
//!
//! Small trees (and every tree when the smart filter is off) become the
//! direct compact form without an LLM call. Large trees go through the
//! CodeDirSimplifier plugin with linear back-off. The strict cutoff is
//! `< 800` files: a tree of exactly 800 is simplified.

use std::collections::HashMap;
use tracing::{debug, info};

use crate::constants::catalogue::SMART_FILTER_THRESHOLD;
use crate::constants::retry::SIMPLIFIER_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_linear;
use crate::pipeline::stages::StageContext;
use crate::scanner;
use crate::types::Result;

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    if ctx
        .repository
        .optimized_directory_structure
        .as_deref()
        .is_some_and(|m| !m.is_empty())
    {
        debug!("manifest already set, passing through");
        return Ok(());
    }

    let work_dir = ctx.work_dir()?;
    let paths = scanner::scan(&work_dir)?;
    let count = scanner::file_count(&paths);
    let tree = scanner::build_tree(&paths, &ctx.repository_name());
    let raw = scanner::render(&tree, ctx.config.document.catalogue_format)?;

    let manifest = if count < SMART_FILTER_THRESHOLD || !ctx.config.document.enable_smart_filter {
        debug!(files = count, "direct manifest, no smart filter");
        raw
    } else {
        info!(files = count, "smart-filtering directory tree");
        let mut vars = HashMap::new();
        vars.insert("code_files", raw);
        vars.insert("readme", ctx.readme());

        let kernel = ctx.kernel;
        let output = retry_linear("catalogue", SIMPLIFIER_ATTEMPTS, |_| {
            let vars = vars.clone();
            async move {
                kernel
                    .invoke_plugin("CodeAnalysis", "CodeDirSimplifier", &vars)
                    .await
            }
        })
        .await?;
        extract::extract(&output, "response_file")
    };

    ctx.store.set_manifest(&ctx.repository.id, &manifest)?;
    ctx.repository.optimized_directory_structure = Some(manifest);
    Ok(())
}
