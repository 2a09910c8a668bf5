//! Stage 3: Classification
//!
//! One of seven canonical tags, parsed case-insensitively out of the
//! `<classify>` wrapper. An unparseable token leaves the stored
//! classification unset and the pipeline continues with the base prompt
//! variants.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::prompts::PromptLibrary;
use crate::types::{Classification, Result};

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    if ctx.repository.classify.is_some() {
        debug!("classification already set, passing through");
        return Ok(());
    }

    let template = PromptLibrary::get("RepositoryClassification").unwrap_or_default();
    let mut vars = HashMap::new();
    vars.insert("category", ctx.manifest());
    vars.insert("readme", ctx.readme());

    let kernel = ctx.kernel;
    let output = retry_exponential("classify", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move { kernel.invoke_prompt(template, &vars).await }
    })
    .await?;

    match extract::extract_classify(&output).and_then(|token| Classification::parse(&token)) {
        Some(classify) => {
            info!(classify = %classify, "repository classified");
            ctx.store
                .set_classification(&ctx.repository.id, classify.as_str())?;
            ctx.repository.classify = Some(classify);
        }
        None => {
            // unparseable classification is not an error: base prompt
            // variants are used downstream
            warn!("classification token unparseable, leaving unset");
        }
    }
    Ok(())
}
