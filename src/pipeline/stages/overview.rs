//! Stage 5: Project Overview
//!
//! Always re-runs: the prior DocumentOverview row is deleted and the new
//! one inserted. Post-processing strips the analysis scratch tag before
//! extracting the wrapped article.

use std::collections::HashMap;

use crate::constants::retry::STAGE_ATTEMPTS;
use crate::kernel::extract;
use crate::pipeline::retry::retry_exponential;
use crate::pipeline::stages::StageContext;
use crate::prompts::PromptLibrary;
use crate::types::Result;

pub async fn run(ctx: &mut StageContext<'_>) -> Result<()> {
    let template = PromptLibrary::get("Overview").unwrap_or_default();
    let mut vars = HashMap::new();
    vars.insert("catalogue", ctx.manifest());
    vars.insert("git_repository", ctx.repository.web_address());
    vars.insert("branch", ctx.branch());
    vars.insert("readme", ctx.readme());

    let kernel = ctx.kernel;
    let output = retry_exponential("overview", STAGE_ATTEMPTS, |_| {
        let vars = vars.clone();
        async move { kernel.invoke_prompt(template, &vars).await }
    })
    .await?;

    let without_analysis = extract::strip_tag(&output, "project_analysis");
    let content = extract::extract_tag(&without_analysis, "blog")
        .unwrap_or_else(|| without_analysis.trim().to_string());

    ctx.store.replace_overview(&ctx.document.id, &content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::kernel::extract;

    #[test]
    fn test_post_processing_order() {
        let output = "<project_analysis>draft notes</project_analysis>\n<blog># Overview</blog>";
        let stripped = extract::strip_tag(output, "project_analysis");
        let content = extract::extract_tag(&stripped, "blog").unwrap();
        assert_eq!(content, "# Overview");
    }

    #[test]
    fn test_unwrapped_output_accepted_raw() {
        let output = "# Overview without wrapper";
        let stripped = extract::strip_tag(output, "project_analysis");
        let content =
            extract::extract_tag(&stripped, "blog").unwrap_or_else(|| stripped.trim().to_string());
        assert_eq!(content, "# Overview without wrapper");
    }
}
