//! Prompt Library
//!
//! Named markdown templates shipped as compiled-in resources, plus the
//! `{{$var}}` renderer. Templates are grouped into a flat namespace for
//! the pipeline stages and a plugin namespace ("CodeAnalysis") for the
//! functions the kernel exposes by plugin path. Classification-specific
//! selection is `base name + classification`, falling back to the base
//! when no variant exists. Rendering is pure: missing variables render
//! as empty, nothing is executed.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::types::Classification;

/// Flat template namespace. Locale variants register as `Name.locale`.
const TEMPLATES: &[(&str, &str)] = &[
    ("Overview", include_str!("templates/overview.md")),
    (
        "RepositoryClassification",
        include_str!("templates/repository_classification.md"),
    ),
    ("GenerateMindMap", include_str!("templates/generate_mind_map.md")),
    ("AnalyzeCatalogue", include_str!("templates/analyze_catalogue.md")),
    (
        "AnalyzeCatalogueApplications",
        include_str!("templates/analyze_catalogue_applications.md"),
    ),
    (
        "AnalyzeCatalogueFrameworks",
        include_str!("templates/analyze_catalogue_frameworks.md"),
    ),
    (
        "AnalyzeCatalogueLibraries",
        include_str!("templates/analyze_catalogue_libraries.md"),
    ),
    (
        "AnalyzeCatalogueDevelopmentTools",
        include_str!("templates/analyze_catalogue_development_tools.md"),
    ),
    (
        "AnalyzeCatalogueCLITools",
        include_str!("templates/analyze_catalogue_cli_tools.md"),
    ),
    (
        "AnalyzeCatalogueDevOpsConfiguration",
        include_str!("templates/analyze_catalogue_dev_ops_configuration.md"),
    ),
    (
        "AnalyzeCatalogueDocumentation",
        include_str!("templates/analyze_catalogue_documentation.md"),
    ),
    ("GenerateDocs", include_str!("templates/generate_docs.md")),
    (
        "AnalyzeNewCatalogue",
        include_str!("templates/analyze_new_catalogue.md"),
    ),
];

/// Plugin namespace: `{plugin -> {function -> template}}`.
const PLUGINS: &[(&str, &[(&str, &str)])] = &[(
    "CodeAnalysis",
    &[
        (
            "CodeDirSimplifier",
            include_str!("templates/code_dir_simplifier.md"),
        ),
        ("GenerateReadme", include_str!("templates/generate_readme.md")),
        ("CommitAnalyze", include_str!("templates/commit_analyze.md")),
    ],
)];

pub struct PromptLibrary;

impl PromptLibrary {
    /// Template by exact name.
    pub fn get(name: &str) -> Option<&'static str> {
        TEMPLATES
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, template)| *template)
    }

    /// Locale-filtered lookup: `Name.locale` wins when registered.
    pub fn get_localized(name: &str, locale: &str) -> Option<&'static str> {
        if !locale.is_empty() && locale != "en" {
            let localized = format!("{}.{}", name, locale);
            if let Some(template) = Self::get(&localized) {
                return Some(template);
            }
        }
        Self::get(name)
    }

    /// Classification-specific selection: `base + classification`,
    /// falling back to the base template.
    pub fn select(base: &str, classify: Option<Classification>) -> &'static str {
        if let Some(classify) = classify {
            let variant = format!("{}{}", base, classify.as_str());
            if let Some(template) = Self::get(&variant) {
                return template;
            }
        }
        Self::get(base).unwrap_or_default()
    }

    /// Plugin function template.
    pub fn plugin(plugin: &str, function: &str) -> Option<&'static str> {
        PLUGINS
            .iter()
            .find(|(name, _)| *name == plugin)?
            .1
            .iter()
            .find(|(name, _)| *name == function)
            .map(|(_, template)| *template)
    }

    /// Substitute `{{$var}}` placeholders. Missing variables render as
    /// empty strings.
    pub fn render(template: &str, vars: &HashMap<&str, String>) -> String {
        static VAR_RE: OnceLock<Regex> = OnceLock::new();
        let re = VAR_RE.get_or_init(|| Regex::new(r"\{\{\$([A-Za-z_][A-Za-z0-9_]*)\}\}").unwrap());
        re.replace_all(template, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_template_set_present() {
        for name in [
            "Overview",
            "RepositoryClassification",
            "GenerateMindMap",
            "AnalyzeCatalogue",
            "GenerateDocs",
            "AnalyzeNewCatalogue",
        ] {
            assert!(PromptLibrary::get(name).is_some(), "missing template {}", name);
        }
        assert!(PromptLibrary::plugin("CodeAnalysis", "CodeDirSimplifier").is_some());
        assert!(PromptLibrary::plugin("CodeAnalysis", "GenerateReadme").is_some());
    }

    #[test]
    fn test_variant_exists_per_classification() {
        for classify in Classification::ALL {
            let variant = format!("AnalyzeCatalogue{}", classify.as_str());
            assert!(
                PromptLibrary::get(&variant).is_some(),
                "missing variant {}",
                variant
            );
        }
    }

    #[test]
    fn test_select_falls_back_to_base() {
        let base = PromptLibrary::select("GenerateDocs", Some(Classification::Libraries));
        assert_eq!(base, PromptLibrary::get("GenerateDocs").unwrap());

        let variant = PromptLibrary::select("AnalyzeCatalogue", Some(Classification::CliTools));
        assert_eq!(variant, PromptLibrary::get("AnalyzeCatalogueCLITools").unwrap());

        let unset = PromptLibrary::select("AnalyzeCatalogue", None);
        assert_eq!(unset, PromptLibrary::get("AnalyzeCatalogue").unwrap());
    }

    #[test]
    fn test_render_substitution_and_missing_vars() {
        let mut vars = HashMap::new();
        vars.insert("readme", "# Widget".to_string());
        let rendered = PromptLibrary::render("A {{$readme}} B {{$absent}} C", &vars);
        assert_eq!(rendered, "A # Widget B  C");
    }

    #[test]
    fn test_localized_lookup_falls_back() {
        assert_eq!(
            PromptLibrary::get_localized("Overview", "zh"),
            PromptLibrary::get("Overview")
        );
    }

    #[test]
    fn test_classification_prompt_emits_wrapper_contract() {
        let template = PromptLibrary::get("RepositoryClassification").unwrap();
        assert!(template.contains("<classify>classifyName:"));
    }
}
