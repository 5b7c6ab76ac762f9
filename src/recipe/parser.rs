// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::profile::ProfileRegistry;
use crate::recipe::format::{BuildStyle, Recipe};
use crate::recipe::kitchen::Stage;
use std::collections::BTreeSet;
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe file: {}", e)))?;

    let mut recipe = parse_recipe(&content)?;
    recipe.recipe_dir = path.parent().map(Path::to_path_buf);
    Ok(recipe)
}

/// Validate a recipe for completeness and correctness
///
/// Authoring errors are returned as `Err`; softer problems come back as
/// warnings.
pub fn validate_recipe(recipe: &Recipe, registry: &ProfileRegistry) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    // Check for empty name/version
    if recipe.package.name.is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if recipe.package.version.is_empty() {
        return Err(Error::ParseError("Recipe package version cannot be empty".to_string()));
    }

    for source in &recipe.sources {
        let digest = source.sha256.strip_prefix("sha256:").unwrap_or(&source.sha256);
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::ParseError(format!(
                "Invalid sha256 for {}: {}",
                source.url, source.sha256
            )));
        }
    }

    if recipe.hooks.contains_key(&Stage::Package) {
        return Err(Error::ParseError(
            "The package stage cannot be overridden".to_string(),
        ));
    }
    for (stage, hook) in &recipe.hooks {
        if hook.per_profile == Some(true) && !stage.per_profile_by_default() {
            return Err(Error::ParseError(format!(
                "Stage '{}' cannot run per profile",
                stage
            )));
        }
        if (!hook.links.is_empty() || !hook.licenses.is_empty()) && *stage != Stage::PostInstall {
            warnings.push(format!(
                "links/licenses on stage '{}' are only honored for post_install",
                stage
            ));
        }
    }

    // Resolves every profile name, failing on unknown ones
    let specs = recipe.subpackage_specs(registry)?;

    let mut names = BTreeSet::from([recipe.package.name.clone()]);
    for spec in &specs {
        if !names.insert(spec.name.clone()) {
            return Err(Error::ParseError(format!(
                "Duplicate output package name: {}",
                spec.name
            )));
        }
        if spec.selectors.is_empty() {
            warnings.push(format!("Subpackage {} claims no paths", spec.name));
        }
    }

    if !recipe.cross.targets.is_empty() && recipe.cross_profiles(registry)?.is_empty() {
        warnings.push("Cross targets declared but none will be built".to_string());
    }

    // Warn about missing fields
    if recipe.package.description.is_none() {
        warnings.push("Missing package description".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if recipe.sources.is_empty() && recipe.build.style != BuildStyle::Meta {
        warnings.push("No sources declared".to_string());
    }

    Ok(warnings)
}
