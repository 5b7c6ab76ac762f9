// src/commands/clean.rs

//! Clean command - manual invalidation

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use std::path::Path;

use super::{load_recipe, open_kitchen};

/// Remove a package's working tree, outputs and stamps
pub fn cmd_clean(config: &KilnConfig, recipe_path: &Path) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let kitchen = open_kitchen(config)?;

    let cleared = kitchen
        .clean(&recipe)
        .with_context(|| format!("Failed to clean {}", recipe.package.name))?;

    println!("Cleaned {} ({} stamp(s) removed)", recipe.package_id(), cleared);
    Ok(())
}
