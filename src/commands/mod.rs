// src/commands/mod.rs
//! Command handlers for the kiln CLI

mod build;
mod clean;
mod deps;
mod profiles;
mod status;

pub use build::{cmd_build, BuildOptions};
pub use clean::cmd_clean;
pub use deps::cmd_deps;
pub use profiles::cmd_profiles;
pub use status::cmd_status;

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use kiln::recipe::{parse_recipe_file, Kitchen, Recipe};
use std::path::Path;

/// Load a recipe file
pub(crate) fn load_recipe(path: &Path) -> Result<Recipe> {
    parse_recipe_file(path).with_context(|| format!("Failed to parse recipe: {}", path.display()))
}

/// Kitchen built from the configuration file
pub(crate) fn open_kitchen(config: &KilnConfig) -> Result<Kitchen> {
    let kitchen_config = config
        .kitchen_config()
        .context("Invalid configuration")?;
    let registry = config.registry().context("Invalid profile configuration")?;
    Ok(Kitchen::new(kitchen_config).with_registry(registry))
}
