// src/commands/build.rs

//! Build command - cook a recipe through the full lifecycle

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use kiln::recipe::{validate_recipe, Kitchen};
use std::path::{Path, PathBuf};
use tracing::info;

use super::load_recipe;

/// Command-line overrides for a build
#[derive(Debug, Default)]
pub struct BuildOptions {
    pub no_check: bool,
    pub allow_network: bool,
    pub force: bool,
    pub output_dir: Option<PathBuf>,
    pub jobs: Option<u32>,
}

/// Build a package from a recipe
pub fn cmd_build(config: &KilnConfig, recipe_path: &Path, options: BuildOptions) -> Result<()> {
    println!("Reading recipe: {}", recipe_path.display());
    let recipe = load_recipe(recipe_path)?;
    println!(
        "Recipe: {} version {} (r{})",
        recipe.package.name, recipe.package.version, recipe.package.release
    );

    let registry = config.registry().context("Invalid profile configuration")?;
    let warnings =
        validate_recipe(&recipe, &registry).with_context(|| "Recipe validation failed")?;
    for warning in &warnings {
        println!("Warning: {}", warning);
    }

    let mut kitchen_config = config.kitchen_config().context("Invalid configuration")?;
    if options.no_check {
        kitchen_config.skip_check = true;
    }
    if options.allow_network {
        kitchen_config.container.allow_network();
    }
    if let Some(dir) = options.output_dir {
        kitchen_config.output_dir = dir;
    }
    if let Some(jobs) = options.jobs {
        kitchen_config.jobs = jobs.max(1);
    }

    if kitchen_config.container.isolate_network {
        println!("Building with {} parallel jobs (network isolated)...", kitchen_config.jobs);
    } else {
        println!("[WARNING] Network access allowed during build");
        println!("Building with {} parallel jobs...", kitchen_config.jobs);
    }

    let kitchen = Kitchen::new(kitchen_config).with_registry(registry);

    if options.force {
        let cleared = kitchen
            .invalidate(&recipe)
            .with_context(|| format!("Failed to clear stamps for {}", recipe.package.name))?;
        println!("Cleared {} stamp(s)", cleared);
    }

    let result = kitchen
        .cook(&recipe)
        .with_context(|| format!("Failed to build {}", recipe.package.name))?;

    if result.up_to_date() {
        println!("\n[OK] {} is already built", result.package);
    } else {
        println!(
            "\n[COMPLETE] Built {} ({} stage(s) run, {} already done)",
            result.package,
            result.executed.len(),
            result.skipped.len()
        );
    }

    for output in &result.outputs {
        println!(
            "  {} ({} file(s)) -> {}",
            output.name,
            output.files.len(),
            output.root.display()
        );
    }
    println!("Build log: {}", result.log_path.display());

    info!(
        "Built {} into {} output package(s)",
        result.package,
        result.outputs.len()
    );
    Ok(())
}
