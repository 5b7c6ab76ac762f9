// src/commands/deps.rs

//! Deps command - aggregated dependencies per output package

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use kiln::dependencies::aggregate_declared;
use std::path::Path;

use super::load_recipe;

pub fn cmd_deps(config: &KilnConfig, recipe_path: &Path, json: bool) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let registry = config.registry().context("Invalid profile configuration")?;
    let map = aggregate_declared(&recipe, &registry)
        .with_context(|| format!("Failed to resolve outputs of {}", recipe.package.name))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (output, deps) in map.iter() {
        println!("{}", output);
        for (kind, set) in [
            ("host", &deps.host),
            ("target", &deps.target),
            ("runtime", &deps.runtime),
        ] {
            if !set.is_empty() {
                let list: Vec<&str> = set.iter().map(String::as_str).collect();
                println!("  {:8} {}", kind, list.join(", "));
            }
        }
    }
    Ok(())
}
