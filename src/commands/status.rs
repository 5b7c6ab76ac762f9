// src/commands/status.rs

//! Status command - stamp state per stage and profile

use anyhow::{Context, Result};
use kiln::config::KilnConfig;
use std::path::Path;

use super::{load_recipe, open_kitchen};

pub fn cmd_status(config: &KilnConfig, recipe_path: &Path) -> Result<()> {
    let recipe = load_recipe(recipe_path)?;
    let kitchen = open_kitchen(config)?;
    let units = kitchen
        .status(&recipe)
        .with_context(|| format!("Failed to read stamps for {}", recipe.package.name))?;

    println!("{}", recipe.package_id());
    for unit in &units {
        let marker = if unit.done { "[done]" } else { "[    ]" };
        println!("  {} {}", marker, unit.key.unit());
    }

    match units.iter().find(|u| !u.done) {
        Some(next) => println!("\nNext: {}", next.key.unit()),
        None => println!("\nState: {}", kiln::recipe::Stage::Package.completed_state()),
    }
    Ok(())
}
