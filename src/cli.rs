// src/cli.rs
//! CLI definitions for kiln
//!
//! The command implementations live in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author = "Kiln Contributors")]
#[command(version)]
#[command(about = "Cross-compilation aware package builder with resumable, sandboxed builds", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/kiln/kiln.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a package from a recipe, resuming where a previous run stopped
    Build {
        /// Path to the recipe file
        recipe: PathBuf,

        /// Skip the check stage
        #[arg(long)]
        no_check: bool,

        /// Allow network access inside the sandbox
        #[arg(long)]
        allow_network: bool,

        /// Clear the package's stamps and rebuild from scratch
        #[arg(long)]
        force: bool,

        /// Output directory for emitted packages
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<u32>,
    },

    /// Remove a package's build tree, outputs and stamps
    Clean {
        /// Path to the recipe file
        recipe: PathBuf,
    },

    /// Show which stages are done for a package
    Status {
        /// Path to the recipe file
        recipe: PathBuf,
    },

    /// Show the dependencies of every output package
    Deps {
        /// Path to the recipe file
        recipe: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the architecture profiles
    Profiles,

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}
