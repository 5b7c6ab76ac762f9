// src/recipe/mod.rs

//! Recipe system for building packages from source
//!
//! Recipes define how to build a package from source, including:
//! - Source archives and their checksums
//! - Build style, options and dependencies
//! - Cross targets to repeat the build for
//! - Per-stage hook overrides
//! - How the installed tree splits into output packages
//!
//! # Culinary Terminology
//!
//! - **Recipe**: The build specification (like a recipe card)
//! - **Kitchen**: Drives the lifecycle for one recipe at a time
//! - **Cook**: One build of one recipe, stage by stage
//!
//! # Example Recipe
//!
//! ```toml
//! [package]
//! name = "tk"
//! version = "8.6.13"
//!
//! [build]
//! style = "gnu_configure"
//! options = ["!check"]
//! wrksrc = "unix"
//! makedepends = ["tcl-devel", "libx11-devel"]
//!
//! [[source]]
//! url = "https://prdownloads.sourceforge.net/tcl/tk%(version)s-src.tar.gz"
//! sha256 = "2e65fa069a23365440a3c56c556b8673b5e32a283800d8d9b257e3f584ce0675"
//!
//! [[subpackage]]
//! name = "tk-devel"
//! paths = ["usr/lib/*.a", "usr/include", "usr/lib/pkgconfig"]
//! ```
//!
//! # Security
//!
//! Every build command runs in an unprivileged bubblewrap sandbox with:
//! - Read-only host system, read-only sources and patches
//! - Writable source tree and destdir only
//! - Private `/tmp` and no network unless allowed

mod format;
pub mod kitchen;
pub mod options;
pub mod parser;
mod subpackage;

pub use format::{
    BuildSection, BuildStyle, CrossSection, HookSection, LinkSpec, PackageSection, Recipe,
    SourceEntry,
};
pub use kitchen::{
    BuildContext, BuildPaths, CookResult, HookSet, Kitchen, KitchenConfig, SourceCache,
    SourceProvider, Stage, StageHook, UnitStatus,
};
pub use options::{Options, RecipeOption};
pub use parser::{parse_recipe, parse_recipe_file, validate_recipe};
pub use subpackage::{Activation, SubpackageSection, SubpackageSpec};
