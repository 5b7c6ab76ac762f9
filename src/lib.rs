// src/lib.rs

//! Kiln Package Builder
//!
//! Cross-compilation aware build orchestrator that drives recipes through a
//! fixed lifecycle inside an unprivileged sandbox.
//!
//! # Architecture
//!
//! - Stamps: every completed stage (per profile where relevant) is recorded
//!   on disk, so an interrupted build resumes after the last finished unit
//! - Profiles: the host plus cross targets, activated on an explicit stack
//!   owned by the build context
//! - Sandbox: all recipe commands run through bubblewrap with a read-only
//!   host and writable source tree and destdir
//! - Splitting: the installed tree is partitioned into one main package and
//!   any number of subpackages, each file claimed exactly once

pub mod config;
pub mod container;
pub mod dependencies;
mod error;
pub mod hash;
pub mod preflight;
pub mod profile;
pub mod recipe;
pub mod split;
pub mod stamp;

pub use config::KilnConfig;
pub use dependencies::{aggregate, DependencyMap, DependencySet};
pub use error::{Error, Result};
pub use profile::{Arch, Profile, ProfileRegistry};
pub use recipe::{CookResult, Kitchen, KitchenConfig, Recipe, Stage};
pub use split::OutputPackage;
pub use stamp::{FsStampStore, PackageId, StampKey, StampStore};
