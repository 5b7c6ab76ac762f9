// src/recipe/kitchen/stage.rs

//! Lifecycle stages
//!
//! A package moves through the stages in a fixed order. Completing a stage
//! puts the package in the matching state (`extract` → `extracted`, ...);
//! `package` is terminal.

use serde::{Deserialize, Serialize};

/// Lifecycle stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Unpack source artifacts into the source tree
    Extract,
    /// Apply the recipe's patches
    Patch,
    /// Configure the build directory
    Configure,
    /// Compile
    Build,
    /// Run the test suite
    Check,
    /// Install into the destdir
    Install,
    /// Adjust the installed tree (links, licenses, cleanup)
    PostInstall,
    /// Split the installed tree into output packages
    Package,
}

impl Stage {
    /// All stages in order
    pub fn all() -> &'static [Stage] {
        &[
            Self::Extract,
            Self::Patch,
            Self::Configure,
            Self::Build,
            Self::Check,
            Self::Install,
            Self::PostInstall,
            Self::Package,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Patch => "patch",
            Self::Configure => "configure",
            Self::Build => "build",
            Self::Check => "check",
            Self::Install => "install",
            Self::PostInstall => "post_install",
            Self::Package => "package",
        }
    }

    /// State the package is in once this stage completes
    pub fn completed_state(&self) -> &'static str {
        match self {
            Self::Extract => "extracted",
            Self::Patch => "patched",
            Self::Configure => "configured",
            Self::Build => "built",
            Self::Check => "checked",
            Self::Install => "installed",
            Self::PostInstall => "post-installed",
            Self::Package => "packaged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "extract" => Some(Self::Extract),
            "patch" => Some(Self::Patch),
            "configure" => Some(Self::Configure),
            "build" => Some(Self::Build),
            "check" => Some(Self::Check),
            "install" => Some(Self::Install),
            "post_install" => Some(Self::PostInstall),
            "package" => Some(Self::Package),
            _ => None,
        }
    }

    /// Get the next stage after this one
    pub fn next(&self) -> Option<Stage> {
        let all = Self::all();
        let idx = all.iter().position(|s| s == self)?;
        all.get(idx + 1).copied()
    }

    /// Whether the stage repeats once per cross target unless overridden
    pub fn per_profile_by_default(&self) -> bool {
        matches!(
            self,
            Self::Configure | Self::Build | Self::Check | Self::Install
        )
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
