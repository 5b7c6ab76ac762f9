// src/config.rs

//! kiln configuration file
//!
//! Loaded from `--config`, else `$XDG_CONFIG_HOME/kiln/kiln.toml`, else
//! built-in defaults. Every key is optional.
//!
//! ```toml
//! [paths]
//! build_root = "~/.cache/kiln/build"
//! stamp_dir = "~/.cache/kiln/stamps"
//!
//! [build]
//! jobs = 8
//!
//! [sandbox]
//! timeout_secs = 14400
//!
//! [profiles.aarch64.env]
//! CFLAGS = "-O2"
//! ```

use crate::container::{ContainerConfig, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::preflight::Preflight;
use crate::profile::ProfileRegistry;
use crate::recipe::KitchenConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application directory name under the XDG base directories
const APP_NAME: &str = "kiln";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KilnConfig {
    pub paths: PathsSection,
    pub build: BuildSettings,
    pub sandbox: SandboxSettings,
    /// Environment overrides per profile name
    pub profiles: BTreeMap<String, ProfileSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub build_root: Option<PathBuf>,
    pub stamp_dir: Option<PathBuf>,
    pub source_cache: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildSettings {
    /// Parallel jobs (default: available CPUs)
    pub jobs: Option<u32>,
    pub skip_check: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxSettings {
    pub allow_network: bool,
    pub timeout_secs: u64,
    pub hostname: String,
    /// bubblewrap executable; defaults to the one the host checks found
    pub bwrap: Option<PathBuf>,
    /// Build against `sysroot` only, without host system mounts
    pub pristine: bool,
    pub sysroot: Option<PathBuf>,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        let container = ContainerConfig::default();
        Self {
            allow_network: false,
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            hostname: container.hostname,
            bwrap: None,
            pristine: false,
            sysroot: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileSettings {
    pub env: BTreeMap<String, String>,
}

/// Resolved process-wide directories
///
/// Computed once at startup, after the host checks pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KilnPaths {
    pub build_root: PathBuf,
    pub stamp_dir: PathBuf,
    pub source_cache: PathBuf,
    pub output_dir: PathBuf,
}

impl KilnPaths {
    /// Resolve configured paths, defaulting to the user cache directory
    pub fn resolve(section: &PathsSection) -> Self {
        let base = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_NAME);
        let pick = |configured: &Option<PathBuf>, default: &str| {
            configured
                .as_deref()
                .map(expand_home)
                .unwrap_or_else(|| base.join(default))
        };

        Self {
            build_root: pick(&section.build_root, "build"),
            stamp_dir: pick(&section.stamp_dir, "stamps"),
            source_cache: pick(&section.source_cache, "sources"),
            output_dir: pick(&section.output_dir, "packages"),
        }
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

impl KilnConfig {
    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("kiln.toml"))
    }

    /// Parse configuration from TOML
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid configuration: {}", e)))
    }

    /// Load from `path`, or from the default location if it exists
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => path,
                None => {
                    debug!("No configuration file, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn paths(&self) -> KilnPaths {
        KilnPaths::resolve(&self.paths)
    }

    /// Engine configuration described by this file
    pub fn kitchen_config(&self) -> Result<KitchenConfig> {
        let paths = self.paths();
        let sandbox = &self.sandbox;

        let mut container = if sandbox.pristine {
            let sysroot = sandbox.sysroot.as_deref().ok_or_else(|| {
                Error::ParseError("sandbox.pristine requires sandbox.sysroot".to_string())
            })?;
            ContainerConfig::pristine(&expand_home(sysroot))
        } else {
            ContainerConfig::default()
        };
        container.hostname = sandbox.hostname.clone();
        if let Some(bwrap) = &sandbox.bwrap {
            container.bwrap = expand_home(bwrap);
        }
        container.timeout = Duration::from_secs(sandbox.timeout_secs);
        if sandbox.allow_network {
            container.allow_network();
        }

        let defaults = KitchenConfig::default();
        Ok(KitchenConfig {
            build_root: paths.build_root,
            stamp_dir: paths.stamp_dir,
            source_cache: paths.source_cache,
            output_dir: paths.output_dir,
            jobs: self.build.jobs.map(|j| j.max(1)).unwrap_or(defaults.jobs),
            skip_check: self.build.skip_check,
            container,
        })
    }

    /// Fill unset helper paths from what the host checks resolved
    pub fn adopt_host(&mut self, host: &Preflight) {
        if self.sandbox.bwrap.is_none() {
            self.sandbox.bwrap = host.program("bwrap").map(Path::to_path_buf);
        }
    }

    /// Profile registry with the configured environment overrides
    pub fn registry(&self) -> Result<ProfileRegistry> {
        let mut registry = ProfileRegistry::new();
        for (name, settings) in &self.profiles {
            registry.override_env(name, settings.env.clone())?;
        }
        Ok(registry)
    }
}
