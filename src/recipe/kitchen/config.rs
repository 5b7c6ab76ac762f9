// src/recipe/kitchen/config.rs

//! Configuration types for the Kitchen build system

use crate::container::ContainerConfig;
use crate::dependencies::DependencyMap;
use crate::recipe::kitchen::Stage;
use crate::split::OutputPackage;
use crate::stamp::PackageId;
use std::path::{Path, PathBuf};

/// Configuration for the Kitchen
#[derive(Debug, Clone)]
pub struct KitchenConfig {
    /// Root of the per-package working trees (sources, destdirs, logs)
    pub build_root: PathBuf,
    /// Directory holding stamps and package locks
    pub stamp_dir: PathBuf,
    /// Directory holding verified source artifacts
    pub source_cache: PathBuf,
    /// Where emitted output packages go
    pub output_dir: PathBuf,
    /// Number of parallel jobs
    pub jobs: u32,
    /// Skip the check stage regardless of recipe options
    pub skip_check: bool,
    /// Sandbox settings for every build command
    pub container: ContainerConfig,
}

impl Default for KitchenConfig {
    fn default() -> Self {
        let base = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kiln");
        Self::under(&base)
    }
}

impl KitchenConfig {
    /// Configuration with every directory below `base`
    pub fn under(base: &Path) -> Self {
        let jobs = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);

        Self {
            build_root: base.join("build"),
            stamp_dir: base.join("stamps"),
            source_cache: base.join("sources"),
            output_dir: base.join("packages"),
            jobs,
            skip_check: false,
            container: ContainerConfig::default(),
        }
    }

    /// Create a configuration for pristine builds against `sysroot`
    ///
    /// The sandbox gets no host system mounts; the sysroot has to carry the
    /// whole toolchain.
    pub fn for_sysroot(base: &Path, sysroot: &Path) -> Self {
        Self {
            container: ContainerConfig::pristine(sysroot),
            ..Self::under(base)
        }
    }
}

/// Result of cooking a recipe
#[derive(Debug)]
pub struct CookResult {
    pub package: PackageId,
    /// Emitted output packages, main package first
    pub outputs: Vec<OutputPackage>,
    /// Dependency sets per output package
    pub dependencies: DependencyMap,
    /// Units run by this invocation (`stage` or `stage@profile`)
    pub executed: Vec<String>,
    /// Units skipped because a stamp said they were done
    pub skipped: Vec<String>,
    /// Build log of every sandboxed command
    pub log_path: PathBuf,
}

impl CookResult {
    /// Whether the cook found everything already done
    pub fn up_to_date(&self) -> bool {
        self.executed.is_empty()
    }

    /// Whether a given unit ran in this invocation
    pub fn ran(&self, stage: Stage, profile: Option<&str>) -> bool {
        let unit = match profile {
            Some(p) => format!("{}@{}", stage, p),
            None => stage.to_string(),
        };
        self.executed.contains(&unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kitchen_config_default() {
        let config = KitchenConfig::default();
        assert!(config.jobs > 0);
        assert!(!config.skip_check);
        assert!(config.container.isolate_network);
        assert!(!config.container.is_pristine());
        assert!(config.build_root.ends_with("kiln/build"));
    }

    #[test]
    fn test_kitchen_config_for_sysroot() {
        let config = KitchenConfig::for_sysroot(Path::new("/tmp/k"), Path::new("/opt/stage0"));
        assert!(config.container.is_pristine());
        assert_eq!(config.stamp_dir, PathBuf::from("/tmp/k/stamps"));
    }

    #[test]
    fn test_cook_result_units() {
        let result = CookResult {
            package: PackageId::new("tk", "8.6.13", 0),
            outputs: Vec::new(),
            dependencies: DependencyMap::default(),
            executed: vec!["configure@aarch64".to_string()],
            skipped: vec!["extract".to_string()],
            log_path: PathBuf::from("/tmp/tk.log"),
        };
        assert!(result.ran(Stage::Configure, Some("aarch64")));
        assert!(!result.ran(Stage::Extract, None));
        assert!(!result.up_to_date());
    }
}
