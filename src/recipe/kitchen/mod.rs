// src/recipe/kitchen/mod.rs

//! Kitchen: the lifecycle engine for cooking recipes
//!
//! The Kitchen drives one recipe at a time through the fixed stage
//! sequence. It handles:
//! - Serializing builds of the same package with a lock file
//! - Skipping units that already carry a stamp
//! - Repeating per-profile stages for every cross target
//! - Running every command through the sandboxed executor
//! - Splitting the installed tree into output packages

mod config;
mod context;
mod cook;
mod hooks;
mod sources;
mod stage;
mod style;

pub use config::{CookResult, KitchenConfig};
pub use context::{BuildContext, BuildPaths};
pub use cook::Cook;
pub use hooks::{CommandHook, HookSet, HookSlot, StageHook};
pub use sources::{SourceCache, SourceProvider};
pub use stage::Stage;
pub use style::{ApplyPatches, ExtractSources, StyleHook};

use crate::container::{Executor, Sandbox};
use crate::error::{Error, Result};
use crate::profile::ProfileRegistry;
use crate::recipe::format::Recipe;
use crate::recipe::parser::validate_recipe;
use crate::stamp::{FsStampStore, PackageLock, StampKey, StampStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// One unit of work and whether it is stamped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub key: StampKey,
    pub done: bool,
}

/// The Kitchen: where recipes are cooked
pub struct Kitchen {
    pub(crate) config: KitchenConfig,
    registry: ProfileRegistry,
    executor: Arc<dyn Executor>,
    stamps: Arc<dyn StampStore>,
    sources: Arc<dyn SourceProvider>,
}

impl Kitchen {
    /// Create a new Kitchen with the given configuration
    pub fn new(config: KitchenConfig) -> Self {
        Self {
            registry: ProfileRegistry::new(),
            executor: Arc::new(Sandbox::new(config.container.clone())),
            stamps: Arc::new(FsStampStore::new(&config.stamp_dir)),
            sources: Arc::new(SourceCache::new(&config.source_cache)),
            config,
        }
    }

    pub fn with_registry(mut self, registry: ProfileRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Route build commands through another executor
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_stamp_store(mut self, stamps: Arc<dyn StampStore>) -> Self {
        self.stamps = stamps;
        self
    }

    pub fn with_source_provider(mut self, sources: Arc<dyn SourceProvider>) -> Self {
        self.sources = sources;
        self
    }

    pub fn config(&self) -> &KitchenConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProfileRegistry {
        &self.registry
    }

    pub fn stamps(&self) -> &dyn StampStore {
        self.stamps.as_ref()
    }

    /// Working locations for `recipe`
    pub fn build_paths(&self, recipe: &Recipe) -> BuildPaths {
        BuildPaths::new(&self.config, recipe)
    }

    /// The default hooks for `recipe`
    pub fn hooks_for(&self, recipe: &Recipe) -> HookSet {
        HookSet::for_recipe(recipe, Arc::clone(&self.sources))
    }

    fn lock_path(&self, recipe: &Recipe) -> PathBuf {
        self.config
            .stamp_dir
            .join(format!("{}.lock", recipe.package_id()))
    }

    fn lock(&self, recipe: &Recipe) -> Result<PackageLock> {
        PackageLock::try_acquire(self.lock_path(recipe))?
            .ok_or_else(|| Error::Locked(recipe.package_id().to_string()))
    }

    /// Cook a recipe with its default hooks
    pub fn cook(&self, recipe: &Recipe) -> Result<CookResult> {
        let hooks = self.hooks_for(recipe);
        self.cook_with_hooks(recipe, &hooks)
    }

    /// Cook a recipe with caller-supplied hooks
    ///
    /// Units already stamped are skipped, so calling this again after a
    /// failure resumes at the failed unit.
    pub fn cook_with_hooks(&self, recipe: &Recipe, hooks: &HookSet) -> Result<CookResult> {
        for warning in validate_recipe(recipe, &self.registry)? {
            warn!("{}: {}", recipe.package.name, warning);
        }

        let _lock = self.lock(recipe)?;
        let paths = self.build_paths(recipe);
        Cook::new(self, recipe, hooks, &paths)?.run()
    }

    /// Every unit `recipe` would run, in execution order
    pub fn plan(&self, recipe: &Recipe, hooks: &HookSet) -> Result<Vec<StampKey>> {
        let package = recipe.package_id();
        let targets = recipe.cross_profiles(&self.registry)?;
        let mut units = Vec::new();
        for &stage in Stage::all() {
            for profile in cook::stage_profiles(self, hooks, stage, &targets) {
                units.push(StampKey::new(package.clone(), stage, profile.stamp_key()));
            }
        }
        Ok(units)
    }

    /// Stamp state of every unit of `recipe`
    pub fn status(&self, recipe: &Recipe) -> Result<Vec<UnitStatus>> {
        let hooks = self.hooks_for(recipe);
        self.plan(recipe, &hooks)?
            .into_iter()
            .map(|key| {
                let done = self.stamps.done(&key)?;
                Ok(UnitStatus { key, done })
            })
            .collect()
    }

    /// Drop every stamp of `recipe`; returns how many were removed
    pub fn invalidate(&self, recipe: &Recipe) -> Result<usize> {
        let _lock = self.lock(recipe)?;
        let removed = self.stamps.clear(&recipe.package_id())?;
        info!("{}: cleared {} stamp(s)", recipe.package_id(), removed);
        Ok(removed)
    }

    /// Remove the package's working tree, outputs and stamps; returns how
    /// many stamps were removed
    pub fn clean(&self, recipe: &Recipe) -> Result<usize> {
        let _lock = self.lock(recipe)?;
        let paths = self.build_paths(recipe);
        for dir in [&paths.workdir, &paths.outputs] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|e| {
                    Error::IoError(format!("Failed to remove {}: {}", dir.display(), e))
                })?;
                info!("Removed {}", dir.display());
            }
        }

        self.stamps.clear(&recipe.package_id())
    }
}
