// src/recipe/kitchen/cook.rs

//! Cook: the lifecycle run for a single recipe
//!
//! Stages run in order. Each stage expands into units, one per cross target
//! for per-profile stages or a single unkeyed unit otherwise. A unit is
//! skipped when its stamp exists; otherwise its profile is activated, its
//! hook runs and its stamp is written. The first failing unit halts the
//! package.

use crate::dependencies::{self, DependencyMap};
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::recipe::format::Recipe;
use crate::recipe::SubpackageSpec;
use crate::split::{self, InstallTree, OutputPackage};
use crate::stamp::{PackageId, StampKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use tracing::{debug, info, warn};

use super::context::{BuildContext, BuildPaths};
use super::hooks::{HookSet, StageHook};
use super::stage::Stage;
use super::{CookResult, Kitchen};

/// What the package stage leaves behind for resumed builds
#[derive(Debug, Serialize, Deserialize)]
struct OutputsRecord {
    outputs: Vec<OutputPackage>,
    dependencies: DependencyMap,
}

/// Profiles `stage` runs under, in order; empty when the stage has no hook
pub(super) fn stage_profiles(
    kitchen: &Kitchen,
    hooks: &HookSet,
    stage: Stage,
    targets: &[Profile],
) -> Vec<Profile> {
    let host = kitchen.registry().host();
    if stage == Stage::Package {
        return vec![host.clone()];
    }
    if stage == Stage::Check && kitchen.config.skip_check {
        return Vec::new();
    }
    match hooks.get(stage) {
        None => Vec::new(),
        Some(slot) if slot.per_profile(stage) && !targets.is_empty() => targets.to_vec(),
        Some(_) => vec![host.clone()],
    }
}

/// A single cook operation
pub struct Cook<'a> {
    pub(super) kitchen: &'a Kitchen,
    pub(super) recipe: &'a Recipe,
    pub(super) hooks: &'a HookSet,
    pub(super) paths: &'a BuildPaths,
    pub(super) package: PackageId,
    /// Recipe fingerprint recorded in every stamp
    pub(super) fingerprint: String,
    /// Cross targets the per-profile stages iterate
    pub(super) targets: Vec<Profile>,
    /// Units run by this invocation
    pub(super) executed: Vec<String>,
    /// Units skipped because they were already stamped
    pub(super) skipped: Vec<String>,
    pub(super) last_completed: Option<String>,
    /// Profiles that completed at least one per-profile unit
    pub(super) built_profiles: BTreeSet<String>,
}

impl<'a> Cook<'a> {
    pub(super) fn new(
        kitchen: &'a Kitchen,
        recipe: &'a Recipe,
        hooks: &'a HookSet,
        paths: &'a BuildPaths,
    ) -> Result<Self> {
        Ok(Self {
            kitchen,
            recipe,
            hooks,
            paths,
            package: recipe.package_id(),
            fingerprint: recipe.fingerprint()?,
            targets: recipe.cross_profiles(kitchen.registry())?,
            executed: Vec::new(),
            skipped: Vec::new(),
            last_completed: None,
            built_profiles: BTreeSet::new(),
        })
    }

    /// Run every stage, resuming past stamped units
    pub(super) fn run(mut self) -> Result<CookResult> {
        self.paths.prepare()?;

        let kitchen = self.kitchen;
        let jobs = self.recipe.build.jobs.unwrap_or(kitchen.config.jobs);
        let mut ctx = BuildContext::new(
            self.recipe,
            kitchen.executor.as_ref(),
            self.paths,
            kitchen.registry().host().clone(),
            jobs,
        );

        info!(
            "Cooking {} ({} target(s))",
            self.package,
            self.targets.len()
        );

        for &stage in Stage::all() {
            if stage != Stage::Package {
                self.run_stage(&mut ctx, stage)?;
            }
        }
        let (outputs, dependencies) = self.package()?;

        info!(
            "{}: {} unit(s) run, {} already done",
            self.package,
            self.executed.len(),
            self.skipped.len()
        );

        Ok(CookResult {
            package: self.package,
            outputs,
            dependencies,
            executed: self.executed,
            skipped: self.skipped,
            log_path: self.paths.log.clone(),
        })
    }

    /// Run one stage for every profile it applies to
    pub(super) fn run_stage(&mut self, ctx: &mut BuildContext<'_>, stage: Stage) -> Result<()> {
        let hooks = self.hooks;
        let Some(slot) = hooks.get(stage) else {
            debug!("{}: no hook for {}, skipping", self.package, stage);
            return Ok(());
        };
        let per_profile = slot.per_profile(stage);

        for profile in stage_profiles(self.kitchen, hooks, stage, &self.targets) {
            self.run_unit(ctx, stage, &profile, per_profile, slot.hook.as_ref())?;
        }
        Ok(())
    }

    fn run_unit(
        &mut self,
        ctx: &mut BuildContext<'_>,
        stage: Stage,
        profile: &Profile,
        per_profile: bool,
        hook: &dyn StageHook,
    ) -> Result<()> {
        let key = StampKey::new(self.package.clone(), stage, profile.stamp_key());
        let unit = key.unit();
        let kitchen = self.kitchen;
        let stamps = kitchen.stamps.as_ref();

        if let Some(record) = stamps.record(&key)? {
            if record.fingerprint != self.fingerprint {
                warn!(
                    "{}: {} was completed by a different revision of the recipe; keeping it (clean to rebuild)",
                    self.package, unit
                );
            }
            debug!("{}: {} already done", self.package, unit);
            self.complete(unit, profile, per_profile, false);
            return Ok(());
        }

        info!("{}: {}", self.package, unit);
        let result = {
            let mut active = ctx.activate(profile.clone());
            hook.run(&mut active)
        };
        result.map_err(|source| self.failure(stage, profile, source))?;

        stamps.mark(&key, &self.fingerprint)?;
        self.complete(unit, profile, per_profile, true);
        Ok(())
    }

    fn complete(&mut self, unit: String, profile: &Profile, per_profile: bool, ran: bool) {
        if per_profile {
            self.built_profiles.insert(profile.name().to_string());
        }
        self.last_completed = Some(unit.clone());
        if ran {
            self.executed.push(unit);
        } else {
            self.skipped.push(unit);
        }
    }

    fn failure(&self, stage: Stage, profile: &Profile, source: Error) -> Error {
        Error::StageFailed {
            package: self.package.to_string(),
            stage: stage.to_string(),
            profile: profile.stamp_key().map(str::to_string),
            last_completed: self.last_completed.clone(),
            source: Box::new(source),
        }
    }

    /// The terminal stage: split, aggregate dependencies and emit outputs
    fn package(&mut self) -> Result<(Vec<OutputPackage>, DependencyMap)> {
        let host = self.kitchen.registry().host().clone();
        let key = StampKey::new(self.package.clone(), Stage::Package, None);
        let unit = key.unit();
        let record_path = self.paths.outputs_record();

        if self.kitchen.stamps.done(&key)? {
            debug!("{}: {} already done", self.package, unit);
            self.complete(unit, &host, false, false);
            if !record_path.is_file() {
                return Err(Error::Stamp(format!(
                    "{} is stamped as packaged but {} is missing; clean it to rebuild",
                    self.package,
                    record_path.display()
                )));
            }
            let record: OutputsRecord = serde_json::from_slice(&fs::read(&record_path)?)?;
            return Ok((record.outputs, record.dependencies));
        }

        info!("{}: {}", self.package, unit);
        let (outputs, dependencies) = self
            .split_and_emit()
            .map_err(|source| self.failure(Stage::Package, &host, source))?;

        let record = OutputsRecord {
            outputs,
            dependencies,
        };
        fs::write(&record_path, serde_json::to_vec_pretty(&record)?)?;
        self.kitchen.stamps.mark(&key, &self.fingerprint)?;
        self.complete(unit, &host, false, true);

        Ok((record.outputs, record.dependencies))
    }

    fn split_and_emit(&self) -> Result<(Vec<OutputPackage>, DependencyMap)> {
        let specs = self.recipe.subpackage_specs(self.kitchen.registry())?;
        let tree = InstallTree::scan(&self.paths.destdir.host)?;
        debug!(
            "{}: {} installed file(s), built profiles: {:?}",
            self.package,
            tree.len(),
            self.built_profiles
        );

        let plan = split::plan_split(
            &self.recipe.package.name,
            &tree,
            &specs,
            &self.built_profiles,
        )?;
        let active: Vec<&SubpackageSpec> = specs
            .iter()
            .filter(|s| s.is_active(&self.built_profiles))
            .collect();
        let deps = dependencies::aggregate(self.recipe, &active);

        let mut outputs = plan.into_outputs(self.recipe, &specs, &deps);
        split::emit(&mut outputs, &self.paths.destdir.host, &self.paths.outputs)?;
        Ok((outputs, deps))
    }
}
