// src/recipe/kitchen/hooks.rs

//! Stage hooks
//!
//! Every lifecycle stage has exactly one hook slot. A slot is filled, in
//! priority order, by a hook the caller installs, by a `[hooks.<stage>]`
//! override in the recipe, or by the build style's default. An empty slot
//! makes the stage a no-op that leaves no stamp.
//!
//! The package stage never has a hook; the engine owns it.

use crate::error::Result;
use crate::recipe::format::{LinkSpec, Recipe};
use crate::recipe::options::RecipeOption;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::context::BuildContext;
use super::sources::SourceProvider;
use super::stage::Stage;
use super::style::{ApplyPatches, ExtractSources, StyleHook};

/// The work of one stage
pub trait StageHook: Send + Sync {
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()>;
}

impl<F> StageHook for F
where
    F: Fn(&mut BuildContext<'_>) -> Result<()> + Send + Sync,
{
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// A filled hook slot
#[derive(Clone)]
pub struct HookSlot {
    pub hook: Arc<dyn StageHook>,
    /// Per-profile override; `None` uses the stage default
    pub per_profile: Option<bool>,
}

impl HookSlot {
    /// Whether `stage` iterates the cross targets with this slot
    pub fn per_profile(&self, stage: Stage) -> bool {
        self.per_profile
            .unwrap_or_else(|| stage.per_profile_by_default())
    }
}

impl std::fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSlot")
            .field("per_profile", &self.per_profile)
            .finish_non_exhaustive()
    }
}

/// One optional hook per stage
#[derive(Clone, Default, Debug)]
pub struct HookSet {
    slots: BTreeMap<Stage, HookSlot>,
}

impl HookSet {
    /// A set with every slot empty
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hooks for `recipe`: style defaults, then the recipe's overrides
    pub fn for_recipe(recipe: &Recipe, sources: Arc<dyn SourceProvider>) -> Self {
        let mut hooks = Self::empty();
        hooks.set(Stage::Extract, ExtractSources::new(sources.clone()));
        hooks.set(Stage::Patch, ApplyPatches::new(sources));

        let style = recipe.build.style;
        for &stage in Stage::all() {
            if StyleHook::provides(style, stage) {
                hooks.set(stage, StyleHook::new(style, stage));
            }
        }

        for (&stage, section) in &recipe.hooks {
            if stage == Stage::Package {
                continue;
            }
            if section.skip {
                debug!("{}: stage {} disabled by recipe", recipe.package.name, stage);
                hooks.clear(stage);
                continue;
            }
            if !section.run.is_empty() || !section.links.is_empty() || !section.licenses.is_empty()
            {
                hooks.set(
                    stage,
                    CommandHook {
                        commands: section.run.clone(),
                        links: section.links.clone(),
                        licenses: section.licenses.clone(),
                    },
                );
            }
            if let Some(per_profile) = section.per_profile {
                hooks.set_per_profile(stage, per_profile);
            }
        }

        if !recipe.options().enabled(RecipeOption::Check) {
            hooks.clear(Stage::Check);
        }
        hooks
    }

    /// Fill a slot, replacing whatever was there
    pub fn set(&mut self, stage: Stage, hook: impl StageHook + 'static) {
        self.slots.insert(
            stage,
            HookSlot {
                hook: Arc::new(hook),
                per_profile: None,
            },
        );
    }

    /// Force per-profile iteration on or off for a filled slot
    pub fn set_per_profile(&mut self, stage: Stage, per_profile: bool) {
        if let Some(slot) = self.slots.get_mut(&stage) {
            slot.per_profile = Some(per_profile);
        }
    }

    pub fn clear(&mut self, stage: Stage) {
        self.slots.remove(&stage);
    }

    pub fn get(&self, stage: Stage) -> Option<&HookSlot> {
        self.slots.get(&stage)
    }

    pub fn is_set(&self, stage: Stage) -> bool {
        self.slots.contains_key(&stage)
    }
}

/// Recipe-supplied shell commands and install helpers
#[derive(Debug, Clone, Default)]
pub struct CommandHook {
    /// Run with `sh -e` in the source tree, after variable substitution
    pub commands: Vec<String>,
    pub links: Vec<LinkSpec>,
    /// Files in the source tree installed under `usr/share/licenses/<name>/`
    pub licenses: Vec<String>,
}

impl StageHook for CommandHook {
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let wrksrc = ctx.wrksrc();
        for command in &self.commands {
            ctx.shell(&ctx.substitute(command), &wrksrc)?;
        }

        let destdir = ctx.destdir().clone();
        for link in &self.links {
            let path = destdir.sandbox.join(ctx.substitute(&link.link));
            if let Some(parent) = path.parent() {
                ctx.run(
                    vec!["mkdir".into(), "-p".into(), parent.display().to_string()],
                    &destdir,
                )?;
            }
            ctx.run(
                vec![
                    "ln".into(),
                    "-sfn".into(),
                    ctx.substitute(&link.target),
                    path.display().to_string(),
                ],
                &destdir,
            )?;
        }

        let license_dir = destdir
            .sandbox
            .join("usr/share/licenses")
            .join(&ctx.recipe().package.name);
        for license in &self.licenses {
            let file = ctx.substitute(license);
            let name = Path::new(&file)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            ctx.run(
                vec![
                    "install".into(),
                    "-Dm644".into(),
                    file,
                    license_dir.join(name).display().to_string(),
                ],
                &wrksrc,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;
    use crate::recipe::kitchen::SourceCache;

    fn hooks_for(toml: &str) -> HookSet {
        let recipe = parse_recipe(toml).unwrap();
        HookSet::for_recipe(&recipe, Arc::new(SourceCache::new("/nonexistent")))
    }

    #[test]
    fn test_style_defaults() {
        let hooks = hooks_for(
            "[package]\nname = \"a\"\nversion = \"1\"\n[build]\nstyle = \"gnu_configure\"\n",
        );
        for stage in [
            Stage::Extract,
            Stage::Patch,
            Stage::Configure,
            Stage::Build,
            Stage::Check,
            Stage::Install,
        ] {
            assert!(hooks.is_set(stage), "{} should have a hook", stage);
        }
        assert!(!hooks.is_set(Stage::PostInstall));
        assert!(!hooks.is_set(Stage::Package));
    }

    #[test]
    fn test_makefile_configures_its_own_tree() {
        let hooks =
            hooks_for("[package]\nname = \"a\"\nversion = \"1\"\n[build]\nstyle = \"makefile\"\n");
        assert!(hooks.is_set(Stage::Configure));
        assert!(hooks.get(Stage::Configure).unwrap().per_profile(Stage::Configure));
        assert!(hooks.is_set(Stage::Build));
    }

    #[test]
    fn test_overrides() {
        let hooks = hooks_for(
            r#"
[package]
name = "a"
version = "1"

[build]
style = "gnu_configure"
options = ["!check"]

[hooks.configure]
skip = true

[hooks.install]
run = ["make install-strip DESTDIR=%(installdir)s"]
per_profile = false

[hooks.post_install]
licenses = ["COPYING"]
"#,
        );
        assert!(!hooks.is_set(Stage::Configure));
        assert!(!hooks.is_set(Stage::Check));
        assert!(!hooks.get(Stage::Install).unwrap().per_profile(Stage::Install));
        assert!(hooks.get(Stage::Build).unwrap().per_profile(Stage::Build));
        assert!(hooks.is_set(Stage::PostInstall));
        assert!(!hooks.get(Stage::PostInstall).unwrap().per_profile(Stage::PostInstall));
    }

    fn noop(_ctx: &mut BuildContext<'_>) -> Result<()> {
        Ok(())
    }

    #[test]
    fn test_function_hooks() {
        let mut hooks = HookSet::empty();
        hooks.set(Stage::Build, noop);
        assert!(hooks.is_set(Stage::Build));
        hooks.clear(Stage::Build);
        assert!(hooks.get(Stage::Build).is_none());
    }
}
