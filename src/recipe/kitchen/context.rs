// src/recipe/kitchen/context.rs

//! Build context handed to stage hooks
//!
//! The context owns the profile stack. Everything that depends on the
//! current profile (build directory, installation root, environment) is
//! derived from the stack on each call, so a hook always sees the profile
//! the engine activated for it.

use crate::container::{BindMount, ExecOutcome, Executor, PathMapping, SandboxInvocation};
use crate::error::{Error, Result};
use crate::profile::{ActiveProfile, HasProfileStack, Profile, ProfileStack};
use crate::recipe::format::Recipe;
use crate::recipe::options::RecipeOption;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use super::KitchenConfig;

/// Sandbox view of the package source trees
const SANDBOX_BUILDDIR: &str = "/builddir";
const SANDBOX_DESTDIR: &str = "/destdir";
const SANDBOX_SOURCES: &str = "/sources";
const SANDBOX_PATCHES: &str = "/patches";

/// Variables whose profile overlay is appended instead of replacing
const FLAG_VARS: &[&str] = &["CFLAGS", "CXXFLAGS", "CPPFLAGS", "LDFLAGS"];

/// Timestamp used for reproducible builds unless the recipe sets one
const DEFAULT_SOURCE_DATE_EPOCH: &str = "0";

/// Working locations of one package, in host and sandbox views
///
/// ```text
/// <build_root>/<name>-<version>/
///   src/         extracted sources      (/builddir/<name>-<version>)
///   destdir/     shared install tree    (/destdir)
///   src.pristine present until the first patch is applied
///   build.log
/// <output_dir>/<name>-<version>-r<release>/
///   <output>/    one per emitted package
///   outputs.json
/// ```
#[derive(Debug, Clone)]
pub struct BuildPaths {
    /// Package working directory (host only)
    pub workdir: PathBuf,
    pub srcdir: PathMapping,
    pub destdir: PathMapping,
    /// Source cache, mounted read-only
    pub sources: PathMapping,
    /// Recipe patches, mounted read-only
    pub patches: Option<PathMapping>,
    pub log: PathBuf,
    /// Where the package stage emits outputs
    pub outputs: PathBuf,
}

impl BuildPaths {
    pub fn new(config: &KitchenConfig, recipe: &Recipe) -> Self {
        let work_name = recipe.work_name();
        let workdir = config.build_root.join(&work_name);

        Self {
            srcdir: PathMapping::new(
                workdir.join("src"),
                PathBuf::from(SANDBOX_BUILDDIR).join(&work_name),
            ),
            destdir: PathMapping::new(workdir.join("destdir"), SANDBOX_DESTDIR),
            sources: PathMapping::new(&config.source_cache, SANDBOX_SOURCES),
            patches: recipe
                .patches_dir()
                .map(|dir| PathMapping::new(dir, SANDBOX_PATCHES)),
            log: workdir.join("build.log"),
            outputs: config.output_dir.join(recipe.package_id().to_string()),
            workdir,
        }
    }

    /// Create the directories the sandbox mounts
    pub fn prepare(&self) -> Result<()> {
        for dir in [&self.srcdir.host, &self.destdir.host, &self.sources.host] {
            fs::create_dir_all(dir).map_err(|e| {
                Error::IoError(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Package-specific sandbox mounts
    pub fn mounts(&self) -> Vec<BindMount> {
        let mut mounts = vec![
            BindMount::writable(&self.srcdir.host, &self.srcdir.sandbox),
            BindMount::writable(&self.destdir.host, &self.destdir.sandbox),
            BindMount::readonly(&self.sources.host, &self.sources.sandbox),
        ];
        if let Some(patches) = &self.patches {
            mounts.push(BindMount::readonly(&patches.host, &patches.sandbox));
        }
        mounts
    }

    /// Present while the source tree is exactly as extracted
    pub fn pristine_marker(&self) -> PathBuf {
        self.workdir.join("src.pristine")
    }

    /// Record of the outputs the package stage emitted
    pub fn outputs_record(&self) -> PathBuf {
        self.outputs.join("outputs.json")
    }
}

/// State shared by every hook of one cook
pub struct BuildContext<'a> {
    recipe: &'a Recipe,
    executor: &'a dyn Executor,
    paths: &'a BuildPaths,
    profiles: ProfileStack,
    jobs: u32,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        recipe: &'a Recipe,
        executor: &'a dyn Executor,
        paths: &'a BuildPaths,
        host: Profile,
        jobs: u32,
    ) -> Self {
        Self {
            recipe,
            executor,
            paths,
            profiles: ProfileStack::new(host),
            jobs,
        }
    }

    pub fn recipe(&self) -> &'a Recipe {
        self.recipe
    }

    pub fn paths(&self) -> &'a BuildPaths {
        self.paths
    }

    /// Make `profile` current until the guard drops
    pub fn activate(&mut self, profile: Profile) -> ActiveProfile<'_, Self> {
        ActiveProfile::new(self, profile)
    }

    /// The current profile
    pub fn profile(&self) -> &Profile {
        self.profiles.current()
    }

    /// Parallel jobs, 1 when the recipe disables `parallel`
    pub fn jobs(&self) -> u32 {
        if self.recipe.options().enabled(RecipeOption::Parallel) {
            self.jobs.max(1)
        } else {
            1
        }
    }

    pub fn srcdir(&self) -> &PathMapping {
        &self.paths.srcdir
    }

    /// Source tree subdirectory the build runs in
    pub fn wrksrc(&self) -> PathMapping {
        match &self.recipe.build.wrksrc {
            Some(sub) => self.paths.srcdir.join(self.recipe.substitute(sub, &[])),
            None => self.paths.srcdir.clone(),
        }
    }

    /// Build directory of the current profile
    pub fn build_dir(&self) -> PathMapping {
        let wrksrc = self.wrksrc();
        let profile = self.profile();
        PathMapping::new(
            profile.build_dir(&wrksrc.host),
            profile.build_dir(&wrksrc.sandbox),
        )
    }

    pub fn destdir(&self) -> &PathMapping {
        &self.paths.destdir
    }

    /// Installation root of the current profile
    pub fn install_dir(&self) -> PathMapping {
        let destdir = &self.paths.destdir;
        let profile = self.profile();
        PathMapping::new(
            profile.install_dir(&destdir.host),
            profile.install_dir(&destdir.sandbox),
        )
    }

    /// Full environment for a command under the current profile
    pub fn env(&self) -> BTreeMap<String, String> {
        let options = self.recipe.options();
        let mut env = BTreeMap::new();

        env.insert("HOME".to_string(), "/tmp".to_string());
        env.insert(
            "PATH".to_string(),
            "/usr/bin:/usr/sbin:/bin:/sbin".to_string(),
        );
        env.insert("LC_ALL".to_string(), "C.UTF-8".to_string());
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.jobs()));

        let mut flags: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        if options.enabled(RecipeOption::Lto) {
            for var in ["CFLAGS", "CXXFLAGS", "LDFLAGS"] {
                flags.entry(var).or_default().push("-flto=thin".to_string());
            }
        }
        if options.enabled(RecipeOption::Reproducible) {
            let map = format!("-ffile-prefix-map={}=.", self.paths.srcdir.sandbox.display());
            for var in ["CFLAGS", "CXXFLAGS"] {
                flags.entry(var).or_default().push(map.clone());
            }
            env.insert(
                "SOURCE_DATE_EPOCH".to_string(),
                DEFAULT_SOURCE_DATE_EPOCH.to_string(),
            );
        }
        for (var, values) in &self.recipe.build.tool_flags {
            flags
                .entry(var.as_str())
                .or_default()
                .extend(values.iter().map(|v| self.recipe.substitute(v, &[])));
        }
        for (var, values) in flags {
            env.insert(var.to_string(), values.join(" "));
        }

        for (key, value) in &self.recipe.build.environment {
            env.insert(key.clone(), self.recipe.substitute(value, &[]));
        }

        for (key, value) in self.profile().env() {
            match env.get_mut(key) {
                Some(existing) if FLAG_VARS.contains(&key.as_str()) => {
                    existing.push(' ');
                    existing.push_str(value);
                }
                _ => {
                    env.insert(key.clone(), value.clone());
                }
            }
        }

        env
    }

    /// Substitute recipe and build variables into a command template
    pub fn substitute(&self, template: &str) -> String {
        let wrksrc = self.wrksrc().sandbox.display().to_string();
        let builddir = self.build_dir().sandbox.display().to_string();
        let destdir = self.paths.destdir.sandbox.display().to_string();
        let installdir = self.install_dir().sandbox.display().to_string();
        let jobs = self.jobs().to_string();
        let profile = self.profile();

        self.recipe.substitute(
            template,
            &[
                ("wrksrc", &wrksrc),
                ("builddir", &builddir),
                ("destdir", &destdir),
                ("installdir", &installdir),
                ("arch", profile.arch()),
                ("triplet", profile.triplet()),
                ("jobs", &jobs),
            ],
        )
    }

    /// Run `argv` in the sandbox with `workdir` as working directory
    pub fn run(&self, argv: Vec<String>, workdir: &PathMapping) -> Result<ExecOutcome> {
        let invocation = SandboxInvocation::new(argv, workdir.clone())
            .with_env(self.env())
            .with_mounts(self.paths.mounts())
            .with_log(&self.paths.log);

        debug!(
            "[{}] {} (in {})",
            self.profile().name(),
            invocation.command_line(),
            workdir.sandbox.display()
        );
        let outcome = self.executor.execute(&invocation)?;
        if !outcome.success() {
            return Err(Error::CommandFailed {
                command: invocation.command_line(),
                status: outcome.termination.to_string(),
            });
        }
        Ok(outcome)
    }

    /// Run a shell script in the sandbox
    pub fn shell(&self, script: &str, workdir: &PathMapping) -> Result<ExecOutcome> {
        self.run(
            vec!["/bin/sh".to_string(), "-ec".to_string(), script.to_string()],
            workdir,
        )
    }

    /// Recreate a working directory empty
    ///
    /// Runs on the host; `dir` must lie inside the package's source tree or
    /// destdir.
    pub fn reset_dir(&self, dir: &PathMapping) -> Result<()> {
        let inside = [&self.paths.srcdir.host, &self.paths.destdir.host]
            .iter()
            .any(|root| dir.host.starts_with(root));
        if !inside {
            return Err(Error::Sandbox(format!(
                "Refusing to reset {} outside the package tree",
                dir.host.display()
            )));
        }

        if dir.host.exists() {
            fs::remove_dir_all(&dir.host).map_err(|e| {
                Error::IoError(format!("Failed to remove {}: {}", dir.host.display(), e))
            })?;
        }
        fs::create_dir_all(&dir.host).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", dir.host.display(), e))
        })?;
        debug!("Reset {}", dir.host.display());
        Ok(())
    }
}

impl HasProfileStack for BuildContext<'_> {
    fn profile_stack(&mut self) -> &mut ProfileStack {
        &mut self.profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Arch, ProfileRegistry};
    use crate::recipe::parse_recipe;
    use std::path::Path;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture(Mutex<Vec<SandboxInvocation>>);

    impl Executor for Capture {
        fn execute(&self, invocation: &SandboxInvocation) -> Result<ExecOutcome> {
            self.0.lock().unwrap().push(invocation.clone());
            Ok(ExecOutcome::ok())
        }
    }

    fn recipe() -> Recipe {
        parse_recipe(
            r#"
[package]
name = "tk"
version = "8.6.13"

[build]
options = ["lto", "!reproducible"]
wrksrc = "unix"
tool_flags = { CFLAGS = ["-O2"] }
environment = { TCL_LIBRARY = "/usr/lib/tcl%(version)s" }
"#,
        )
        .unwrap()
    }

    fn paths(recipe: &Recipe) -> BuildPaths {
        BuildPaths::new(&KitchenConfig::under(Path::new("/var/kiln")), recipe)
    }

    #[test]
    fn test_build_paths_layout() {
        let recipe = recipe();
        let paths = paths(&recipe);
        assert_eq!(paths.srcdir.host, PathBuf::from("/var/kiln/build/tk-8.6.13/src"));
        assert_eq!(paths.srcdir.sandbox, PathBuf::from("/builddir/tk-8.6.13"));
        assert_eq!(paths.destdir.sandbox, PathBuf::from("/destdir"));
        assert_eq!(
            paths.outputs_record(),
            PathBuf::from("/var/kiln/packages/tk-8.6.13-r0/outputs.json")
        );
        assert!(paths.patches.is_none());
        assert_eq!(paths.mounts().len(), 3);
    }

    #[test]
    fn test_directories_follow_active_profile() {
        let recipe = recipe();
        let paths = paths(&recipe);
        let executor = Capture::default();
        let mut ctx = BuildContext::new(&recipe, &executor, &paths, Profile::host(), 4);

        assert_eq!(
            ctx.build_dir().sandbox,
            PathBuf::from("/builddir/tk-8.6.13/unix/build")
        );
        assert_eq!(ctx.install_dir().sandbox, PathBuf::from("/destdir"));

        {
            let active = ctx.activate(Profile::target(Arch::Aarch64));
            assert_eq!(
                active.build_dir().sandbox,
                PathBuf::from("/builddir/tk-8.6.13/unix/build-aarch64")
            );
            assert_eq!(
                active.install_dir().sandbox,
                PathBuf::from("/destdir/usr/aarch64-linux-musl")
            );
            assert_eq!(
                active.substitute("--host=%(triplet)s -j%(jobs)s"),
                "--host=aarch64-linux-musl -j4"
            );
        }

        assert_eq!(ctx.profile().name(), "host");
    }

    #[test]
    fn test_env_layering() {
        let recipe = recipe();
        let paths = paths(&recipe);
        let executor = Capture::default();
        let mut registry = ProfileRegistry::new();
        registry
            .override_env("riscv64", [("CFLAGS".to_string(), "-march=rv64gc".to_string())])
            .unwrap();
        let target = registry.resolve("riscv64").unwrap().clone();

        let mut ctx = BuildContext::new(&recipe, &executor, &paths, Profile::host(), 8);
        let active = ctx.activate(target);
        let env = active.env();

        assert_eq!(env["MAKEFLAGS"], "-j8");
        assert_eq!(env["CFLAGS"], "-flto=thin -O2 -march=rv64gc");
        assert_eq!(env["LDFLAGS"], "-flto=thin");
        assert_eq!(env["TCL_LIBRARY"], "/usr/lib/tcl8.6.13");
        assert_eq!(env["CC"], "clang -target riscv64-linux-musl");
        assert!(!env.contains_key("SOURCE_DATE_EPOCH"));
    }

    #[test]
    fn test_run_reports_failure() {
        struct Fails;
        impl Executor for Fails {
            fn execute(&self, _: &SandboxInvocation) -> Result<ExecOutcome> {
                Ok(ExecOutcome {
                    termination: crate::container::Termination::Exited(2),
                    stdout: String::new(),
                    stderr: "no rule to make target".to_string(),
                })
            }
        }

        let recipe = recipe();
        let paths = paths(&recipe);
        let ctx = BuildContext::new(&recipe, &Fails, &paths, Profile::host(), 1);
        let err = ctx
            .run(vec!["make".to_string()], &ctx.wrksrc())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CommandFailed { ref status, .. } if status == "exit status 2"
        ));
    }

    #[test]
    fn test_run_passes_mounts_and_env() {
        let recipe = recipe();
        let paths = paths(&recipe);
        let executor = Capture::default();
        let ctx = BuildContext::new(&recipe, &executor, &paths, Profile::host(), 2);
        ctx.shell("make install", ctx.destdir()).unwrap();

        let calls = executor.0.lock().unwrap();
        assert_eq!(calls[0].argv, vec!["/bin/sh", "-ec", "make install"]);
        assert_eq!(calls[0].workdir.sandbox, PathBuf::from("/destdir"));
        assert_eq!(calls[0].env["LC_ALL"], "C.UTF-8");
        assert_eq!(calls[0].log.as_deref(), Some(paths.log.as_path()));
        assert_eq!(calls[0].mounts.len(), 3);
    }

    #[test]
    fn test_reset_dir_stays_inside_package() {
        let temp_dir = tempfile::tempdir().unwrap();
        let recipe = recipe();
        let paths = BuildPaths::new(&KitchenConfig::under(temp_dir.path()), &recipe);
        paths.prepare().unwrap();
        let executor = Capture::default();
        let ctx = BuildContext::new(&recipe, &executor, &paths, Profile::host(), 1);

        let build = ctx.build_dir();
        fs::create_dir_all(&build.host).unwrap();
        fs::write(build.host.join("config.status"), b"stale").unwrap();
        ctx.reset_dir(&build).unwrap();
        assert!(build.host.is_dir());
        assert!(!build.host.join("config.status").exists());

        let outside = PathMapping::new(temp_dir.path().join("elsewhere"), "/elsewhere");
        assert!(ctx.reset_dir(&outside).is_err());
    }
}
