// src/recipe/kitchen/style.rs

//! Default hooks: source extraction, patching and the build styles

use crate::error::{Error, Result};
use crate::recipe::format::BuildStyle;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info};

use super::context::BuildContext;
use super::hooks::StageHook;
use super::sources::SourceProvider;
use super::stage::Stage;

/// Unpack every declared source into a fresh source tree
pub struct ExtractSources {
    provider: Arc<dyn SourceProvider>,
}

impl ExtractSources {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self { provider }
    }
}

impl StageHook for ExtractSources {
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let recipe = ctx.recipe();
        let paths = ctx.paths();
        let srcdir = ctx.srcdir().clone();
        ctx.reset_dir(&srcdir)?;

        for source in &recipe.sources {
            let host_path = self.provider.provide(recipe, source)?;
            let rel = host_path.strip_prefix(&paths.sources.host).map_err(|_| {
                Error::Sandbox(format!(
                    "Source {} is outside the source cache {}",
                    host_path.display(),
                    paths.sources.host.display()
                ))
            })?;
            let file = paths.sources.sandbox.join(rel).display().to_string();
            let target = srcdir.sandbox.display().to_string();

            let argv = if source.extract {
                info!("Extracting {}", rel.display());
                let mut argv = vec!["tar".to_string(), "-xf".to_string(), file, "-C".to_string(), target];
                if source.strip_components > 0 {
                    argv.push(format!("--strip-components={}", source.strip_components));
                }
                argv
            } else {
                vec!["cp".to_string(), file, target]
            };
            ctx.run(argv, &srcdir)?;
        }
        fs::write(paths.pristine_marker(), b"")?;
        Ok(())
    }
}

/// Apply `*.patch` and `*.diff` files from the recipe's `patches/` directory
///
/// Patches only ever go onto a freshly extracted tree. If an earlier run
/// got past the first patch, the sources are extracted again first.
pub struct ApplyPatches {
    extract: ExtractSources,
}

impl ApplyPatches {
    pub fn new(provider: Arc<dyn SourceProvider>) -> Self {
        Self {
            extract: ExtractSources::new(provider),
        }
    }
}

impl StageHook for ApplyPatches {
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let Some(patches) = ctx.paths().patches.as_ref() else {
            debug!("No patches directory");
            return Ok(());
        };

        let mut names: Vec<String> = fs::read_dir(&patches.host)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".patch") || name.ends_with(".diff"))
            .collect();
        names.sort();
        if names.is_empty() {
            return Ok(());
        }

        let marker = ctx.paths().pristine_marker();
        if !marker.is_file() {
            info!("Source tree is not pristine, extracting again");
            self.extract.run(ctx)?;
        }
        fs::remove_file(&marker)?;

        let srcdir = ctx.srcdir().clone();
        for name in names {
            info!("Applying patch: {}", name);
            let file = patches.sandbox.join(&name).display().to_string();
            ctx.run(
                vec!["patch".to_string(), "-p1".to_string(), "-i".to_string(), file],
                &srcdir,
            )?;
        }
        Ok(())
    }
}

/// Build style default for one stage
#[derive(Debug, Clone, Copy)]
pub struct StyleHook {
    style: BuildStyle,
    stage: Stage,
}

impl StyleHook {
    pub fn new(style: BuildStyle, stage: Stage) -> Self {
        Self { style, stage }
    }

    /// Whether `style` has a default for `stage`
    pub fn provides(style: BuildStyle, stage: Stage) -> bool {
        match style {
            BuildStyle::GnuConfigure | BuildStyle::Meson | BuildStyle::Makefile => matches!(
                stage,
                Stage::Configure | Stage::Build | Stage::Check | Stage::Install
            ),
            BuildStyle::Meta | BuildStyle::Custom => false,
        }
    }

    fn gnu_configure(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let build = &ctx.recipe().build;
        let builddir = ctx.build_dir();
        let make = build.make_cmd().to_string();

        match self.stage {
            Stage::Configure => {
                ctx.reset_dir(&builddir)?;
                let mut argv = vec![
                    format!("{}/configure", ctx.wrksrc().sandbox.display()),
                    "--prefix=/usr".to_string(),
                ];
                if ctx.profile().is_cross() {
                    argv.push(format!("--host={}", ctx.profile().triplet()));
                }
                argv.extend(build.configure_args.iter().map(|a| ctx.substitute(a)));
                ctx.run(argv, &builddir)?;
            }
            Stage::Build => {
                let mut argv = vec![make, format!("-j{}", ctx.jobs())];
                argv.extend(build.make_args.iter().map(|a| ctx.substitute(a)));
                ctx.run(argv, &builddir)?;
            }
            Stage::Check => {
                let mut argv = vec![make, "check".to_string()];
                argv.extend(build.make_check_args.iter().map(|a| ctx.substitute(a)));
                ctx.run(argv, &builddir)?;
            }
            Stage::Install => {
                let install = ctx.install_dir();
                ctx.reset_dir(&install)?;
                let mut argv = vec![
                    make,
                    format!("DESTDIR={}", install.sandbox.display()),
                    "install".to_string(),
                ];
                argv.extend(build.make_install_args.iter().map(|a| ctx.substitute(a)));
                ctx.run(argv, &builddir)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn makefile(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let build = &ctx.recipe().build;
        let builddir = ctx.build_dir();
        let make = build.make_cmd().to_string();

        let mut argv = match self.stage {
            Stage::Configure => {
                // In-tree builds get a private copy of the tree per profile
                ctx.reset_dir(&builddir)?;
                let script = format!(
                    "tar --anchored --exclude=./build --exclude='./build-*' -cf - . | tar -xf - -C {}",
                    builddir.sandbox.display()
                );
                ctx.shell(&script, &ctx.wrksrc())?;
                return Ok(());
            }
            Stage::Build => vec![make, format!("-j{}", ctx.jobs()), "PREFIX=/usr".to_string()],
            Stage::Check => vec![make, "PREFIX=/usr".to_string(), "check".to_string()],
            Stage::Install => {
                let install = ctx.install_dir();
                ctx.reset_dir(&install)?;
                vec![
                    make,
                    "PREFIX=/usr".to_string(),
                    format!("DESTDIR={}", install.sandbox.display()),
                    "install".to_string(),
                ]
            }
            _ => return Ok(()),
        };
        let extra = match self.stage {
            Stage::Build => &build.make_args,
            Stage::Check => &build.make_check_args,
            _ => &build.make_install_args,
        };
        argv.extend(extra.iter().map(|a| ctx.substitute(a)));
        ctx.run(argv, &builddir)?;
        Ok(())
    }

    fn meson(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let build = &ctx.recipe().build;
        let wrksrc = ctx.wrksrc();
        let builddir = ctx.build_dir();
        let builddir_arg = builddir.sandbox.display().to_string();

        let argv = match self.stage {
            Stage::Configure => {
                ctx.reset_dir(&builddir)?;
                let mut argv = vec![
                    "meson".to_string(),
                    "setup".to_string(),
                    "--prefix=/usr".to_string(),
                    "--buildtype=plain".to_string(),
                ];
                argv.extend(build.configure_args.iter().map(|a| ctx.substitute(a)));
                argv.push(builddir_arg);
                argv
            }
            Stage::Build => vec![
                "meson".to_string(),
                "compile".to_string(),
                "-C".to_string(),
                builddir_arg,
                "-j".to_string(),
                ctx.jobs().to_string(),
            ],
            Stage::Check => vec![
                "meson".to_string(),
                "test".to_string(),
                "-C".to_string(),
                builddir_arg,
            ],
            Stage::Install => {
                let install = ctx.install_dir();
                ctx.reset_dir(&install)?;
                vec![
                    "meson".to_string(),
                    "install".to_string(),
                    "-C".to_string(),
                    builddir_arg,
                    "--destdir".to_string(),
                    install.sandbox.display().to_string(),
                ]
            }
            _ => return Ok(()),
        };
        ctx.run(argv, &wrksrc)?;
        Ok(())
    }
}

impl StageHook for StyleHook {
    fn run(&self, ctx: &mut BuildContext<'_>) -> Result<()> {
        match self.style {
            BuildStyle::GnuConfigure => self.gnu_configure(ctx),
            BuildStyle::Makefile => self.makefile(ctx),
            BuildStyle::Meson => self.meson(ctx),
            BuildStyle::Meta | BuildStyle::Custom => Ok(()),
        }
    }
}
