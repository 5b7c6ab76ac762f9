// src/recipe/format.rs

//! Recipe file format definitions
//!
//! Recipes are TOML files that describe how to build a package from source.
//! They are inert data: identity, dependencies, options, sources, optional
//! per-stage hook overrides and the subpackage layout. Everything imperative
//! happens in the kitchen.

use crate::error::{Error, Result};
use crate::hash;
use crate::profile::{Profile, ProfileRegistry};
use crate::recipe::kitchen::Stage;
use crate::recipe::options::{Options, RecipeOption};
use crate::recipe::subpackage::{SubpackageSection, SubpackageSpec};
use crate::stamp::PackageId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A complete recipe for building a package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Package metadata
    pub package: PackageSection,

    /// Build style, options and dependencies
    #[serde(default)]
    pub build: BuildSection,

    /// Cross targets to iterate (optional)
    #[serde(default)]
    pub cross: CrossSection,

    /// Source artifacts
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceEntry>,

    /// Per-stage hook overrides
    #[serde(default)]
    pub hooks: BTreeMap<Stage, HookSection>,

    /// Subpackages, in declaration order
    #[serde(default, rename = "subpackage")]
    pub subpackages: Vec<SubpackageSection>,

    /// Variables for substitution (optional)
    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    /// Directory the recipe was loaded from
    #[serde(skip)]
    pub recipe_dir: Option<PathBuf>,
}

impl Recipe {
    /// Identity used for stamps and locks
    pub fn package_id(&self) -> PackageId {
        PackageId::new(
            &self.package.name,
            &self.package.version,
            self.package.release,
        )
    }

    pub fn options(&self) -> &Options {
        &self.build.options
    }

    /// Substitute variables in a string
    ///
    /// Replaces `%(name)s` patterns with their values from:
    /// 1. Built-in variables (name, version, release)
    /// 2. Caller-provided variables (destdir, triplet, ...)
    /// 3. Custom variables from the [variables] section
    pub fn substitute(&self, template: &str, extra: &[(&str, &str)]) -> String {
        let mut result = template.to_string();

        result = result.replace("%(name)s", &self.package.name);
        result = result.replace("%(version)s", &self.package.version);
        result = result.replace("%(release)s", &self.package.release.to_string());

        for (key, value) in extra {
            result = result.replace(&format!("%({})s", key), value);
        }

        for (key, value) in &self.variables {
            result = result.replace(&format!("%({})s", key), value);
        }

        result
    }

    /// Profiles the per-profile stages iterate, in declaration order
    ///
    /// Empty when the recipe declares no targets or disables `cross`; the
    /// per-profile stages then run once under the host profile.
    pub fn cross_profiles(&self, registry: &ProfileRegistry) -> Result<Vec<Profile>> {
        if !self.options().enabled(RecipeOption::Cross) {
            return Ok(Vec::new());
        }

        let host_arch = registry.host().arch().to_string();
        let mut profiles: Vec<Profile> = Vec::new();
        for name in &self.cross.targets {
            let profile = registry.resolve(name)?;
            if self.cross.skip_host && profile.arch() == host_arch {
                continue;
            }
            if !profiles.iter().any(|p| p.name() == profile.name()) {
                profiles.push(profile.clone());
            }
        }
        Ok(profiles)
    }

    /// Resolve the declared subpackages into an explicit ordered list
    pub fn subpackage_specs(&self, registry: &ProfileRegistry) -> Result<Vec<SubpackageSpec>> {
        let targets = self.cross_profiles(registry)?;
        let mut specs = Vec::new();
        for section in &self.subpackages {
            specs.extend(section.resolve(self, registry, &targets)?);
        }
        Ok(specs)
    }

    /// Directory holding the recipe's patches
    pub fn patches_dir(&self) -> Option<PathBuf> {
        self.recipe_dir
            .as_ref()
            .map(|dir| dir.join("patches"))
            .filter(|dir| dir.is_dir())
    }

    /// Stable digest of the recipe contents
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| Error::ParseError(format!("Failed to serialize recipe: {}", e)))?;
        Ok(hash::sha256(&bytes))
    }

    /// Name of the package's working directory
    pub fn work_name(&self) -> String {
        format!("{}-{}", self.package.name, self.package.version)
    }
}

/// Package metadata section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSection {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Release counter (for rebuilds of same version)
    #[serde(default)]
    pub release: u32,

    /// Short description
    #[serde(default)]
    pub description: Option<String>,

    /// License expression
    #[serde(default)]
    pub license: Option<String>,

    /// Project homepage
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub maintainer: Option<String>,

    /// Extra capabilities the main package provides (e.g. `so:libtk8.6.so=0`)
    #[serde(default)]
    pub provides: Vec<String>,
}

/// Named default hook sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStyle {
    /// `configure && make && make install` with an out-of-tree build dir
    GnuConfigure,
    /// Plain makefile, built in a per-profile copy of the tree
    Makefile,
    /// Meson + ninja
    Meson,
    /// No build at all, only packaging
    Meta,
    /// Nothing unless the recipe supplies hooks
    #[default]
    #[serde(alias = "none")]
    Custom,
}

impl BuildStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GnuConfigure => "gnu_configure",
            Self::Makefile => "makefile",
            Self::Meson => "meson",
            Self::Meta => "meta",
            Self::Custom => "custom",
        }
    }
}

/// Build instructions and dependencies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSection {
    /// Default hook set
    #[serde(default)]
    pub style: BuildStyle,

    /// Option toggles (e.g. `["!check", "!lto"]`)
    #[serde(default)]
    pub options: Options,

    /// Subdirectory of the source tree the build runs in
    #[serde(default)]
    pub wrksrc: Option<String>,

    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Make program (default: make)
    #[serde(default)]
    pub make_cmd: Option<String>,

    #[serde(default)]
    pub make_args: Vec<String>,

    #[serde(default)]
    pub make_install_args: Vec<String>,

    #[serde(default)]
    pub make_check_args: Vec<String>,

    /// Dependencies needed on the build machine
    #[serde(default)]
    pub hostmakedepends: Vec<String>,

    /// Dependencies needed for the target being built
    #[serde(default)]
    pub makedepends: Vec<String>,

    /// Runtime dependencies of the main package
    #[serde(default)]
    pub depends: Vec<String>,

    /// Extra compiler/linker flags, by variable (CFLAGS, CXXFLAGS, LDFLAGS)
    #[serde(default)]
    pub tool_flags: BTreeMap<String, Vec<String>>,

    /// Environment variables for every build command
    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    /// Parallel jobs override
    #[serde(default)]
    pub jobs: Option<u32>,
}

impl BuildSection {
    pub fn make_cmd(&self) -> &str {
        self.make_cmd.as_deref().unwrap_or("make")
    }
}

/// Cross-target iteration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossSection {
    /// Profile names, iterated in this order
    #[serde(default)]
    pub targets: Vec<String>,

    /// Drop the build machine's own architecture from `targets`
    #[serde(default)]
    pub skip_host: bool,
}

/// A source artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Upstream URL (may use variables)
    pub url: String,

    /// Expected SHA-256, optionally `sha256:`-prefixed
    pub sha256: String,

    /// Local file name override
    #[serde(default)]
    pub filename: Option<String>,

    /// Unpack into the source tree (default: true)
    #[serde(default = "default_true")]
    pub extract: bool,

    /// Leading path components dropped when unpacking (default: 1)
    #[serde(default = "default_strip_components")]
    pub strip_components: u32,
}

impl SourceEntry {
    /// File name the artifact is cached under
    pub fn file_name(&self, recipe: &Recipe) -> String {
        if let Some(name) = &self.filename {
            return recipe.substitute(name, &[]);
        }
        let url = recipe.substitute(&self.url, &[]);
        url.rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("source")
            .to_string()
    }
}

fn default_true() -> bool {
    true
}

fn default_strip_components() -> u32 {
    1
}

/// Override of one stage's hook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookSection {
    /// Shell commands run in the sandbox, in order
    #[serde(default)]
    pub run: Vec<String>,

    /// Disable the stage entirely
    #[serde(default)]
    pub skip: bool,

    /// Force per-profile iteration on or off
    #[serde(default)]
    pub per_profile: Option<bool>,

    /// Symlinks to create in the destdir (post-install)
    #[serde(default)]
    pub links: Vec<LinkSpec>,

    /// License files to install from the source tree (post-install)
    #[serde(default)]
    pub licenses: Vec<String>,
}

/// A symlink created inside the destdir
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSpec {
    /// What the link points to
    pub target: String,
    /// Link path, relative to the destdir
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;

    const TK: &str = r#"
[package]
name = "tk"
version = "8.6.13"
description = "TK graphical user interface toolkit for Tcl"
license = "TCL"
provides = ["so:libtk8.6.so=0"]

[build]
style = "gnu_configure"
options = ["!check", "!cross"]
wrksrc = "unix"
configure_args = ["--enable-threads", "--with-tcl=/usr/lib"]
make_install_args = ["install-private-headers"]
hostmakedepends = ["pkgconf"]
makedepends = ["tcl-devel", "libx11-devel"]

[[source]]
url = "https://prdownloads.sourceforge.net/tcl/tk%(version)s-src.tar.gz"
sha256 = "2e65fa069a23365440a3c56c556b8673b5e32a283800d8d9b257e3f584ce0675"

[hooks.post_install]
links = [{ target = "wish8.6", link = "usr/bin/wish" }]
licenses = ["license.terms"]

[[subpackage]]
name = "tk-devel"
paths = ["usr/lib/*.a", "usr/include", "usr/lib/pkgconfig"]
"#;

    #[test]
    fn test_parse_full_recipe() {
        let recipe = parse_recipe(TK).unwrap();
        assert_eq!(recipe.package.release, 0);
        assert_eq!(recipe.build.style, BuildStyle::GnuConfigure);
        assert!(!recipe.options().enabled(RecipeOption::Check));
        assert_eq!(recipe.build.make_cmd(), "make");
        assert_eq!(recipe.sources.len(), 1);
        assert_eq!(
            recipe.sources[0].file_name(&recipe),
            "tk8.6.13-src.tar.gz"
        );
        assert_eq!(recipe.hooks[&Stage::PostInstall].links.len(), 1);
        assert_eq!(recipe.subpackages[0].name, "tk-devel");
        assert_eq!(recipe.package_id().to_string(), "tk-8.6.13-r0");
    }

    #[test]
    fn test_substitute() {
        let mut recipe = parse_recipe(TK).unwrap();
        recipe
            .variables
            .insert("abiver".to_string(), "8.6".to_string());
        assert_eq!(
            recipe.substitute("%(name)s-%(version)s-r%(release)s", &[]),
            "tk-8.6.13-r0"
        );
        assert_eq!(
            recipe.substitute("%(destdir)s/usr/lib/tk%(abiver)s", &[("destdir", "/destdir")]),
            "/destdir/usr/lib/tk8.6"
        );
    }

    #[test]
    fn test_cross_disabled_by_option() {
        let mut recipe = parse_recipe(TK).unwrap();
        recipe.cross.targets = vec!["aarch64".to_string()];
        let registry = ProfileRegistry::new();
        assert!(recipe.cross_profiles(&registry).unwrap().is_empty());

        recipe.build.options.set(RecipeOption::Cross, true);
        let profiles = recipe.cross_profiles(&registry).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name(), "aarch64");
    }

    #[test]
    fn test_cross_targets_resolve_and_dedupe() {
        let mut recipe = parse_recipe(TK).unwrap();
        recipe.build.options.set(RecipeOption::Cross, true);
        recipe.cross.targets = vec![
            "arm64".to_string(),
            "x86_64".to_string(),
            "aarch64".to_string(),
        ];
        let registry = ProfileRegistry::new();
        let names: Vec<String> = recipe
            .cross_profiles(&registry)
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["aarch64", "x86_64"]);

        recipe.cross.targets.push("vax".to_string());
        assert!(matches!(
            recipe.cross_profiles(&registry),
            Err(Error::UnknownProfile(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let recipe = parse_recipe(TK).unwrap();
        let mut bumped = recipe.clone();
        bumped.package.release = 1;
        assert_eq!(recipe.fingerprint().unwrap(), recipe.fingerprint().unwrap());
        assert_ne!(recipe.fingerprint().unwrap(), bumped.fingerprint().unwrap());
    }
}
