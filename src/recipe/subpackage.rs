// src/recipe/subpackage.rs

//! Subpackage declarations
//!
//! A recipe lists its subpackages explicitly and in order. A declaration
//! marked `for_each_target` is a template: it expands into one subpackage per
//! cross target, each active only if that target was actually built.
//!
//! ```toml
//! [[subpackage]]
//! name = "musl-cross-%(arch)s-static"
//! for_each_target = true
//! paths = ["usr/%(triplet)s/usr/lib/libc.a"]
//! pull = true
//! ```

use crate::error::{Error, Result};
use crate::profile::{Profile, ProfileRegistry};
use crate::recipe::format::Recipe;
use crate::recipe::options::Options;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A `[[subpackage]]` table as written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubpackageSection {
    /// Output package name (may use variables)
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Globs relative to the destdir; a matched directory claims its subtree
    #[serde(default)]
    pub paths: Vec<String>,

    /// Runtime dependencies of this subpackage
    #[serde(default)]
    pub depends: Vec<String>,

    /// Option overrides for this output
    #[serde(default)]
    pub options: Options,

    /// Only active if this profile was built
    #[serde(default)]
    pub when_built: Option<String>,

    /// Expand once per cross target
    #[serde(default)]
    pub for_each_target: bool,

    /// The main package depends on this subpackage while it is active
    #[serde(default)]
    pub pull: bool,
}

impl SubpackageSection {
    /// Expand into concrete subpackages
    pub(crate) fn resolve(
        &self,
        recipe: &Recipe,
        registry: &ProfileRegistry,
        targets: &[Profile],
    ) -> Result<Vec<SubpackageSpec>> {
        if self.for_each_target {
            if self.when_built.is_some() {
                return Err(Error::ParseError(format!(
                    "Subpackage '{}': for_each_target and when_built are exclusive",
                    self.name
                )));
            }
            return Ok(targets
                .iter()
                .map(|profile| {
                    self.concrete(
                        recipe,
                        Some(profile),
                        Activation::ProfileBuilt(profile.name().to_string()),
                    )
                })
                .collect());
        }

        let activation = match &self.when_built {
            Some(name) => Activation::ProfileBuilt(registry.resolve(name)?.name().to_string()),
            None => Activation::Always,
        };
        Ok(vec![self.concrete(recipe, None, activation)])
    }

    fn concrete(
        &self,
        recipe: &Recipe,
        profile: Option<&Profile>,
        activation: Activation,
    ) -> SubpackageSpec {
        let vars: Vec<(&str, &str)> = match profile {
            Some(p) => vec![("arch", p.arch()), ("triplet", p.triplet())],
            None => Vec::new(),
        };
        let sub = |s: &String| recipe.substitute(s, &vars);

        SubpackageSpec {
            name: sub(&self.name),
            description: self.description.as_ref().map(sub),
            selectors: self.paths.iter().map(sub).collect(),
            depends: self.depends.iter().map(sub).collect(),
            options: self.options.clone(),
            activation,
            pull: self.pull,
        }
    }
}

/// When a subpackage takes part in a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Always,
    /// Only if the named profile was built
    ProfileBuilt(String),
}

/// A resolved subpackage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubpackageSpec {
    pub name: String,
    pub description: Option<String>,
    /// Path globs relative to the destdir
    pub selectors: Vec<String>,
    pub depends: Vec<String>,
    pub options: Options,
    pub activation: Activation,
    pub pull: bool,
}

impl SubpackageSpec {
    /// Subpackage claiming `selectors`, always active
    pub fn new(name: impl Into<String>, selectors: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: None,
            selectors: selectors.iter().map(|s| s.to_string()).collect(),
            depends: Vec::new(),
            options: Options::default(),
            activation: Activation::Always,
            pull: false,
        }
    }

    pub fn is_active(&self, built_profiles: &BTreeSet<String>) -> bool {
        match &self.activation {
            Activation::Always => true,
            Activation::ProfileBuilt(name) => built_profiles.contains(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;

    const MUSL_CROSS: &str = r#"
[package]
name = "musl-cross"
version = "1.2.4"

[build]
style = "gnu_configure"
options = ["!check"]

[cross]
targets = ["aarch64", "riscv64"]

[[subpackage]]
name = "musl-cross-%(arch)s-static"
for_each_target = true
paths = ["usr/%(triplet)s/usr/lib/libc.a"]
pull = true

[[subpackage]]
name = "musl-cross-docs"
when_built = "arm64"
paths = ["usr/share/doc"]
"#;

    #[test]
    fn test_for_each_target_expands_in_order() {
        let recipe = parse_recipe(MUSL_CROSS).unwrap();
        let specs = recipe.subpackage_specs(&ProfileRegistry::new()).unwrap();

        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "musl-cross-aarch64-static",
                "musl-cross-riscv64-static",
                "musl-cross-docs"
            ]
        );
        assert_eq!(
            specs[1].selectors,
            vec!["usr/riscv64-linux-musl/usr/lib/libc.a"]
        );
        assert_eq!(
            specs[0].activation,
            Activation::ProfileBuilt("aarch64".to_string())
        );
        // Aliases resolve to the canonical profile name
        assert_eq!(
            specs[2].activation,
            Activation::ProfileBuilt("aarch64".to_string())
        );
    }

    #[test]
    fn test_activation() {
        let recipe = parse_recipe(MUSL_CROSS).unwrap();
        let specs = recipe.subpackage_specs(&ProfileRegistry::new()).unwrap();
        let built: BTreeSet<String> = ["riscv64".to_string()].into();

        let active: Vec<&str> = specs
            .iter()
            .filter(|s| s.is_active(&built))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(active, vec!["musl-cross-riscv64-static"]);
    }

    #[test]
    fn test_unknown_when_built_profile() {
        let mut recipe = parse_recipe(MUSL_CROSS).unwrap();
        recipe.subpackages[1].when_built = Some("m68k".to_string());
        assert!(matches!(
            recipe.subpackage_specs(&ProfileRegistry::new()),
            Err(Error::UnknownProfile(_))
        ));
    }
}
