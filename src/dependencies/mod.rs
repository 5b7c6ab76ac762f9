// src/dependencies/mod.rs

//! Dependency aggregation
//!
//! Collects what each output package needs, for the external scheduler that
//! decides build order and installs build dependencies. Three kinds are
//! tracked:
//!
//! - `host`: tools that run on the build machine (`hostmakedepends`)
//! - `target`: libraries and headers for the architecture being built
//!   (`makedepends`)
//! - `runtime`: what the installed package needs (`depends`)
//!
//! Only the main package has build dependencies; subpackages carry their own
//! runtime dependencies. A subpackage marked `pull` is added to the main
//! package's runtime dependencies at the exact same version and release.
//!
//! No ordering or cycle detection happens here.

use crate::error::Result;
use crate::profile::ProfileRegistry;
use crate::recipe::{Recipe, SubpackageSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Characters that start a version constraint (`tcl>=8.6`, `musl=1.2.4-r0`)
const CONSTRAINT_CHARS: &[char] = &['<', '>', '=', '~'];

/// Strip any version constraint from a dependency string
pub fn dependency_name(dep: &str) -> &str {
    match dep.find(CONSTRAINT_CHARS) {
        Some(idx) => dep[..idx].trim(),
        None => dep.trim(),
    }
}

/// Dependencies of one output package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySet {
    #[serde(default)]
    pub host: BTreeSet<String>,
    #[serde(default)]
    pub target: BTreeSet<String>,
    #[serde(default)]
    pub runtime: BTreeSet<String>,
}

impl DependencySet {
    /// All dependency names, without version constraints
    pub fn names(&self) -> BTreeSet<String> {
        self.host
            .iter()
            .chain(&self.target)
            .chain(&self.runtime)
            .map(|d| dependency_name(d).to_string())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty() && self.target.is_empty() && self.runtime.is_empty()
    }
}

/// Dependency sets keyed by output package name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyMap {
    outputs: BTreeMap<String, DependencySet>,
}

impl DependencyMap {
    pub fn get(&self, output: &str) -> Option<&DependencySet> {
        self.outputs.get(output)
    }

    /// Flat name set for one output; empty for unknown outputs
    pub fn names(&self, output: &str) -> BTreeSet<String> {
        self.get(output).map(DependencySet::names).unwrap_or_default()
    }

    /// `(output, dependency name)` pairs across every output
    pub fn edges(&self) -> Vec<(String, String)> {
        self.outputs
            .iter()
            .flat_map(|(output, set)| {
                set.names()
                    .into_iter()
                    .map(move |dep| (output.clone(), dep))
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DependencySet)> {
        self.outputs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Aggregate dependencies for the main package and its active subpackages
pub fn aggregate(recipe: &Recipe, active: &[&SubpackageSpec]) -> DependencyMap {
    let build = &recipe.build;
    let pkg = &recipe.package;

    let mut main = DependencySet {
        host: build.hostmakedepends.iter().cloned().collect(),
        target: build.makedepends.iter().cloned().collect(),
        runtime: build.depends.iter().cloned().collect(),
    };
    for spec in active.iter().filter(|s| s.pull) {
        main.runtime
            .insert(format!("{}={}-r{}", spec.name, pkg.version, pkg.release));
    }

    let mut outputs = BTreeMap::new();
    outputs.insert(pkg.name.clone(), main);
    for spec in active {
        outputs.insert(
            spec.name.clone(),
            DependencySet {
                runtime: spec.depends.iter().cloned().collect(),
                ..Default::default()
            },
        );
    }

    DependencyMap { outputs }
}

/// Aggregate assuming every declared cross target gets built
pub fn aggregate_declared(recipe: &Recipe, registry: &ProfileRegistry) -> Result<DependencyMap> {
    let specs = recipe.subpackage_specs(registry)?;
    let mut built: BTreeSet<String> = recipe
        .cross_profiles(registry)?
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    built.insert(registry.host().name().to_string());

    let active: Vec<&SubpackageSpec> = specs.iter().filter(|s| s.is_active(&built)).collect();
    Ok(aggregate(recipe, &active))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::parse_recipe;

    const MUSL: &str = r#"
[package]
name = "musl-cross"
version = "1.2.4"
release = 2

[build]
style = "gnu_configure"
hostmakedepends = ["clang", "lld"]
makedepends = ["linux-headers>=6.1"]
depends = ["musl-cross-common"]

[cross]
targets = ["aarch64", "x86_64"]

[[subpackage]]
name = "musl-cross-%(arch)s"
for_each_target = true
paths = ["usr/%(triplet)s"]
depends = ["llvm-%(arch)s"]
pull = true
"#;

    #[test]
    fn test_dependency_name() {
        assert_eq!(dependency_name("tcl>=8.6"), "tcl");
        assert_eq!(dependency_name("musl=1.2.4-r0"), "musl");
        assert_eq!(dependency_name(" pkgconf "), "pkgconf");
        assert_eq!(dependency_name("zlib~1.3"), "zlib");
    }

    #[test]
    fn test_aggregate_main_and_pulled() {
        let recipe = parse_recipe(MUSL).unwrap();
        let specs = recipe.subpackage_specs(&ProfileRegistry::new()).unwrap();
        let active: Vec<&SubpackageSpec> = specs.iter().collect();

        let map = aggregate(&recipe, &active);
        let main = map.get("musl-cross").unwrap();
        assert_eq!(
            main.host,
            BTreeSet::from(["clang".to_string(), "lld".to_string()])
        );
        assert!(main.target.contains("linux-headers>=6.1"));
        assert!(main.runtime.contains("musl-cross-aarch64=1.2.4-r2"));
        assert!(main.runtime.contains("musl-cross-x86_64=1.2.4-r2"));

        let sub = map.get("musl-cross-aarch64").unwrap();
        assert!(sub.host.is_empty());
        assert_eq!(sub.runtime, BTreeSet::from(["llvm-aarch64".to_string()]));
    }

    #[test]
    fn test_inactive_subpackages_are_not_pulled() {
        let recipe = parse_recipe(MUSL).unwrap();
        let specs = recipe.subpackage_specs(&ProfileRegistry::new()).unwrap();
        let built = BTreeSet::from(["x86_64".to_string()]);
        let active: Vec<&SubpackageSpec> = specs.iter().filter(|s| s.is_active(&built)).collect();

        let map = aggregate(&recipe, &active);
        assert_eq!(map.len(), 2);
        let names = map.names("musl-cross");
        assert!(names.contains("musl-cross-x86_64"));
        assert!(!names.contains("musl-cross-aarch64"));
        assert!(names.contains("linux-headers"));
    }

    #[test]
    fn test_edges_and_declared() {
        let recipe = parse_recipe(MUSL).unwrap();
        let map = aggregate_declared(&recipe, &ProfileRegistry::new()).unwrap();
        assert_eq!(map.len(), 3);

        let edges = map.edges();
        assert!(edges.contains(&("musl-cross".to_string(), "clang".to_string())));
        assert!(edges.contains(&(
            "musl-cross-x86_64".to_string(),
            "llvm-x86_64".to_string()
        )));
        assert!(map.names("nonexistent").is_empty());
    }
}
