// src/split/mod.rs

//! Subpackage splitting
//!
//! After installation the destdir holds one shared tree. Splitting partitions
//! that tree into output packages:
//!
//! - Active subpackages claim paths with their selectors, in declaration order
//! - A selector that matches a directory claims everything beneath it
//! - A path claimed by two subpackages is an authoring error
//! - Whatever nobody claimed belongs to the main package
//!
//! Planning is pure and fails before anything is written, so an overlapping
//! claim never produces partial output. Emitting copies files out of the
//! destdir and leaves the destdir itself untouched.

use crate::dependencies::DependencyMap;
use crate::error::{Error, Result};
use crate::recipe::{Recipe, SubpackageSpec};
use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// `*` and `?` never cross a `/`
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Relative paths of every file and symlink in an installation tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallTree {
    paths: BTreeSet<PathBuf>,
}

impl InstallTree {
    /// Walk `root`; directories are implied by their contents
    pub fn scan(root: &Path) -> Result<Self> {
        let mut paths = BTreeSet::new();
        if !root.exists() {
            return Ok(Self { paths });
        }
        for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| Error::IoError(format!("Failed to walk {}: {}", root.display(), e)))?;
            if entry.file_type().is_dir() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::IoError(e.to_string()))?;
            paths.insert(rel.to_path_buf());
        }
        Ok(Self { paths })
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Files one output package receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    /// Output package name
    pub output: String,
    /// Index into the subpackage list, `None` for the main package
    pub subpackage: Option<usize>,
    pub files: BTreeSet<PathBuf>,
}

/// A validated partition of an installation tree
#[derive(Debug, Clone)]
pub struct SplitPlan {
    /// Main package first, then active subpackages in declaration order
    pub claims: Vec<Claim>,
}

impl SplitPlan {
    pub fn main(&self) -> &Claim {
        &self.claims[0]
    }

    /// Claim of a named output
    pub fn get(&self, output: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.output == output)
    }

    /// Attach package metadata to every claim
    pub fn into_outputs(
        self,
        recipe: &Recipe,
        specs: &[SubpackageSpec],
        dependencies: &DependencyMap,
    ) -> Vec<OutputPackage> {
        let main_options = recipe.options();
        self.claims
            .into_iter()
            .map(|claim| {
                let spec = claim.subpackage.and_then(|i| specs.get(i));
                let options = match spec {
                    Some(spec) => main_options.merged(&spec.options),
                    None => main_options.clone(),
                };
                let description = spec
                    .and_then(|s| s.description.clone())
                    .or_else(|| recipe.package.description.clone());
                let depends = dependencies
                    .get(&claim.output)
                    .map(|d| d.runtime.clone())
                    .unwrap_or_default();
                OutputPackage {
                    name: claim.output,
                    version: recipe.package.version.clone(),
                    release: recipe.package.release,
                    description,
                    depends,
                    provides: if spec.is_none() {
                        recipe.package.provides.clone()
                    } else {
                        Vec::new()
                    },
                    options: options.to_words(),
                    files: claim.files,
                    root: PathBuf::new(),
                }
            })
            .collect()
    }
}

/// Partition `tree` between the main package and its active subpackages
pub fn plan_split(
    package: &str,
    tree: &InstallTree,
    specs: &[SubpackageSpec],
    built_profiles: &BTreeSet<String>,
) -> Result<SplitPlan> {
    let mut owner: BTreeMap<&Path, usize> = BTreeMap::new();
    let mut claims = Vec::new();

    for (index, spec) in specs.iter().enumerate() {
        if !spec.is_active(built_profiles) {
            debug!("Subpackage {} inactive, skipping", spec.name);
            continue;
        }

        let patterns = spec
            .selectors
            .iter()
            .map(|s| {
                Pattern::new(s.trim_start_matches('/')).map_err(|e| {
                    Error::ParseError(format!(
                        "Subpackage {}: invalid path selector '{}': {}",
                        spec.name, s, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut files = BTreeSet::new();
        let mut conflicts: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for path in tree.paths() {
            if !patterns.iter().any(|p| selects(p, path)) {
                continue;
            }
            match owner.get(path) {
                Some(&first) => conflicts
                    .entry(first)
                    .or_default()
                    .push(path.display().to_string()),
                None => {
                    files.insert(path.to_path_buf());
                }
            }
        }

        if let Some((first, paths)) = conflicts.into_iter().next() {
            return Err(Error::OverlappingClaims {
                package: package.to_string(),
                first: specs[first].name.clone(),
                second: spec.name.clone(),
                paths,
            });
        }

        if files.is_empty() {
            warn!("Subpackage {} claimed no files", spec.name);
        }
        for path in &files {
            if let Some(path) = tree.paths.get(path) {
                owner.insert(path.as_path(), index);
            }
        }
        claims.push(Claim {
            output: spec.name.clone(),
            subpackage: Some(index),
            files,
        });
    }

    let main_files: BTreeSet<PathBuf> = tree
        .paths()
        .filter(|p| !owner.contains_key(p))
        .map(Path::to_path_buf)
        .collect();

    claims.insert(
        0,
        Claim {
            output: package.to_string(),
            subpackage: None,
            files: main_files,
        },
    );

    Ok(SplitPlan { claims })
}

/// Whether `pattern` selects `path` itself or one of its parent directories
fn selects(pattern: &Pattern, path: &Path) -> bool {
    path.ancestors()
        .filter(|a| !a.as_os_str().is_empty())
        .any(|a| pattern.matches_path_with(a, MATCH_OPTIONS))
}

/// An emitted output package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPackage {
    pub name: String,
    pub version: String,
    pub release: u32,
    pub description: Option<String>,
    /// Runtime dependencies
    pub depends: BTreeSet<String>,
    pub provides: Vec<String>,
    pub options: Vec<String>,
    /// Files, relative to `root`
    pub files: BTreeSet<PathBuf>,
    /// Directory holding the package's files
    pub root: PathBuf,
}

/// Copy each output's files out of `destdir` into `out_dir/<name>/`
///
/// Writes a `manifest.json` next to each output tree. Output directories
/// are recreated from scratch, so emitting twice yields the same result.
pub fn emit(outputs: &mut [OutputPackage], destdir: &Path, out_dir: &Path) -> Result<()> {
    for output in outputs.iter_mut() {
        let pkg_dir = out_dir.join(&output.name);
        let root = pkg_dir.join("files");
        if pkg_dir.exists() {
            fs::remove_dir_all(&pkg_dir)?;
        }
        fs::create_dir_all(&root)?;

        for rel in &output.files {
            copy_entry(&destdir.join(rel), &root.join(rel))?;
        }
        output.root = root;

        let manifest = serde_json::to_vec_pretty(output)?;
        fs::write(pkg_dir.join("manifest.json"), manifest)?;

        info!(
            "Emitted {}-{}-r{} ({} files)",
            output.name,
            output.version,
            output.release,
            output.files.len()
        );
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    let meta = fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        std::os::unix::fs::symlink(fs::read_link(src)?, dst)?;
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn built(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn files(claim: &Claim) -> Vec<String> {
        claim.files.iter().map(|p| p.display().to_string()).collect()
    }

    #[test]
    fn test_static_archives_split() {
        let tree = InstallTree::from_paths(["usr/lib/libc.a", "usr/lib/libc.so", "usr/bin/tool"]);
        let specs = vec![SubpackageSpec::new("libc-static", &["usr/lib/*.a"])];

        let plan = plan_split("libc", &tree, &specs, &built(&[])).unwrap();
        assert_eq!(files(plan.get("libc-static").unwrap()), vec!["usr/lib/libc.a"]);
        assert_eq!(plan.main().output, "libc");
        assert_eq!(files(plan.main()), vec!["usr/bin/tool", "usr/lib/libc.so"]);
    }

    #[test]
    fn test_directory_selector_claims_subtree() {
        let tree = InstallTree::from_paths([
            "usr/include/tk.h",
            "usr/include/tk/tkInt.h",
            "usr/lib/pkgconfig/tk.pc",
            "usr/lib/libtk8.6.so",
        ]);
        let specs = vec![SubpackageSpec::new(
            "tk-devel",
            &["usr/include", "usr/lib/pkgconfig"],
        )];

        let plan = plan_split("tk", &tree, &specs, &built(&[])).unwrap();
        assert_eq!(
            files(plan.get("tk-devel").unwrap()),
            vec!["usr/include/tk.h", "usr/include/tk/tkInt.h", "usr/lib/pkgconfig/tk.pc"]
        );
        assert_eq!(files(plan.main()), vec!["usr/lib/libtk8.6.so"]);
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let tree = InstallTree::from_paths(["usr/lib/libc.a", "usr/lib/musl/libm.a"]);
        let specs = vec![SubpackageSpec::new("static", &["usr/lib/*.a"])];

        let plan = plan_split("pkg", &tree, &specs, &built(&[])).unwrap();
        assert_eq!(files(plan.get("static").unwrap()), vec!["usr/lib/libc.a"]);
        assert_eq!(files(plan.main()), vec!["usr/lib/musl/libm.a"]);
    }

    #[test]
    fn test_overlap_rejected() {
        let tree = InstallTree::from_paths(["usr/lib/libc.a", "usr/lib/libc.so"]);
        let specs = vec![
            SubpackageSpec::new("devel", &["usr/lib"]),
            SubpackageSpec::new("static", &["usr/lib/*.a"]),
        ];

        match plan_split("libc", &tree, &specs, &built(&[])).unwrap_err() {
            Error::OverlappingClaims {
                package,
                first,
                second,
                paths,
            } => {
                assert_eq!(package, "libc");
                assert_eq!(first, "devel");
                assert_eq!(second, "static");
                assert_eq!(paths, vec!["usr/lib/libc.a"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_inactive_subpackage_claims_nothing() {
        let tree = InstallTree::from_paths([
            "usr/aarch64-linux-musl/usr/lib/libc.a",
            "usr/riscv64-linux-musl/usr/lib/libc.a",
        ]);
        let mut arm = SubpackageSpec::new("cross-aarch64", &["usr/aarch64-linux-musl"]);
        arm.activation = crate::recipe::Activation::ProfileBuilt("aarch64".to_string());
        let mut rv = SubpackageSpec::new("cross-riscv64", &["usr/riscv64-linux-musl"]);
        rv.activation = crate::recipe::Activation::ProfileBuilt("riscv64".to_string());

        let plan = plan_split("cross", &tree, &[arm, rv], &built(&["riscv64"])).unwrap();
        assert!(plan.get("cross-aarch64").is_none());
        assert_eq!(plan.claims.len(), 2);
        assert_eq!(files(plan.main()), vec!["usr/aarch64-linux-musl/usr/lib/libc.a"]);
    }

    #[test]
    fn test_every_path_claimed_exactly_once() {
        let tree = InstallTree::from_paths([
            "usr/bin/wish8.6",
            "usr/bin/wish",
            "usr/include/tk.h",
            "usr/lib/libtkstub8.6.a",
            "usr/lib/libtk8.6.so",
            "usr/share/man/man1/wish.1",
        ]);
        let specs = vec![
            SubpackageSpec::new("tk-devel", &["usr/include", "usr/lib/*.a"]),
            SubpackageSpec::new("tk-doc", &["usr/share/man"]),
        ];

        let plan = plan_split("tk", &tree, &specs, &built(&[])).unwrap();
        let mut seen = BTreeSet::new();
        for claim in &plan.claims {
            for file in &claim.files {
                assert!(seen.insert(file.clone()), "{} claimed twice", file.display());
            }
        }
        assert_eq!(seen.len(), tree.len());
    }

    #[test]
    fn test_scan_and_emit() {
        let temp_dir = tempfile::tempdir().unwrap();
        let destdir = temp_dir.path().join("destdir");
        fs::create_dir_all(destdir.join("usr/lib")).unwrap();
        fs::create_dir_all(destdir.join("usr/share/empty")).unwrap();
        fs::write(destdir.join("usr/lib/libz.so.1.3"), b"elf").unwrap();
        fs::write(destdir.join("usr/lib/libz.a"), b"ar").unwrap();
        std::os::unix::fs::symlink("libz.so.1.3", destdir.join("usr/lib/libz.so")).unwrap();

        let tree = InstallTree::scan(&destdir).unwrap();
        assert_eq!(tree.len(), 3);

        let specs = vec![SubpackageSpec::new("zlib-devel", &["usr/lib/*.a", "usr/lib/libz.so"])];
        let plan = plan_split("zlib", &tree, &specs, &built(&[])).unwrap();

        let recipe = crate::recipe::parse_recipe(
            "[package]\nname = \"zlib\"\nversion = \"1.3\"\ndescription = \"Compression library\"\n",
        )
        .unwrap();
        let mut outputs = plan.into_outputs(&recipe, &specs, &DependencyMap::default());
        let out_dir = temp_dir.path().join("out");
        emit(&mut outputs, &destdir, &out_dir).unwrap();

        assert!(out_dir.join("zlib/files/usr/lib/libz.so.1.3").is_file());
        assert!(out_dir.join("zlib-devel/files/usr/lib/libz.a").is_file());
        let link = out_dir.join("zlib-devel/files/usr/lib/libz.so");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("libz.so.1.3"));
        // The destdir is left intact
        assert!(destdir.join("usr/lib/libz.a").exists());

        let manifest: OutputPackage = serde_json::from_slice(
            &fs::read(out_dir.join("zlib-devel/manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest.description.as_deref(), Some("Compression library"));
        assert_eq!(manifest.files.len(), 2);

        // Emitting again replaces the previous output
        emit(&mut outputs, &destdir, &out_dir).unwrap();
        assert!(out_dir.join("zlib/manifest.json").is_file());
    }
}
