// src/profile/mod.rs

//! Architecture profiles for cross-target builds
//!
//! A profile bundles everything that changes when the same lifecycle stage is
//! repeated for another architecture: the toolchain triplet, where the build
//! happens, where files are installed, and the compiler environment.
//!
//! The set of architectures is closed. Configuration can adjust a profile's
//! environment but cannot introduce new architectures.

mod stack;

pub use stack::{ActiveProfile, HasProfileStack, ProfileStack};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Name of the unkeyed native profile
pub const HOST_PROFILE: &str = "host";

/// Supported target architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// AArch64 / ARM64
    Aarch64,
    /// 64-bit POWER, little endian
    Ppc64le,
    /// 64-bit POWER, big endian
    Ppc64,
    /// RISC-V 64-bit
    Riscv64,
    /// x86_64 / AMD64
    X86_64,
}

impl Arch {
    /// All supported architectures
    pub fn all() -> &'static [Arch] {
        &[
            Self::Aarch64,
            Self::Ppc64le,
            Self::Ppc64,
            Self::Riscv64,
            Self::X86_64,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64",
            Self::Ppc64le => "ppc64le",
            Self::Ppc64 => "ppc64",
            Self::Riscv64 => "riscv64",
            Self::X86_64 => "x86_64",
        }
    }

    /// Toolchain triplet for this architecture
    pub fn triplet(&self) -> &'static str {
        match self {
            Self::Aarch64 => "aarch64-linux-musl",
            Self::Ppc64le => "powerpc64le-linux-musl",
            Self::Ppc64 => "powerpc64-linux-musl",
            Self::Riscv64 => "riscv64-linux-musl",
            Self::X86_64 => "x86_64-linux-musl",
        }
    }

    /// Parse an architecture name, accepting common aliases
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "aarch64" | "arm64" => Some(Self::Aarch64),
            "ppc64le" | "powerpc64le" => Some(Self::Ppc64le),
            "ppc64" | "powerpc64" => Some(Self::Ppc64),
            "riscv64" => Some(Self::Riscv64),
            "x86_64" | "amd64" => Some(Self::X86_64),
            _ => None,
        }
    }

    /// Architecture of the running machine, if it is one we know
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "powerpc64" if cfg!(target_endian = "little") => Some(Self::Ppc64le),
            other => Self::parse(other),
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Root-relative locations a profile builds and installs into
///
/// The same relative roots are resolved against the host view of the
/// package's working tree or against the sandbox view of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRoots {
    /// Build directory, relative to the source tree
    pub build: PathBuf,
    /// Installation root, relative to the destdir
    pub install: PathBuf,
}

/// A named architecture execution context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    name: String,
    arch: String,
    triplet: String,
    cross: bool,
    roots: PathRoots,
    env: BTreeMap<String, String>,
}

impl Profile {
    /// Native profile for the machine kiln runs on
    pub fn host() -> Self {
        let (arch, triplet) = match Arch::host() {
            Some(arch) => (arch.as_str().to_string(), arch.triplet().to_string()),
            None => (
                std::env::consts::ARCH.to_string(),
                format!("{}-linux-musl", std::env::consts::ARCH),
            ),
        };

        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), "clang".to_string());
        env.insert("CXX".to_string(), "clang++".to_string());
        env.insert("CHOST".to_string(), triplet.clone());
        Self::insert_llvm_tools(&mut env);

        Self {
            name: HOST_PROFILE.to_string(),
            arch,
            triplet,
            cross: false,
            roots: PathRoots {
                build: PathBuf::from("build"),
                install: PathBuf::new(),
            },
            env,
        }
    }

    /// Cross profile targeting `arch`
    ///
    /// Each target builds in its own `build-<arch>` directory and installs
    /// into its own `usr/<triplet>` sysroot inside the shared destdir.
    pub fn target(arch: Arch) -> Self {
        let triplet = arch.triplet();
        let sysroot = format!("/usr/{}", triplet);

        let mut env = BTreeMap::new();
        env.insert("CC".to_string(), format!("clang -target {}", triplet));
        env.insert("CXX".to_string(), format!("clang++ -target {}", triplet));
        env.insert("CHOST".to_string(), triplet.to_string());
        env.insert("TARGET".to_string(), triplet.to_string());
        env.insert("SYSROOT".to_string(), sysroot);
        Self::insert_llvm_tools(&mut env);

        Self {
            name: arch.as_str().to_string(),
            arch: arch.as_str().to_string(),
            triplet: triplet.to_string(),
            cross: true,
            roots: PathRoots {
                build: PathBuf::from(format!("build-{}", arch)),
                install: PathBuf::from("usr").join(triplet),
            },
            env,
        }
    }

    fn insert_llvm_tools(env: &mut BTreeMap<String, String>) {
        env.insert("AR".to_string(), "llvm-ar".to_string());
        env.insert("NM".to_string(), "llvm-nm".to_string());
        env.insert("RANLIB".to_string(), "llvm-ranlib".to_string());
        env.insert("STRIP".to_string(), "llvm-strip".to_string());
        env.insert("LD".to_string(), "ld.lld".to_string());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn triplet(&self) -> &str {
        &self.triplet
    }

    /// Whether this profile targets another architecture's sysroot
    pub fn is_cross(&self) -> bool {
        self.cross
    }

    pub fn roots(&self) -> &PathRoots {
        &self.roots
    }

    /// Environment overlay applied on top of the build environment
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Stamp key component; the host profile is unkeyed
    pub fn stamp_key(&self) -> Option<&str> {
        if self.cross {
            Some(self.name.as_str())
        } else {
            None
        }
    }

    /// Build directory under `base`
    pub fn build_dir(&self, base: &Path) -> PathBuf {
        base.join(&self.roots.build)
    }

    /// Installation root under `destdir`
    pub fn install_dir(&self, destdir: &Path) -> PathBuf {
        if self.roots.install.as_os_str().is_empty() {
            destdir.to_path_buf()
        } else {
            destdir.join(&self.roots.install)
        }
    }
}

/// The closed set of profiles a build can activate
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    host: Profile,
    targets: BTreeMap<Arch, Profile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRegistry {
    /// Registry with the host profile and every supported target
    pub fn new() -> Self {
        let targets = Arch::all()
            .iter()
            .map(|arch| (*arch, Profile::target(*arch)))
            .collect();
        Self {
            host: Profile::host(),
            targets,
        }
    }

    /// Layer configured environment overrides onto a registered profile
    pub fn override_env(
        &mut self,
        name: &str,
        env: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        let profile = if name == HOST_PROFILE {
            &mut self.host
        } else {
            let arch = Arch::parse(name).ok_or_else(|| Error::UnknownProfile(name.to_string()))?;
            self.targets
                .get_mut(&arch)
                .ok_or_else(|| Error::UnknownProfile(name.to_string()))?
        };
        profile.env.extend(env);
        Ok(())
    }

    /// Look up a profile by name or alias
    pub fn resolve(&self, name: &str) -> Result<&Profile> {
        if name == HOST_PROFILE {
            return Ok(&self.host);
        }
        Arch::parse(name)
            .and_then(|arch| self.targets.get(&arch))
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    pub fn host(&self) -> &Profile {
        &self.host
    }

    /// All target profiles in architecture order
    pub fn targets(&self) -> impl Iterator<Item = &Profile> {
        self.targets.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_aliases() {
        let registry = ProfileRegistry::new();
        assert_eq!(registry.resolve("arm64").unwrap().name(), "aarch64");
        assert_eq!(registry.resolve("amd64").unwrap().name(), "x86_64");
        assert_eq!(
            registry.resolve("ppc64le").unwrap().triplet(),
            "powerpc64le-linux-musl"
        );
        assert_eq!(registry.resolve(HOST_PROFILE).unwrap().name(), HOST_PROFILE);
    }

    #[test]
    fn test_unknown_profile() {
        let registry = ProfileRegistry::new();
        assert!(matches!(
            registry.resolve("mips"),
            Err(Error::UnknownProfile(name)) if name == "mips"
        ));
    }

    #[test]
    fn test_target_roots() {
        let profile = Profile::target(Arch::Riscv64);
        assert!(profile.is_cross());
        assert_eq!(profile.stamp_key(), Some("riscv64"));
        assert_eq!(
            profile.build_dir(Path::new("/builddir/pkg-1.0")),
            PathBuf::from("/builddir/pkg-1.0/build-riscv64")
        );
        assert_eq!(
            profile.install_dir(Path::new("/destdir/pkg-1.0")),
            PathBuf::from("/destdir/pkg-1.0/usr/riscv64-linux-musl")
        );
        assert_eq!(
            profile.env().get("CC").map(String::as_str),
            Some("clang -target riscv64-linux-musl")
        );
    }

    #[test]
    fn test_host_profile_is_unkeyed() {
        let host = Profile::host();
        assert!(!host.is_cross());
        assert_eq!(host.stamp_key(), None);
        assert_eq!(
            host.install_dir(Path::new("/destdir/pkg-1.0")),
            PathBuf::from("/destdir/pkg-1.0")
        );
    }

    #[test]
    fn test_override_env() {
        let mut registry = ProfileRegistry::new();
        registry
            .override_env("arm64", [("CFLAGS".to_string(), "-O3".to_string())])
            .unwrap();
        let profile = registry.resolve("aarch64").unwrap();
        assert_eq!(profile.env().get("CFLAGS").map(String::as_str), Some("-O3"));

        assert!(registry.override_env("sparc64", std::iter::empty()).is_err());
    }

    #[test]
    fn test_arch_parse_roundtrip_names() {
        for arch in Arch::all() {
            assert_eq!(Arch::parse(arch.as_str()), Some(*arch));
        }
        assert_eq!(ProfileRegistry::new().targets().count(), Arch::all().len());
    }
}
