// src/preflight.rs

//! Host precondition gate
//!
//! Runs once at process start, before any package state exists. The checks
//! are evaluated in a fixed order and the first failure aborts the process:
//!
//! 1. The running kernel is new enough for unprivileged user namespaces
//! 2. The helper programs the sandbox and build log need are on `PATH`
//! 3. The process is not running as the superuser
//!
//! Host inspection goes through [`HostProbe`] so the gate can be exercised
//! without touching the real system.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Oldest kernel release with unprivileged user namespaces
pub const MIN_KERNEL: (u32, u32) = (3, 8);

/// Programs that must be resolvable on `PATH`, with what they are used for
pub const REQUIRED_PROGRAMS: &[(&str, &str)] = &[
    ("bwrap", "sandbox creation"),
    ("git", "version control"),
    ("tee", "build log duplication"),
];

/// A failed host precondition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreflightError {
    #[error("Kernel {found} is too old, kiln requires {required} or newer")]
    KernelTooOld { found: String, required: String },

    #[error("Could not determine the running kernel release: {0}")]
    KernelUnknown(String),

    #[error("Required program '{program}' ({purpose}) was not found in PATH")]
    MissingProgram { program: String, purpose: String },

    #[error("Please don't run kiln as root")]
    RunningAsRoot,
}

/// Read-only view of the host used by the gate
pub trait HostProbe {
    /// Release string of the running kernel (e.g. `6.1.0-13-amd64`)
    fn kernel_release(&self) -> std::result::Result<String, String>;

    /// Locate an executable on `PATH`
    fn find_program(&self, name: &str) -> Option<PathBuf>;

    /// Whether the effective user is the superuser
    fn is_superuser(&self) -> bool;
}

/// The real host
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn kernel_release(&self) -> std::result::Result<String, String> {
        nix::sys::utsname::uname()
            .map(|uts| uts.release().to_string_lossy().into_owned())
            .map_err(|e| e.to_string())
    }

    fn find_program(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn is_superuser(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}

/// Outcome of a passing gate
#[derive(Debug, Clone)]
pub struct Preflight {
    /// Kernel release that was checked
    pub kernel: String,
    /// Resolved locations of the required programs
    pub programs: BTreeMap<String, PathBuf>,
}

impl Preflight {
    /// Resolved path of a required program
    pub fn program(&self, name: &str) -> Option<&Path> {
        self.programs.get(name).map(PathBuf::as_path)
    }
}

/// Run every host check in order, stopping at the first failure
pub fn check(probe: &dyn HostProbe) -> std::result::Result<Preflight, PreflightError> {
    let kernel = probe.kernel_release().map_err(PreflightError::KernelUnknown)?;
    let (major, minor) = parse_kernel_release(&kernel)
        .ok_or_else(|| PreflightError::KernelUnknown(kernel.clone()))?;
    if (major, minor) < MIN_KERNEL {
        return Err(PreflightError::KernelTooOld {
            found: kernel,
            required: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1),
        });
    }

    let mut programs = BTreeMap::new();
    for (program, purpose) in REQUIRED_PROGRAMS {
        let path = probe
            .find_program(program)
            .ok_or_else(|| PreflightError::MissingProgram {
                program: (*program).to_string(),
                purpose: (*purpose).to_string(),
            })?;
        debug!("Found {} at {}", program, path.display());
        programs.insert((*program).to_string(), path);
    }

    if probe.is_superuser() {
        return Err(PreflightError::RunningAsRoot);
    }

    Ok(Preflight { kernel, programs })
}

/// Run `body` only if the host passes every check
///
/// Nothing in `body` executes on failure, so no stamps or sandbox
/// invocations can happen before the gate is cleared.
pub fn gate<T, E: From<PreflightError>>(
    probe: &dyn HostProbe,
    body: impl FnOnce(&Preflight) -> std::result::Result<T, E>,
) -> std::result::Result<T, E> {
    let preflight = check(probe)?;
    body(&preflight)
}

/// Extract `(major, minor)` from a kernel release string
fn parse_kernel_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split(['.', '-', '+']);
    let major = parts.next()?.parse().ok()?;
    let minor = parts
        .next()
        .map(|m| {
            m.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
        })
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    Some((major, minor))
}
