// src/container/mod.rs

//! Sandboxed command execution
//!
//! Every command a build runs goes through an [`Executor`]. The production
//! executor, [`Sandbox`], wraps each command in bubblewrap:
//!
//! - All namespaces unshared (user, PID, IPC, UTS, mount, network)
//! - Host system directories bound read-only
//! - Only the package's source tree and destdir are writable
//! - Private `/tmp`, fresh `/dev` and `/proc`
//! - Environment cleared and replaced by the invocation's overlay
//!
//! Nothing runs with elevated privileges; bubblewrap creates the namespaces
//! as the invoking user.
//!
//! ## Pristine Mode
//!
//! For builds where host toolchain contamination must be avoided, pristine
//! mode binds a sysroot as the container's root instead of the host system
//! directories.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default wall-clock limit for one build command (4 hours)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

/// Paths to bind-mount into the container (read-only by default)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    /// Source path on host
    pub source: PathBuf,
    /// Target path in container
    pub target: PathBuf,
    /// Whether to mount read-write (default is read-only)
    pub writable: bool,
}

impl BindMount {
    pub fn readonly(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            writable: false,
        }
    }

    pub fn writable(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            writable: true,
        }
    }
}

/// Configuration for the bubblewrap sandbox
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// bubblewrap executable
    pub bwrap: PathBuf,
    /// Block all network access (only loopback inside the sandbox)
    pub isolate_network: bool,
    /// Wall-clock timeout per command
    pub timeout: Duration,
    /// Hostname to use in container
    pub hostname: String,
    /// System paths bound into every container; missing ones are skipped
    pub bind_mounts: Vec<BindMount>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            bwrap: PathBuf::from("bwrap"),
            isolate_network: true,
            timeout: DEFAULT_TIMEOUT,
            hostname: "kiln-build".to_string(),
            bind_mounts: default_bind_mounts(),
        }
    }
}

impl ContainerConfig {
    /// Create a pristine config with NO host system mounts
    ///
    /// The sysroot becomes the container's root filesystem, so builds see
    /// only its toolchain and libraries.
    pub fn pristine(sysroot: &Path) -> Self {
        Self {
            hostname: "kiln-pristine".to_string(),
            bind_mounts: vec![BindMount::readonly(sysroot, "/")],
            ..Self::default()
        }
    }

    /// Check if this is a pristine (no host mounts) configuration
    pub fn is_pristine(&self) -> bool {
        !self.bind_mounts.iter().any(|m| {
            let src = m.source.to_string_lossy();
            src == "/usr" || src == "/lib" || src == "/lib64" || src == "/bin" || src == "/sbin"
        })
    }

    /// Allow network access in the container
    pub fn allow_network(&mut self) {
        self.isolate_network = false;
        if !self
            .bind_mounts
            .iter()
            .any(|m| m.target.to_string_lossy().contains("resolv.conf"))
        {
            self.bind_mounts
                .push(BindMount::readonly("/etc/resolv.conf", "/etc/resolv.conf"));
        }
    }
}

/// Host system paths visible (read-only) to build commands
///
/// `/etc/resolv.conf` is only added by `allow_network()`.
fn default_bind_mounts() -> Vec<BindMount> {
    vec![
        BindMount::readonly("/usr", "/usr"),
        BindMount::readonly("/lib", "/lib"),
        BindMount::readonly("/lib64", "/lib64"),
        BindMount::readonly("/bin", "/bin"),
        BindMount::readonly("/sbin", "/sbin"),
        BindMount::readonly("/etc/passwd", "/etc/passwd"),
        BindMount::readonly("/etc/group", "/etc/group"),
        BindMount::readonly("/etc/hosts", "/etc/hosts"),
    ]
}

/// A directory as seen from the host and from inside the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub host: PathBuf,
    pub sandbox: PathBuf,
}

impl PathMapping {
    pub fn new(host: impl Into<PathBuf>, sandbox: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            sandbox: sandbox.into(),
        }
    }

    /// Both views of a path below this one
    pub fn join(&self, rel: impl AsRef<Path>) -> PathMapping {
        let rel = rel.as_ref();
        if rel.as_os_str().is_empty() {
            return self.clone();
        }
        PathMapping {
            host: self.host.join(rel),
            sandbox: self.sandbox.join(rel),
        }
    }
}

/// One command to run in the sandbox
#[derive(Debug, Clone)]
pub struct SandboxInvocation {
    pub argv: Vec<String>,
    /// Working directory, in both views
    pub workdir: PathMapping,
    /// Complete environment of the command
    pub env: BTreeMap<String, String>,
    /// Package-specific mounts (source tree, destdir, sources, patches)
    pub mounts: Vec<BindMount>,
    /// File the command's output is appended to
    pub log: Option<PathBuf>,
}

impl SandboxInvocation {
    pub fn new(argv: Vec<String>, workdir: PathMapping) -> Self {
        Self {
            argv,
            workdir,
            env: BTreeMap::new(),
            mounts: Vec::new(),
            log: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_mounts(mut self, mounts: Vec<BindMount>) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn with_log(mut self, log: impl Into<PathBuf>) -> Self {
        self.log = Some(log.into());
        self
    }

    /// The command as a single display string
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

/// How a sandboxed command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

impl Termination {
    fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Exited(-1),
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exit status {}", code),
            Self::Signaled(signal) => write!(f, "killed by signal {}", signal),
        }
    }
}

/// Result of a sandboxed command
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutcome {
    /// A successful command with no output
    pub fn ok() -> Self {
        Self {
            termination: Termination::Exited(0),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.termination == Termination::Exited(0)
    }
}

/// The boundary every build side effect passes through
pub trait Executor: Send + Sync {
    /// Run one command to completion
    ///
    /// `Err` means the command could not be run at all (spawn failure,
    /// timeout). A command that ran and failed is an `Ok` outcome with a
    /// non-zero termination.
    fn execute(&self, invocation: &SandboxInvocation) -> Result<ExecOutcome>;
}

/// bubblewrap-backed executor
pub struct Sandbox {
    config: ContainerConfig,
}

impl Sandbox {
    /// Create a new sandbox with the given configuration
    pub fn new(config: ContainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// bubblewrap arguments for an invocation, up to and including the command
    pub fn bwrap_args(&self, invocation: &SandboxInvocation) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--unshare-all".into()];
        if !self.config.isolate_network {
            args.push("--share-net".into());
        }
        args.push("--die-with-parent".into());
        args.push("--new-session".into());
        args.push("--hostname".into());
        args.push(self.config.hostname.clone().into());

        for mount in &self.config.bind_mounts {
            let flag = if mount.writable { "--bind-try" } else { "--ro-bind-try" };
            push_mount(&mut args, flag, mount);
        }

        for (flag, path) in [("--dev", "/dev"), ("--proc", "/proc"), ("--tmpfs", "/tmp")] {
            args.push(flag.into());
            args.push(path.into());
        }

        for mount in &invocation.mounts {
            let flag = if mount.writable { "--bind" } else { "--ro-bind" };
            push_mount(&mut args, flag, mount);
        }

        args.push("--clearenv".into());
        for (key, value) in &invocation.env {
            args.push("--setenv".into());
            args.push(key.into());
            args.push(value.into());
        }

        args.push("--chdir".into());
        args.push(invocation.workdir.sandbox.clone().into_os_string());
        args.push("--".into());
        args.extend(invocation.argv.iter().map(OsString::from));

        args
    }
}

fn push_mount(args: &mut Vec<OsString>, flag: &str, mount: &BindMount) {
    args.push(flag.into());
    args.push(mount.source.clone().into_os_string());
    args.push(mount.target.clone().into_os_string());
}

impl Executor for Sandbox {
    fn execute(&self, invocation: &SandboxInvocation) -> Result<ExecOutcome> {
        if invocation.argv.is_empty() {
            return Err(Error::Sandbox("Empty command".to_string()));
        }
        if !isolation_available() {
            return Err(Error::Sandbox(
                "Unprivileged user namespaces are disabled on this system".to_string(),
            ));
        }

        let command_line = invocation.command_line();
        debug!("Sandbox exec in {}: {}", invocation.workdir.sandbox.display(), command_line);

        let log = invocation.log.as_deref().map(BuildLog::<File>::open).transpose()?;
        if let Some(log) = &log {
            log.line(&format!("==> {}", command_line))?;
        }

        let mut child = Command::new(&self.config.bwrap)
            .args(self.bwrap_args(invocation))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Error::Sandbox(format!(
                    "Failed to spawn {}: {}",
                    self.config.bwrap.display(),
                    e
                ))
            })?;

        let stdout = child.stdout.take().map(|pipe| tee(pipe, log.clone()));
        let stderr = child.stderr.take().map(|pipe| tee(pipe, log.clone()));

        let status = match child.wait_timeout(self.config.timeout)? {
            Some(status) => status,
            None => {
                warn!("Command timed out, killing: {}", command_line);
                let _ = child.kill();
                let _ = child.wait();
                join_output(stdout);
                join_output(stderr);
                let secs = self.config.timeout.as_secs();
                if let Some(log) = &log {
                    log.line(&format!("==> timed out after {}s, killed", secs))?;
                }
                return Err(Error::CommandTimeout {
                    command: command_line,
                    secs,
                });
            }
        };

        let outcome = ExecOutcome {
            termination: Termination::from_status(status),
            stdout: String::from_utf8_lossy(&join_output(stdout)).into_owned(),
            stderr: String::from_utf8_lossy(&join_output(stderr)).into_owned(),
        };
        if let Some(log) = &log {
            log.line(&format!("==> {}", outcome.termination))?;
        }

        Ok(outcome)
    }
}

/// Append-only build log shared by the threads reading a child's output
struct BuildLog<W>(Arc<Mutex<W>>);

impl<W> Clone for BuildLog<W> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl BuildLog<File> {
    fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }
}

impl<W: Write> BuildLog<W> {
    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut sink = self
            .0
            .lock()
            .map_err(|_| io::Error::other("build log lock poisoned"))?;
        sink.write_all(bytes)?;
        sink.flush()
    }

    fn line(&self, text: &str) -> io::Result<()> {
        self.write(format!("{}\n", text).as_bytes())
    }
}

/// Copy a child pipe into the build log as it arrives, keeping a copy
fn tee<R, W>(mut pipe: R, log: Option<BuildLog<W>>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    std::thread::spawn(move || {
        let mut captured = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = match pipe.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            };
            if let Some(log) = &log {
                if let Err(e) = log.write(&chunk[..n]) {
                    warn!("Failed to write build log: {}", e);
                }
            }
            captured.extend_from_slice(&chunk[..n]);
        }
        captured
    })
}

fn join_output(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Check if unprivileged namespace isolation is available
pub fn isolation_available() -> bool {
    // Debian/Ubuntu specific knob
    let path = Path::new("/proc/sys/kernel/unprivileged_userns_clone");
    if let Ok(content) = fs::read_to_string(path) {
        return content.trim() == "1";
    }

    let path = Path::new("/proc/sys/user/max_user_namespaces");
    if let Ok(content) = fs::read_to_string(path) {
        return content.trim().parse::<u64>().map(|n| n > 0).unwrap_or(true);
    }

    // On standard kernels, unprivileged userns are enabled by default
    true
}
