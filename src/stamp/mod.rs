// src/stamp/mod.rs

//! Stamp store: durable completion markers
//!
//! A stamp records that one unit of work, a lifecycle stage optionally bound
//! to a profile, completed successfully for one package identity. Stamps are
//! written only after the unit succeeds and are checked before it runs, which
//! is what makes an interrupted build resumable.
//!
//! Stamps are authoritative. A present stamp is never re-verified against the
//! files the stage produced; invalidating work means clearing stamps.
//!
//! # Layout
//!
//! ```text
//! <stamp_dir>/
//!   tk-8.6.13-r0.lock
//!   tk-8.6.13-r0/
//!     extract.stamp
//!     configure@aarch64.stamp
//!     configure@x86_64.stamp
//! ```

mod lock;

pub use lock::PackageLock;

use crate::error::{Error, Result};
use crate::recipe::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Identity of one package build: name, version and release counter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
    pub release: u32,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>, release: u32) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            release,
        }
    }
}

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-r{}", self.name, self.version, self.release)
    }
}

/// Key of one stamp
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StampKey {
    pub package: PackageId,
    pub stage: Stage,
    /// Profile name for per-profile units, `None` for unkeyed ones
    pub profile: Option<String>,
}

impl StampKey {
    pub fn new(package: PackageId, stage: Stage, profile: Option<&str>) -> Self {
        Self {
            package,
            stage,
            profile: profile.map(str::to_string),
        }
    }

    /// `stage` or `stage@profile`
    pub fn unit(&self) -> String {
        match &self.profile {
            Some(profile) => format!("{}@{}", self.stage, profile),
            None => self.stage.to_string(),
        }
    }

    fn file_name(&self) -> String {
        format!("{}.stamp", self.unit())
    }
}

impl std::fmt::Display for StampKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.package, self.unit())
    }
}

/// Contents of a stamp file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StampRecord {
    pub stage: Stage,
    pub profile: Option<String>,
    pub completed_at: DateTime<Utc>,
    /// Fingerprint of the recipe that produced the stamp
    pub fingerprint: String,
}

/// Storage for stamps
pub trait StampStore: Send + Sync {
    /// Read the stamp for `key`, if present
    fn record(&self, key: &StampKey) -> Result<Option<StampRecord>>;

    /// Durably mark `key` complete
    ///
    /// Either the stamp exists afterwards or it does not; a crash never leaves
    /// a partial stamp behind.
    fn mark(&self, key: &StampKey, fingerprint: &str) -> Result<()>;

    /// Remove every stamp of a package, returning how many were removed
    fn clear(&self, package: &PackageId) -> Result<usize>;

    /// Keys of every stamp of a package, in lifecycle order
    fn list(&self, package: &PackageId) -> Result<Vec<StampKey>>;

    /// Whether `key` is marked complete
    fn done(&self, key: &StampKey) -> Result<bool> {
        Ok(self.record(key)?.is_some())
    }
}

/// Filesystem stamp store, one JSON file per stamp
#[derive(Debug, Clone)]
pub struct FsStampStore {
    root: PathBuf,
}

impl FsStampStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one package's stamps
    pub fn package_dir(&self, package: &PackageId) -> PathBuf {
        self.root.join(package.to_string())
    }

    fn stamp_path(&self, key: &StampKey) -> PathBuf {
        self.package_dir(&key.package).join(key.file_name())
    }
}

fn stamp_err(action: &str, path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Stamp(format!("Failed to {} {}: {}", action, path.display(), e))
}

impl StampStore for FsStampStore {
    fn record(&self, key: &StampKey) -> Result<Option<StampRecord>> {
        let path = self.stamp_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(stamp_err("read", &path, e)),
        };
        let record = serde_json::from_str(&content).map_err(|e| stamp_err("parse", &path, e))?;
        Ok(Some(record))
    }

    fn mark(&self, key: &StampKey, fingerprint: &str) -> Result<()> {
        let dir = self.package_dir(&key.package);
        fs::create_dir_all(&dir).map_err(|e| stamp_err("create", &dir, e))?;

        let record = StampRecord {
            stage: key.stage,
            profile: key.profile.clone(),
            completed_at: Utc::now(),
            fingerprint: fingerprint.to_string(),
        };
        let content = serde_json::to_vec_pretty(&record)?;

        let path = self.stamp_path(key);
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| stamp_err("create", &dir, e))?;
        tmp.write_all(&content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| stamp_err("write", tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| stamp_err("persist", &path, e.error))?;

        // Make the rename itself durable
        File::open(&dir)
            .and_then(|d| d.sync_all())
            .map_err(|e| stamp_err("sync", &dir, e))?;

        debug!("Marked {}", key);
        Ok(())
    }

    fn clear(&self, package: &PackageId) -> Result<usize> {
        let keys = self.list(package)?;
        let dir = self.package_dir(package);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|e| stamp_err("remove", &dir, e))?;
        }
        debug!("Cleared {} stamp(s) for {}", keys.len(), package);
        Ok(keys.len())
    }

    fn list(&self, package: &PackageId) -> Result<Vec<StampKey>> {
        let dir = self.package_dir(package);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(stamp_err("list", &dir, e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| stamp_err("list", &dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("stamp") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| stamp_err("read", &path, e))?;
            let record: StampRecord =
                serde_json::from_str(&content).map_err(|e| stamp_err("parse", &path, e))?;
            keys.push(StampKey {
                package: package.clone(),
                stage: record.stage,
                profile: record.profile,
            });
        }
        keys.sort();
        Ok(keys)
    }
}
