// src/recipe/kitchen/sources.rs

//! Source artifact lookup
//!
//! Fetching is somebody else's job: by the time a recipe is cooked its
//! sources are expected in the source cache. The provider only locates and
//! verifies them.

use crate::error::{Error, Result};
use crate::hash::verify_file_sha256;
use crate::recipe::format::{Recipe, SourceEntry};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Locates verified source artifacts
pub trait SourceProvider: Send + Sync {
    /// Host path of a verified copy of `source`
    ///
    /// The path must lie inside the source cache the kitchen mounts into
    /// the sandbox.
    fn provide(&self, recipe: &Recipe, source: &SourceEntry) -> Result<PathBuf>;
}

/// Flat directory of artifacts named after their URL's last segment
#[derive(Debug, Clone)]
pub struct SourceCache {
    dir: PathBuf,
}

impl SourceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `source` is expected
    pub fn path_for(&self, recipe: &Recipe, source: &SourceEntry) -> PathBuf {
        self.dir.join(source.file_name(recipe))
    }
}

impl SourceProvider for SourceCache {
    fn provide(&self, recipe: &Recipe, source: &SourceEntry) -> Result<PathBuf> {
        let path = self.path_for(recipe, source);
        if !path.is_file() {
            return Err(Error::SourceNotFound(path));
        }
        verify_file_sha256(&path, &source.sha256)?;
        debug!("Verified source {}", path.display());
        Ok(path)
    }
}
