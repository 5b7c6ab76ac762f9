// src/error.rs

//! Error types for the kiln build orchestrator

use crate::preflight::PreflightError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using kiln's error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading recipes and driving package builds
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Host precondition failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error("Unknown profile '{0}' (known: aarch64, ppc64le, ppc64, riscv64, x86_64, host)")]
    UnknownProfile(String),

    #[error("Invalid option '{0}'")]
    InvalidOption(String),

    #[error("Command failed ({status}): {command}")]
    CommandFailed { command: String, status: String },

    #[error("Command timed out after {secs}s: {command}")]
    CommandTimeout { command: String, secs: u64 },

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error(
        "{package}: stage '{stage}'{} failed (last completed: {}): {source}",
        profile.as_deref().map(|p| format!(" for profile '{p}'")).unwrap_or_default(),
        last_completed.as_deref().unwrap_or("nothing")
    )]
    StageFailed {
        package: String,
        stage: String,
        profile: Option<String>,
        last_completed: Option<String>,
        #[source]
        source: Box<Error>,
    },

    #[error(
        "{package}: subpackages '{first}' and '{second}' both claim {}",
        paths.join(", ")
    )]
    OverlappingClaims {
        package: String,
        first: String,
        second: String,
        paths: Vec<String>,
    },

    #[error("Stamp store error: {0}")]
    Stamp(String),

    #[error("Package '{0}' is being built by another process")]
    Locked(String),

    #[error("Source not found in cache: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}
