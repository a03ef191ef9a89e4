// src/error.rs

//! Error types for the conversion pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout rezpip
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, fetching, installing or
/// converting packages
#[derive(Error, Debug)]
pub enum Error {
    /// The external resolver exited with a non-zero status
    #[error("resolver failed: {command}\n{output}")]
    ResolutionError { command: String, output: String },

    /// A specifier could not be expressed as a target version range
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A single artifact failed to download
    #[error("download error: {0}")]
    DownloadError(String),

    /// Some artifacts of a fetch batch failed
    #[error("some wheels failed to be downloaded ({failed} of {total})")]
    DownloadsFailed { failed: usize, total: usize },

    /// The installer produced no usable distribution
    #[error("install error: {0}")]
    InstallError(String),

    /// A patch could not be located or applied
    #[error("patch error: {0}")]
    PatchError(String),

    /// A cleanup action pointed outside of the install root
    #[error("refusing to clean up {path}: not inside {root}")]
    CleanupSecurityError { path: PathBuf, root: PathBuf },

    /// A hook vetoed the run
    #[error("hook '{hook}' failed: {message}")]
    HookError { hook: String, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("not found: {0}")]
    NotFoundError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("initialization error: {0}")]
    InitError(String),
}

impl Error {
    /// Build a hook error from a hook name and a message
    pub fn hook(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HookError {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}
