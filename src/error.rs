//! Error types for localcall
//!
//! This module defines all error types used throughout the crate. Uses
//! `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Three layers exist:
//! - [`LoadError`]: a module host failed to load an entry it had resolved
//! - [`ResolveError`]: the outcome of a failed resolution request
//! - [`LoaderError`]: everything else (config, containment)

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for localcall operations outside the resolution
/// chain itself.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration-related errors (unreadable config file, bad env value, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A path escaped the directory it was required to stay inside
    #[error("Security violation: {0}")]
    SecurityViolation(String),
}

/// Failure raised by a module host while loading an entry that it had
/// already resolved.
///
/// These are never swallowed by the resolution chain: a module that exists
/// but cannot be loaded is reported as-is, not as "not found".
#[derive(Error, Debug)]
pub enum LoadError {
    /// Reading the entry file failed
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entry starts with `#!` but names no program
    #[error("invalid shebang in {}", .path.display())]
    InvalidShebang { path: PathBuf },

    /// Host-specific load failure
    #[error("failed to load {}: {message}", .path.display())]
    Failed { path: PathBuf, message: String },
}

/// Outcome of a failed resolution request.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No candidate strategy located the module
    #[error("could not find \"{name}\" module")]
    NotFound { name: String },

    /// The requested module name is not a valid package identifier
    #[error("invalid module name \"{name}\"")]
    InvalidName { name: String },

    /// A candidate resolved but its entry failed to load
    #[error(transparent)]
    Load(#[from] LoadError),
}

impl ResolveError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::NotFound { .. } => "ENOMODULE",
            ResolveError::InvalidName { .. } => "EINVALIDNAME",
            ResolveError::Load(_) => "ELOAD",
        }
    }

    /// Returns true when no candidate located the module.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }
}

/// A specialized `Result` type for localcall operations.
pub type Result<T> = std::result::Result<T, LoaderError>;
