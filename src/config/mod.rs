//! Configuration for localcall
//!
//! The resolver reads an optional JSON file at `~/.localcall/config.json`.
//! Missing fields fall back to defaults, and a handful of environment
//! variables override the file:
//!
//! | Variable | Field |
//! |---|---|
//! | `LOCALCALL_DEPENDENCY_DIR` | `dependency_dir` |
//! | `LOCALCALL_ALLOW_GLOBAL` | `allow_global` |
//! | `LOCALCALL_SELF_CONTAINED` | `self_contained` |
//!
//! # Example config.json
//!
//! ```json
//! {
//!   "dependency_dir": "node_modules",
//!   "default_entry": "bin/cli.js",
//!   "global_entry": "cli.js",
//!   "extensions": ["js", "json", "node"],
//!   "self_contained": true,
//!   "allow_global": false
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::loader::DEFAULT_ENTRY;

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory under the working directory holding installed modules.
    pub dependency_dir: String,
    /// Entry file used when a request names none.
    pub default_entry: String,
    /// Global fallback entry, relative to the resolving program's directory.
    pub global_entry: String,
    /// Extensions probed when an entry path does not name a file exactly.
    pub extensions: Vec<String>,
    /// Probe the development tree the resolving program runs from.
    pub self_contained: bool,
    /// Default for requests that do not set `allow_global` themselves.
    pub allow_global: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            dependency_dir: "node_modules".to_string(),
            default_entry: DEFAULT_ENTRY.to_string(),
            global_entry: "cli.js".to_string(),
            extensions: vec!["js".to_string(), "json".to_string(), "node".to_string()],
            self_contained: true,
            allow_global: false,
        }
    }
}

impl ResolverConfig {
    /// The localcall home directory (`~/.localcall`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".localcall")
    }

    /// Default config file location.
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_path(&Self::path())?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load from a specific file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            LoaderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup function.
    ///
    /// [`ResolverConfig::load`] passes the process environment.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("LOCALCALL_DEPENDENCY_DIR") {
            self.dependency_dir = dir;
        }
        if let Some(value) = lookup("LOCALCALL_ALLOW_GLOBAL") {
            self.allow_global = parse_bool("LOCALCALL_ALLOW_GLOBAL", &value)?;
        }
        if let Some(value) = lookup("LOCALCALL_SELF_CONTAINED") {
            self.self_contained = parse_bool("LOCALCALL_SELF_CONTAINED", &value)?;
        }
        self.validate()
    }

    /// Reject values that would point resolution outside its directories.
    pub fn validate(&self) -> Result<()> {
        if self.dependency_dir.trim().is_empty() {
            return Err(LoaderError::Config(
                "dependency_dir must not be empty".to_string(),
            ));
        }
        if Path::new(&self.dependency_dir).is_absolute() {
            return Err(LoaderError::Config(format!(
                "dependency_dir must be relative, got {}",
                self.dependency_dir
            )));
        }
        if self.global_entry.trim().is_empty() {
            return Err(LoaderError::Config(
                "global_entry must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(LoaderError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}
