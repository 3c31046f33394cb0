//! Entry path normalization.

use std::fmt;
use std::path::Path;

/// Entry file requested when the caller does not name one.
pub const DEFAULT_ENTRY: &str = "bin/cli.js";

/// The normalized path of the file to load inside a module.
///
/// Either an absolute path (used verbatim) or a relative path made of
/// forward-slash separated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPath(String);

impl EntryPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn is_absolute(&self) -> bool {
        self.as_path().is_absolute()
    }
}

impl fmt::Display for EntryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for EntryPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// Compute the entry path for a module, falling back to [`DEFAULT_ENTRY`].
pub fn normalize_entry(filepath: Option<&str>) -> EntryPath {
    normalize_entry_or(filepath, DEFAULT_ENTRY)
}

/// Compute the entry path for a module with an explicit default.
///
/// - absolute paths pass through unchanged
/// - relative paths are split on `/` and `\` and re-joined with `/`
/// - `None` or an empty string yields `default`
pub fn normalize_entry_or(filepath: Option<&str>, default: &str) -> EntryPath {
    match filepath {
        Some(path) if Path::new(path).is_absolute() => EntryPath(path.to_string()),
        Some(path) => {
            let joined = posix_segments(path);
            if joined.is_empty() {
                EntryPath(posix_segments(default))
            } else {
                EntryPath(joined)
            }
        }
        None => EntryPath(posix_segments(default)),
    }
}

fn posix_segments(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
