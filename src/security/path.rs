//! Path containment checks for module loading
//!
//! Before a candidate outside the project's dependency directory is loaded,
//! its location must be shown to lie within the designated root (the working
//! directory). This module provides that check.

use std::path::{Component, Path, PathBuf};

use crate::error::{LoaderError, Result};

/// A path that has been verified to lie within a root directory.
///
/// This struct can only be created through [`contained_path`], so any
/// `SafePath` instance represents a path that passed the containment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafePath {
    path: PathBuf,
}

impl SafePath {
    /// Returns a reference to the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Converts the SafePath into a PathBuf.
    pub fn into_path_buf(self) -> PathBuf {
        self.path
    }
}

impl AsRef<Path> for SafePath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

/// Validates that `candidate` is equal to or nested under `root`.
///
/// Both paths are normalized, then the path of `candidate` relative to
/// `root` is computed. The candidate is rejected when that relative path
/// begins with a parent-directory component, a root directory, or a
/// drive/UNC prefix (the latter two happen when no relative path exists,
/// e.g. across Windows drives).
///
/// A relative `candidate` is interpreted against `root`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use localcall::security::contained_path;
///
/// assert!(contained_path(Path::new("/work/proj/bin/cli.js"), Path::new("/work/proj")).is_ok());
/// assert!(contained_path(Path::new("/work/other/cli.js"), Path::new("/work/proj")).is_err());
/// ```
pub fn contained_path(candidate: &Path, root: &Path) -> Result<SafePath> {
    let resolved = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    let normalized_root = normalize_path(root);
    let normalized = normalize_path(&resolved);
    let relative = relative_path(&normalized_root, &normalized);

    let escapes = matches!(
        relative.components().next(),
        Some(Component::ParentDir | Component::RootDir | Component::Prefix(_))
    );
    if escapes {
        return Err(LoaderError::SecurityViolation(format!(
            "Path escapes root: {} is not within {}",
            candidate.display(),
            root.display()
        )));
    }

    Ok(SafePath { path: normalized })
}

/// Computes the path of `to` relative to `from`.
///
/// Both inputs are expected to be normalized. When the two paths share no
/// common anchor (different drive prefixes, or one relative and one
/// absolute) `to` is returned unchanged, so the result stays anchored.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from_parts: Vec<Component<'_>> = from.components().collect();
    let to_parts: Vec<Component<'_>> = to.components().collect();

    if anchor(&from_parts) != anchor(&to_parts) {
        return to.to_path_buf();
    }

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from_parts.len() {
        relative.push(Component::ParentDir);
    }
    for part in &to_parts[common..] {
        relative.push(part);
    }
    relative
}

fn anchor<'a>(parts: &[Component<'a>]) -> Vec<Component<'a>> {
    parts
        .iter()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .copied()
        .collect()
}

/// Normalizes a path by resolving `.` and `..` components.
///
/// The longest existing ancestor of the folded path is canonicalized and
/// the remaining components are re-attached, so a path that does not exist
/// yet still compares equal to canonical paths under the same directory
/// (e.g. through a symlinked temp dir).
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::ParentDir => match normalized.components().next_back() {
                Some(Component::Normal(_)) => {
                    normalized.pop();
                }
                // `..` at the root stays at the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => normalized.push(Component::ParentDir),
            },
            Component::CurDir => {}
            _ => normalized.push(component),
        }
    }

    let mut existing = normalized.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut out = canonical;
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => return normalized,
        }
    }
}
