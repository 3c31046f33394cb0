//! Candidate strategies and the chain that runs them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::LoadError;
use crate::security::contained_path;

use super::host::ModuleHost;

/// Where a candidate looks for the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `<cwd>/<dependency_dir>/<name>/<entry>`
    Local,
    /// The development tree the resolving program runs from.
    SelfContained,
    /// Entry next to the resolving program itself.
    Global,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Local => "local",
            Strategy::SelfContained => "self_contained",
            Strategy::Global => "global",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One location to try, built fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub strategy: Strategy,
    pub path: PathBuf,
    /// When set, `path` must lie within this directory or the candidate is
    /// skipped without being resolved.
    pub containment_root: Option<PathBuf>,
}

impl Candidate {
    pub fn new(strategy: Strategy, path: PathBuf) -> Self {
        Self {
            strategy,
            path,
            containment_root: None,
        }
    }

    pub fn contained_in(mut self, root: impl Into<PathBuf>) -> Self {
        self.containment_root = Some(root.into());
        self
    }

    /// Try this candidate against `host`.
    ///
    /// `Ok(None)` covers every "not here" case: failed containment and an
    /// unresolvable path. Load errors are returned as-is.
    pub fn attempt<H: ModuleHost>(
        &self,
        host: &H,
    ) -> Result<Option<Resolved<H::Export>>, LoadError> {
        let target = match &self.containment_root {
            Some(root) => match contained_path(&self.path, root) {
                Ok(safe) => safe.into_path_buf(),
                Err(e) => {
                    debug!(
                        strategy = %self.strategy,
                        path = %self.path.display(),
                        error = %e,
                        "Candidate outside containment root, skipping"
                    );
                    return Ok(None);
                }
            },
            None => self.path.clone(),
        };

        let Some(resolved) = host.can_resolve(&target) else {
            debug!(strategy = %self.strategy, path = %target.display(), "Candidate not resolvable");
            return Ok(None);
        };

        let export = host.load(&resolved)?;
        debug!(strategy = %self.strategy, path = %resolved.display(), "Candidate loaded");

        Ok(Some(Resolved {
            strategy: self.strategy,
            path: resolved,
            export,
        }))
    }
}

/// A successfully loaded candidate.
#[derive(Debug, Clone)]
pub struct Resolved<E> {
    pub strategy: Strategy,
    /// Location the host resolved the candidate to.
    pub path: PathBuf,
    pub export: E,
}

impl<E> Resolved<E> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Run every candidate in order.
///
/// Candidates after a success are still attempted, and a later success
/// replaces an earlier one: the result holds the *last* candidate that
/// loaded. The first load error stops the chain.
pub fn run_chain<H: ModuleHost>(
    host: &H,
    candidates: &[Candidate],
) -> Result<Option<Resolved<H::Export>>, LoadError> {
    candidates
        .iter()
        .try_fold(None, |last, candidate| -> Result<_, LoadError> {
            Ok(candidate.attempt(host)?.or(last))
        })
}
