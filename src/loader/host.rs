//! Module hosts: the facility that checks whether a module path resolves
//! and loads it.
//!
//! The resolution chain only talks to the [`ModuleHost`] trait. Resolving
//! and loading are two separate operations with different error contracts:
//! `can_resolve` never fails (a miss is just `None`), while `load` reports
//! every failure to the caller.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::error::LoadError;

/// The module-resolution facility used by the resolution chain.
#[cfg_attr(test, mockall::automock(type Export = String;))]
pub trait ModuleHost {
    /// Value produced by a successful load.
    type Export;

    /// Resolve `path` to a loadable file without loading it.
    ///
    /// Returns `None` when nothing loadable exists at that location.
    fn can_resolve(&self, path: &Path) -> Option<PathBuf>;

    /// Load a path previously returned by [`ModuleHost::can_resolve`].
    fn load(&self, resolved: &Path) -> Result<Self::Export, LoadError>;
}

impl<H: ModuleHost + ?Sized> ModuleHost for Arc<H> {
    type Export = H::Export;

    fn can_resolve(&self, path: &Path) -> Option<PathBuf> {
        (**self).can_resolve(path)
    }

    fn load(&self, resolved: &Path) -> Result<Self::Export, LoadError> {
        (**self).load(resolved)
    }
}

/// Program that runs an entry file, taken from its `#!` line or its
/// extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpreter {
    pub program: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// An entry file loaded by [`FsModuleHost`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModule {
    /// Resolved location of the entry file.
    pub path: PathBuf,
    /// `None` means the file is executed directly.
    pub interpreter: Option<Interpreter>,
    /// Parsed content for JSON entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Size of the entry file in bytes.
    pub size: u64,
}

impl LoadedModule {
    /// Program and arguments that launch this entry with `extra` appended.
    pub fn invocation<I, S>(&self, extra: I) -> (String, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = self.path.to_string_lossy().into_owned();
        let (program, mut args) = match &self.interpreter {
            Some(interp) => {
                let mut args = interp.args.clone();
                args.push(path);
                (interp.program.clone(), args)
            }
            None => (path, Vec::new()),
        };
        args.extend(extra.into_iter().map(Into::into));
        (program, args)
    }
}

/// Filesystem module host.
///
/// Resolution probes, in order: the exact file, the file with each
/// configured extension appended, a directory's `package.json` `main`,
/// and a directory's `index.<ext>`.
///
/// Loaded modules are cached by resolved path for the lifetime of the host,
/// so a second load of the same file returns the same `Arc`. Failed loads
/// are not cached.
#[derive(Debug)]
pub struct FsModuleHost {
    extensions: Vec<String>,
    cache: Mutex<HashMap<PathBuf, Arc<LoadedModule>>>,
}

impl FsModuleHost {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .filter(|ext| !ext.is_empty())
                .collect(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::new(config.extensions.clone())
    }

    /// Number of modules currently held in the load cache.
    pub fn cached_count(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn resolve_file(&self, path: &Path) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        self.extensions
            .iter()
            .map(|ext| append_extension(path, ext))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_index(&self, dir: &Path) -> Option<PathBuf> {
        self.extensions
            .iter()
            .map(|ext| dir.join(format!("index.{}", ext)))
            .find(|candidate| candidate.is_file())
    }

    fn resolve_directory(&self, dir: &Path) -> Option<PathBuf> {
        if !dir.is_dir() {
            return None;
        }
        if let Some(main) = package_main(dir) {
            let target = dir.join(main);
            if let Some(found) = self
                .resolve_file(&target)
                .or_else(|| self.resolve_index(&target))
            {
                return Some(found);
            }
        }
        self.resolve_index(dir)
    }

    fn read_module(&self, path: &Path) -> Result<LoadedModule, LoadError> {
        let bytes = fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let extension = path.extension().and_then(OsStr::to_str).unwrap_or("");

        let data = if extension.eq_ignore_ascii_case("json") {
            let value: Value = serde_json::from_slice(&bytes).map_err(|e| LoadError::Failed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Some(value)
        } else {
            None
        };

        let interpreter = match parse_shebang(&bytes) {
            Some(Some(interp)) => Some(interp),
            Some(None) => {
                return Err(LoadError::InvalidShebang {
                    path: path.to_path_buf(),
                })
            }
            None => default_interpreter(extension),
        };

        Ok(LoadedModule {
            path: path.to_path_buf(),
            interpreter,
            data,
            size: bytes.len() as u64,
        })
    }
}

impl Default for FsModuleHost {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl ModuleHost for FsModuleHost {
    type Export = Arc<LoadedModule>;

    fn can_resolve(&self, path: &Path) -> Option<PathBuf> {
        let found = self
            .resolve_file(path)
            .or_else(|| self.resolve_directory(path));
        if let Some(found) = &found {
            debug!(request = %path.display(), resolved = %found.display(), "Resolved module path");
        }
        found
    }

    fn load(&self, resolved: &Path) -> Result<Self::Export, LoadError> {
        if let Some(module) = self
            .cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(resolved)
        {
            return Ok(Arc::clone(module));
        }

        let module = Arc::new(self.read_module(resolved)?);
        debug!(
            path = %resolved.display(),
            size = module.size,
            "Loaded module entry"
        );

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(
            cache
                .entry(resolved.to_path_buf())
                .or_insert(module),
        ))
    }
}

fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Read the `main` field of `dir/package.json`, if any.
fn package_main(dir: &Path) -> Option<String> {
    let content = fs::read_to_string(dir.join("package.json")).ok()?;
    let manifest: Value = serde_json::from_str(&content).ok()?;
    manifest
        .get("main")
        .and_then(Value::as_str)
        .filter(|main| !main.trim().is_empty())
        .map(str::to_string)
}

/// Parse a leading `#!` line.
///
/// Returns `None` when there is no shebang, `Some(None)` when the shebang
/// names no program.
fn parse_shebang(bytes: &[u8]) -> Option<Option<Interpreter>> {
    let rest = bytes.strip_prefix(b"#!")?;
    let line_end = rest.iter().position(|b| *b == b'\n').unwrap_or(rest.len());
    let line = String::from_utf8_lossy(&rest[..line_end]);
    let mut tokens = line.split_whitespace();

    let Some(program) = tokens.next() else {
        return Some(None);
    };

    let is_env = Path::new(program).file_name() == Some(OsStr::new("env"));
    if !is_env {
        return Some(Some(Interpreter {
            program: program.to_string(),
            args: tokens.map(str::to_string).collect(),
        }));
    }

    // `#!/usr/bin/env [-S] prog args...`
    let mut tokens = tokens.skip_while(|token| token.starts_with('-'));
    Some(tokens.next().map(|program| Interpreter {
        program: program.to_string(),
        args: tokens.map(str::to_string).collect(),
    }))
}

fn default_interpreter(extension: &str) -> Option<Interpreter> {
    match extension {
        "js" | "mjs" | "cjs" => Some(Interpreter {
            program: "node".to_string(),
            args: Vec::new(),
        }),
        _ => None,
    }
}
