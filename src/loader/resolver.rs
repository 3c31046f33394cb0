//! Resolution requests and the resolver that serves them.

use std::path::{Path, PathBuf};
use std::thread;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ResolverConfig;
use crate::error::ResolveError;

use super::chain::{run_chain, Candidate, Resolved, Strategy};
use super::entry::{normalize_entry_or, EntryPath};
use super::host::{FsModuleHost, ModuleHost};

/// Package identifiers: optional `@scope/`, then letters, digits, `.`, `_`, `-`.
static MODULE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[A-Za-z0-9][A-Za-z0-9._-]*/)?[A-Za-z0-9._-]+$")
        .expect("module name pattern is valid")
});

/// Options for one resolution attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Module identifier to locate.
    pub name: String,
    /// Entry file within the module, or an absolute override.
    #[serde(default)]
    pub filepath: Option<String>,
    /// Adds the global fallback candidate.
    #[serde(default)]
    pub allow_global: bool,
}

impl ResolutionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_filepath(mut self, filepath: impl Into<String>) -> Self {
        self.filepath = Some(filepath.into());
        self
    }

    pub fn allow_global(mut self, allow: bool) -> Self {
        self.allow_global = allow;
        self
    }
}

/// The locations a resolver works from, captured once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveContext {
    /// Project root: local modules live under it and self-contained
    /// candidates must stay inside it.
    pub cwd: PathBuf,
    /// Path of the program performing resolution.
    pub origin: PathBuf,
}

impl ResolveContext {
    pub fn new(cwd: impl Into<PathBuf>, origin: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            origin: origin.into(),
        }
    }

    /// Capture the current working directory and executable path.
    pub fn from_process() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|e| {
            warn!(error = %e, "Cannot read working directory, using '.'");
            PathBuf::from(".")
        });
        let origin = std::env::current_exe().unwrap_or_else(|e| {
            warn!(error = %e, "Cannot locate current executable");
            PathBuf::new()
        });
        Self { cwd, origin }
    }

    /// Directory containing the resolving program.
    pub fn origin_dir(&self) -> Option<&Path> {
        self.origin.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// Root of the development tree: two levels above the resolving program.
    pub fn dev_root(&self) -> Option<&Path> {
        self.origin_dir()?
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Resolves module entry points against a [`ModuleHost`].
///
/// # Example
///
/// ```no_run
/// use localcall::loader::{ResolutionRequest, Resolver};
///
/// # async fn run() {
/// let resolver = Resolver::from_process(localcall::ResolverConfig::default());
/// resolver.call_locally(ResolutionRequest::new("grandma"), |result| match result {
///     Ok(module) => println!("entry: {}", module.path.display()),
///     Err(e) => eprintln!("{} ({})", e, e.code()),
/// });
/// # }
/// ```
pub struct Resolver<H> {
    host: H,
    config: ResolverConfig,
    context: ResolveContext,
}

impl Resolver<FsModuleHost> {
    /// Filesystem resolver rooted at the current process's directories.
    pub fn from_process(config: ResolverConfig) -> Self {
        let host = FsModuleHost::from_config(&config);
        Self::new(host, config, ResolveContext::from_process())
    }
}

impl<H: ModuleHost> Resolver<H> {
    pub fn new(host: H, config: ResolverConfig, context: ResolveContext) -> Self {
        Self {
            host,
            config,
            context,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn context(&self) -> &ResolveContext {
        &self.context
    }

    /// Normalized entry path for a request.
    pub fn entry_path(&self, request: &ResolutionRequest) -> EntryPath {
        normalize_entry_or(request.filepath.as_deref(), &self.config.default_entry)
    }

    /// The ordered candidates for a request: local, then the development
    /// tree (when enabled), then the global fallback (when allowed).
    pub fn candidates(&self, request: &ResolutionRequest, entry: &EntryPath) -> Vec<Candidate> {
        let mut candidates = vec![Candidate::new(
            Strategy::Local,
            self.context
                .cwd
                .join(&self.config.dependency_dir)
                .join(&request.name)
                .join(entry.as_path()),
        )];

        if self.config.self_contained {
            match self.context.dev_root() {
                Some(root) => candidates.push(
                    Candidate::new(Strategy::SelfContained, root.join(entry.as_path()))
                        .contained_in(&self.context.cwd),
                ),
                None => debug!(
                    origin = %self.context.origin.display(),
                    "No development tree above origin"
                ),
            }
        }

        if request.allow_global {
            match self.context.origin_dir() {
                Some(dir) => candidates.push(Candidate::new(
                    Strategy::Global,
                    dir.join(&self.config.global_entry),
                )),
                None => debug!(
                    origin = %self.context.origin.display(),
                    "No origin directory for global fallback"
                ),
            }
        }

        candidates
    }

    /// Resolve a request synchronously.
    ///
    /// Every candidate is attempted; when several load, the last one wins.
    pub fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Resolved<H::Export>, ResolveError> {
        validate_name(&request.name)?;

        let entry = self.entry_path(request);
        let candidates = self.candidates(request, &entry);
        debug!(
            module = %request.name,
            entry = %entry,
            candidates = candidates.len(),
            "Resolving module"
        );

        match run_chain(&self.host, &candidates)? {
            Some(resolved) => {
                info!(
                    module = %request.name,
                    strategy = %resolved.strategy,
                    path = %resolved.path.display(),
                    "Module resolved"
                );
                Ok(resolved)
            }
            None => Err(ResolveError::NotFound {
                name: request.name.clone(),
            }),
        }
    }

    /// Resolve a request, completing only after a suspension point.
    pub async fn resolve_deferred(
        &self,
        request: &ResolutionRequest,
    ) -> Result<Resolved<H::Export>, ResolveError> {
        let outcome = self.resolve(request);
        tokio::task::yield_now().await;
        outcome
    }

    /// Resolve a request and deliver the loaded value to `callback`.
    ///
    /// Resolution runs before this returns; the callback runs later, never
    /// on the caller's stack, whatever the outcome. Inside a Tokio runtime
    /// it runs on a spawned task, otherwise on a dedicated thread.
    pub fn call_locally<F>(&self, request: ResolutionRequest, callback: F) -> Delivery
    where
        F: FnOnce(Result<H::Export, ResolveError>) + Send + 'static,
        H::Export: Send + 'static,
    {
        let outcome = self.resolve(&request).map(|resolved| resolved.export);
        match Handle::try_current() {
            Ok(handle) => Delivery::Task(handle.spawn(async move { callback(outcome) })),
            Err(_) => {
                debug!(module = %request.name, "No Tokio runtime, delivering on a thread");
                Delivery::Thread(thread::spawn(move || callback(outcome)))
            }
        }
    }
}

/// Pending delivery of a [`Resolver::call_locally`] callback.
#[derive(Debug)]
pub enum Delivery {
    /// Spawned on the caller's Tokio runtime.
    Task(JoinHandle<()>),
    /// Running on its own thread; the caller had no runtime.
    Thread(thread::JoinHandle<()>),
}

impl Delivery {
    /// Wait for the callback from async code.
    ///
    /// Returns false if the callback panicked.
    pub async fn finished(self) -> bool {
        match self {
            Delivery::Task(handle) => handle.await.is_ok(),
            Delivery::Thread(handle) => tokio::task::spawn_blocking(move || handle.join().is_ok())
                .await
                .unwrap_or(false),
        }
    }
}

/// Check that `name` is a package identifier that stays inside the
/// dependency directory.
pub fn validate_name(name: &str) -> Result<(), ResolveError> {
    let traverses = name.split('/').any(|segment| segment == "." || segment == "..");
    if name.is_empty() || traverses || !MODULE_NAME.is_match(name) {
        return Err(ResolveError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::loader::host::{LoadedModule, MockModuleHost};
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    /// A project at `<tmp>/project` and a resolving program installed at
    /// `<tmp>/global/lib/localcall/bin/localcall`, outside the project.
    struct Fixture {
        _tmp: TempDir,
        cwd: PathBuf,
        origin: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let cwd = tmp.path().join("project");
            let origin = tmp.path().join("global/lib/localcall/bin/localcall");
            fs::create_dir_all(&cwd).unwrap();
            fs::create_dir_all(origin.parent().unwrap()).unwrap();
            Self {
                _tmp: tmp,
                cwd,
                origin,
            }
        }

        fn write(&self, path: &Path, content: &str) -> PathBuf {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
            path.to_path_buf()
        }

        fn install_local(&self, name: &str, entry: &str, content: &str) -> PathBuf {
            self.write(&self.cwd.join("node_modules").join(name).join(entry), content)
        }

        fn install_global(&self, content: &str) -> PathBuf {
            self.write(&self.origin.parent().unwrap().join("cli.js"), content)
        }

        fn resolver(&self) -> Resolver<FsModuleHost> {
            Resolver::new(
                FsModuleHost::default(),
                ResolverConfig::default(),
                ResolveContext::new(&self.cwd, &self.origin),
            )
        }
    }

    async fn call(
        resolver: &Resolver<FsModuleHost>,
        request: ResolutionRequest,
    ) -> Result<Arc<LoadedModule>, ResolveError> {
        let (tx, rx) = oneshot::channel();
        resolver.call_locally(request, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap()
    }

    // ---- name validation ----

    #[test]
    fn test_validate_name() {
        for name in ["grandma", "@scope/tool", "my.tool_v2", "a-b"] {
            assert!(validate_name(name).is_ok(), "{} should be valid", name);
        }
        for name in ["", "..", "../evil", "a/b", "@scope/..", "a b", "/abs", "@/x"] {
            assert!(validate_name(name).is_err(), "{:?} should be invalid", name);
        }
    }

    // ---- candidates ----

    #[test]
    fn test_candidate_order() {
        let ctx = ResolveContext::new("/proj", "/opt/tool/bin/localcall");
        let resolver = Resolver::new(MockModuleHost::new(), ResolverConfig::default(), ctx);
        let request = ResolutionRequest::new("grandma").allow_global(true);
        let entry = resolver.entry_path(&request);

        let candidates = resolver.candidates(&request, &entry);
        let strategies: Vec<_> = candidates.iter().map(|c| c.strategy).collect();
        assert_eq!(
            strategies,
            vec![Strategy::Local, Strategy::SelfContained, Strategy::Global]
        );
        assert_eq!(
            candidates[0].path,
            PathBuf::from("/proj/node_modules/grandma/bin/cli.js")
        );
        assert_eq!(candidates[1].path, PathBuf::from("/opt/tool/bin/cli.js"));
        assert_eq!(candidates[1].containment_root, Some(PathBuf::from("/proj")));
        assert_eq!(candidates[2].path, PathBuf::from("/opt/tool/bin/cli.js"));
        assert_eq!(candidates[2].containment_root, None);
    }

    #[test]
    fn test_candidates_without_global_or_dev_tree() {
        let config = ResolverConfig {
            self_contained: false,
            ..Default::default()
        };
        let ctx = ResolveContext::new("/proj", "/opt/tool/bin/localcall");
        let resolver = Resolver::new(MockModuleHost::new(), config, ctx);
        let request = ResolutionRequest::new("grandma");
        let entry = resolver.entry_path(&request);

        let candidates = resolver.candidates(&request, &entry);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].strategy, Strategy::Local);
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_filepath_overrides_local_join() {
        let ctx = ResolveContext::new("/proj", "/opt/tool/bin/localcall");
        let resolver = Resolver::new(MockModuleHost::new(), ResolverConfig::default(), ctx);
        let request = ResolutionRequest::new("grandma").with_filepath("/srv/cli.js");
        let entry = resolver.entry_path(&request);

        let candidates = resolver.candidates(&request, &entry);
        assert_eq!(candidates[0].path, PathBuf::from("/srv/cli.js"));
    }

    #[test]
    fn test_origin_without_parents_skips_dev_and_global() {
        let ctx = ResolveContext::new("/proj", "localcall");
        let resolver = Resolver::new(MockModuleHost::new(), ResolverConfig::default(), ctx);
        let request = ResolutionRequest::new("grandma").allow_global(true);
        let entry = resolver.entry_path(&request);
        assert_eq!(resolver.candidates(&request, &entry).len(), 1);
    }

    // ---- call_locally ----

    #[tokio::test]
    async fn test_local_module_is_loaded() {
        let fx = Fixture::new();
        let entry = fx.install_local("grandma", "bin/cli.js", "module.exports = {};");

        let module = call(&fx.resolver(), ResolutionRequest::new("grandma"))
            .await
            .unwrap();
        assert_eq!(module.path, entry);
    }

    #[tokio::test]
    async fn test_custom_filepath_with_backslashes() {
        let fx = Fixture::new();
        let entry = fx.install_local("grandma", "lib/run/main.js", "");

        let request = ResolutionRequest::new("grandma").with_filepath(r"lib\run\main.js");
        let module = call(&fx.resolver(), request).await.unwrap();
        assert_eq!(module.path, entry);
    }

    #[tokio::test]
    async fn test_missing_module_is_enomodule() {
        let fx = Fixture::new();

        let err = call(&fx.resolver(), ResolutionRequest::new("grandma"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENOMODULE");
        assert!(err.to_string().contains("grandma"));
    }

    #[tokio::test]
    async fn test_missing_local_with_global_disallowed_ignores_global() {
        let fx = Fixture::new();
        fx.install_global("");

        let err = call(&fx.resolver(), ResolutionRequest::new("grandma"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_global_fallback_when_allowed() {
        let fx = Fixture::new();
        let global = fx.install_global("");

        let request = ResolutionRequest::new("grandma").allow_global(true);
        let module = call(&fx.resolver(), request).await.unwrap();
        assert_eq!(module.path, global);
    }

    #[tokio::test]
    async fn test_broken_local_module_error_is_passed_through() {
        let fx = Fixture::new();
        fx.install_local("grandma", "bin/cli.js", "#!\nthrow new Error('boom');\n");
        fx.install_global("");

        let request = ResolutionRequest::new("grandma").allow_global(true);
        let err = call(&fx.resolver(), request).await.unwrap_err();
        assert_eq!(err.code(), "ELOAD");
        assert!(matches!(
            err,
            ResolveError::Load(LoadError::InvalidShebang { .. })
        ));
    }

    // Both candidates load and the later-declared global one is returned.
    // This pins the existing last-success-wins contract.
    #[tokio::test]
    async fn test_last_successful_candidate_wins() {
        let fx = Fixture::new();
        let local = fx.install_local("grandma", "bin/cli.js", "");
        let global = fx.install_global("");

        let resolver = fx.resolver();
        let request = ResolutionRequest::new("grandma").allow_global(true);
        let resolved = resolver.resolve(&request).unwrap();
        assert_eq!(resolved.strategy, Strategy::Global);
        assert_eq!(resolved.path, global);

        // The local candidate was attempted and loaded too.
        assert_eq!(resolver.host().cached_count(), 2);
        assert!(resolver.host().load(&local).is_ok());

        let module = call(&resolver, request).await.unwrap();
        assert_eq!(module.path, global);
    }

    #[tokio::test]
    async fn test_callback_is_never_synchronous() {
        let fx = Fixture::new();
        fx.install_local("grandma", "bin/cli.js", "");
        let resolver = fx.resolver();

        for request in [ResolutionRequest::new("grandma"), ResolutionRequest::new("missing")] {
            let returned = Arc::new(AtomicBool::new(false));
            let seen = Arc::clone(&returned);
            let handle = resolver.call_locally(request, move |_| {
                assert!(seen.load(Ordering::SeqCst), "callback ran before call returned");
            });
            returned.store(true, Ordering::SeqCst);
            assert!(matches!(handle, Delivery::Task(_)));
            assert!(handle.finished().await);
        }
    }

    #[test]
    fn test_call_without_runtime_delivers_on_another_thread() {
        let fx = Fixture::new();
        fx.install_local("grandma", "bin/cli.js", "");
        let resolver = fx.resolver();
        let caller = thread::current().id();

        for (name, found) in [("grandma", true), ("missing", false)] {
            let (tx, rx) = std::sync::mpsc::channel();
            let delivery = resolver.call_locally(ResolutionRequest::new(name), move |result| {
                tx.send((thread::current().id(), result.is_ok())).unwrap();
            });
            let Delivery::Thread(handle) = delivery else {
                panic!("expected thread delivery outside a runtime");
            };
            handle.join().unwrap();

            let (callback_thread, ok) = rx.recv().unwrap();
            assert_ne!(callback_thread, caller);
            assert_eq!(ok, found);
        }
    }

    #[tokio::test]
    async fn test_invalid_name_is_delivered_asynchronously() {
        let fx = Fixture::new();
        let err = call(&fx.resolver(), ResolutionRequest::new("../escape"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALIDNAME");
    }

    #[tokio::test]
    async fn test_dev_tree_outside_cwd_is_rejected() {
        // The program runs from a sibling checkout: <tmp>/tool/bin/localcall.
        let fx = Fixture::new();
        let sibling_origin = fx.cwd.join("../tool/bin/localcall");
        fx.write(&fx.cwd.join("../tool/bin/cli.js"), "");

        let resolver = Resolver::new(
            FsModuleHost::default(),
            ResolverConfig::default(),
            ResolveContext::new(&fx.cwd, sibling_origin),
        );
        let err = resolver
            .resolve_deferred(&ResolutionRequest::new("tool"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(resolver.host().cached_count(), 0);
    }

    #[tokio::test]
    async fn test_dev_tree_inside_cwd_is_loaded() {
        // Running from the module's own checkout: <cwd>/bin/localcall.
        let fx = Fixture::new();
        let entry = fx.write(&fx.cwd.join("bin/cli.js"), "");

        let resolver = Resolver::new(
            FsModuleHost::default(),
            ResolverConfig::default(),
            ResolveContext::new(&fx.cwd, fx.cwd.join("bin/localcall")),
        );
        let resolved = resolver
            .resolve_deferred(&ResolutionRequest::new("tool"))
            .await
            .unwrap();
        assert_eq!(resolved.strategy, Strategy::SelfContained);
        assert!(resolved.path.ends_with("bin/cli.js"));
        assert_eq!(
            resolved.path.canonicalize().unwrap(),
            entry.canonicalize().unwrap()
        );
    }

    #[test]
    fn test_escaping_dev_tree_never_touches_host() {
        let mut host = MockModuleHost::new();
        host.expect_can_resolve()
            .withf(|p| p.ends_with("node_modules/tool/bin/cli.js"))
            .times(1)
            .returning(|_| None);
        host.expect_load().never();

        let ctx = ResolveContext::new("/work/project", "/work/tool/bin/localcall");
        let resolver = Resolver::new(host, ResolverConfig::default(), ctx);
        let err = resolver.resolve(&ResolutionRequest::new("tool")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_deferred_future_is_pending_until_polled_twice() {
        let mut host = MockModuleHost::new();
        host.expect_can_resolve().returning(|_| None);

        let ctx = ResolveContext::new("/proj", "localcall");
        let resolver = Resolver::new(host, ResolverConfig::default(), ctx);
        let request = ResolutionRequest::new("grandma");

        let mut task = tokio_test::task::spawn(resolver.resolve_deferred(&request));
        assert!(task.poll().is_pending());
        match task.poll() {
            std::task::Poll::Ready(Err(err)) => assert!(err.is_not_found()),
            other => panic!("expected NotFound, ready = {}", other.is_ready()),
        }
    }

    #[test]
    fn test_request_from_json() {
        let request: ResolutionRequest =
            serde_json::from_str(r#"{"name": "grandma", "allow_global": true}"#).unwrap();
        assert_eq!(request.name, "grandma");
        assert!(request.allow_global);
        assert!(request.filepath.is_none());
    }
}
