//! Module entry-point resolution
//!
//! Given a module name and an optional entry path, this module locates the
//! module's command-line entry file and loads it, preferring a copy
//! installed under the project over a global fallback.
//!
//! # Architecture
//!
//! - **entry**: normalizes the requested entry path (`bin/cli.js` by default)
//! - **host**: the `ModuleHost` seam (resolve without loading, then load) and
//!   its filesystem implementation
//! - **chain**: candidate strategies and the chain that runs them in order
//! - **resolver**: builds the candidates for a request and delivers the result
//!
//! # Candidate order
//!
//! ```text
//! 1. local           <cwd>/node_modules/<name>/<entry>
//! 2. self_contained  <program>/../../<entry>      (must stay inside <cwd>)
//! 3. global          <program>/../cli.js          (only with allow_global)
//! ```
//!
//! Every candidate is attempted, even after one succeeds; when more than one
//! loads, the last one in the order above is returned. A candidate that
//! resolves but fails to load stops the chain and its error is reported
//! unchanged.
//!
//! An absolute entry path is used as-is for the local candidate instead of
//! being joined under `<cwd>/node_modules/<name>`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use localcall::loader::{ResolutionRequest, Resolver};
//! use localcall::ResolverConfig;
//!
//! # async fn run() {
//! let resolver = Resolver::from_process(ResolverConfig::default());
//! let request = ResolutionRequest::new("grandma").allow_global(true);
//! match resolver.resolve_deferred(&request).await {
//!     Ok(resolved) => println!("{} via {}", resolved.path.display(), resolved.strategy),
//!     Err(e) => eprintln!("{}: {}", e.code(), e),
//! }
//! # }
//! ```

mod chain;
mod entry;
pub mod host;
mod resolver;

pub use chain::{run_chain, Candidate, Resolved, Strategy};
pub use entry::{normalize_entry, normalize_entry_or, EntryPath, DEFAULT_ENTRY};
pub use host::{FsModuleHost, Interpreter, LoadedModule, ModuleHost};
pub use resolver::{validate_name, Delivery, ResolutionRequest, ResolveContext, Resolver};
