//! localcall - resolve and load a module's command-line entry point,
//! preferring the project-local installation over a global fallback.

pub mod config;
pub mod error;
pub mod loader;
pub mod security;

pub use config::ResolverConfig;
pub use error::{LoadError, LoaderError, ResolveError, Result};
pub use loader::{ResolutionRequest, Resolver};
