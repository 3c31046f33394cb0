//! `localcall run` - locate a module entry and hand the process over to it.

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

use localcall::loader::{FsModuleHost, ResolutionRequest, Resolver};

/// Resolve `request`, run the entry with `args`, and return its exit code.
pub(crate) async fn cmd_run(
    resolver: &Resolver<FsModuleHost>,
    request: ResolutionRequest,
    args: Vec<String>,
) -> Result<i32> {
    let name = request.name.clone();

    let (tx, rx) = oneshot::channel();
    resolver.call_locally(request, move |result| {
        let _ = tx.send(result);
    });
    let module = rx
        .await
        .with_context(|| "Resolution task ended without a result")?
        .map_err(|e| anyhow!("{}: {}", e.code(), e))?;

    let (program, argv) = module.invocation(args);
    debug!(module = %name, program = %program, args = ?argv, "Spawning module entry");

    let status = Command::new(&program)
        .args(&argv)
        .status()
        .await
        .with_context(|| format!("Failed to start {} for module {}", program, name))?;

    Ok(status.code().unwrap_or(1))
}
