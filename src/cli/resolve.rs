//! `localcall resolve` - locate a module entry and report it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use localcall::loader::{
    FsModuleHost, Interpreter, LoadedModule, ResolutionRequest, Resolved, Resolver, Strategy,
};

/// What `resolve --json` prints.
#[derive(Debug, Serialize)]
struct ResolveReport<'a> {
    module: &'a str,
    strategy: Strategy,
    path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    interpreter: Option<&'a Interpreter>,
}

impl<'a> ResolveReport<'a> {
    fn new(name: &'a str, resolved: &'a Resolved<Arc<LoadedModule>>) -> Self {
        Self {
            module: name,
            strategy: resolved.strategy,
            path: resolved.path.clone(),
            interpreter: resolved.export.interpreter.as_ref(),
        }
    }
}

pub(crate) async fn cmd_resolve(
    resolver: &Resolver<FsModuleHost>,
    request: ResolutionRequest,
    json: bool,
) -> Result<()> {
    let resolved = match resolver.resolve_deferred(&request).await {
        Ok(resolved) => resolved,
        Err(e) => bail!("{}: {}", e.code(), e),
    };

    if json {
        let report = ResolveReport::new(&request.name, &resolved);
        let out = serde_json::to_string_pretty(&report)
            .with_context(|| "Failed to serialize resolution report")?;
        println!("{}", out);
    } else {
        println!("{}", resolved.path.display());
        eprintln!("  strategy: {}", resolved.strategy);
        if let Some(interp) = &resolved.export.interpreter {
            eprintln!("  interpreter: {} {}", interp.program, interp.args.join(" "));
        }
    }

    Ok(())
}
