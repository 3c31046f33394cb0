//! Command-line interface for the `localcall` binary.

mod resolve;
mod run;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use localcall::loader::{ResolutionRequest, Resolver};
use localcall::ResolverConfig;

#[derive(Parser, Debug)]
#[command(name = "localcall")]
#[command(about = "Run a module's CLI, preferring the project-local install", long_about = None)]
pub(crate) struct Cli {
    /// Log every candidate the resolver tries
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Print the entry file a module resolves to
    Resolve {
        #[command(flatten)]
        target: TargetArgs,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a module and run its entry with the given arguments
    Run {
        #[command(flatten)]
        target: TargetArgs,
        /// Arguments passed to the module
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the effective configuration
    Config,
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub(crate) struct TargetArgs {
    /// Module name
    pub name: String,
    /// Entry file inside the module (default: bin/cli.js)
    #[arg(short, long)]
    pub filepath: Option<String>,
    /// Fall back to the entry installed next to this program
    #[arg(short = 'g', long)]
    pub allow_global: bool,
}

impl TargetArgs {
    fn into_request(self, config: &ResolverConfig) -> ResolutionRequest {
        ResolutionRequest {
            name: self.name,
            filepath: self.filepath,
            allow_global: self.allow_global || config.allow_global,
        }
    }
}

/// Dispatch a parsed command line; returns the process exit code.
pub(crate) async fn dispatch(cli: Cli) -> Result<i32> {
    let config = ResolverConfig::load().with_context(|| "Failed to load configuration")?;

    match cli.command {
        Some(Commands::Version) | None => {
            println!("localcall {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Some(Commands::Config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(0)
        }
        Some(Commands::Resolve { target, json }) => {
            let request = target.into_request(&config);
            let resolver = Resolver::from_process(config);
            resolve::cmd_resolve(&resolver, request, json).await?;
            Ok(0)
        }
        Some(Commands::Run { target, args }) => {
            let request = target.into_request(&config);
            let resolver = Resolver::from_process(config);
            run::cmd_run(&resolver, request, args).await
        }
    }
}
