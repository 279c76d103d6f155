//! weft: resolve artifacts from a workspace and watch it for changes.
//!
//! - `weft lookup <name>...` resolves names once and prints where they came from
//! - `weft status` prints a JSON snapshot of a fresh generation
//! - `weft watch` keeps a generation alive and rebuilds it whenever a tracked
//!   file or archive root changes (Ctrl-C to stop)

mod workspace;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use weft_core::app::{GenerationHost, IdleCloseLoop, ReloadError, ReloadLoop};

use crate::workspace::{Workspace, WorkspaceError, WorkspaceFactory};

#[derive(Parser, Debug)]
#[command(name = "weft")]
#[command(about = "Layered artifact loader with hot-reload detection")]
struct Args {
    /// Workspace file describing repositories and loader config
    #[arg(short, long, value_name = "PATH", default_value = "weft.json")]
    workspace: PathBuf,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve artifact names once
    Lookup {
        #[arg(required = true)]
        names: Vec<String>,

        /// Print one JSON object per name
        #[arg(long)]
        json: bool,
    },
    /// Print a status snapshot
    Status,
    /// Keep the workspace loaded and reload on change
    Watch {
        /// Names to resolve after every reload
        #[arg(short, long = "lookup", value_name = "NAME")]
        lookups: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("failed to serialize output")]
    Output(#[from] serde_json::Error),

    #[error("{0} of {1} lookups failed")]
    Lookups(usize, usize),

    #[error("failed to wait for Ctrl-C")]
    Signal(#[source] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    setup_tracing(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let mut message = err.to_string();
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                message.push_str(&format!(": {cause}"));
                source = cause.source();
            }
            eprintln!("weft: {message}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let workspace = Workspace::load(&args.workspace)?;
    let factory = Arc::new(WorkspaceFactory::new(workspace));
    let host = Arc::new(GenerationHost::start(factory).await?);
    info!(generation = %host.generation_id(), "workspace loaded");

    let result = match args.command {
        Command::Lookup { names, json } => lookup(&host, &names, json).await,
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&host.current().status())?);
            Ok(())
        }
        Command::Watch { lookups } => watch(Arc::clone(&host), lookups).await,
    };

    host.shutdown().await?;
    result
}

async fn lookup(host: &Arc<GenerationHost>, names: &[String], json: bool) -> Result<(), CliError> {
    let mut failed = 0;
    for name in names {
        let resolved = {
            let host = Arc::clone(host);
            let name = name.clone();
            tokio::task::spawn_blocking(move || host.lookup(&name))
                .await
                .map_err(ReloadError::from)?
        };
        match resolved {
            Ok(entry) => {
                let size = entry.provenance().map(|p| p.size).unwrap_or_default();
                if json {
                    let line = serde_json::json!({
                        "name": entry.logical_name(),
                        "kind": entry.kind(),
                        "origin": entry.origin_repository(),
                        "uri": entry.source_uri(),
                        "size": size,
                        "sha256": entry.provenance().map(|p| p.sha256.clone()),
                        "unit": entry.activated_unit().map(|u| u.id().to_string()),
                    });
                    println!("{line}");
                } else {
                    match entry.activated_unit() {
                        Some(unit) => println!("{name}\t{}\t{size} bytes\t{}", entry.source_uri(), unit.id()),
                        None => println!("{name}\t{}\t{size} bytes", entry.source_uri()),
                    }
                }
            }
            Err(err) => {
                failed += 1;
                if json {
                    let line = serde_json::json!({
                        "name": name,
                        "error": err.to_string(),
                        "error_kind": err.kind(),
                    });
                    println!("{line}");
                } else {
                    eprintln!("{name}\t{:?}\t{err}", err.kind());
                }
            }
        }
    }
    if failed > 0 {
        return Err(CliError::Lookups(failed, names.len()));
    }
    Ok(())
}

async fn watch(host: Arc<GenerationHost>, lookups: Vec<String>) -> Result<(), CliError> {
    let reload = ReloadLoop::new(Arc::clone(&host)).spawn();
    let idle_close = IdleCloseLoop::spawn(Arc::clone(&host));
    info!("watching; press Ctrl-C to stop");

    let mut seen = host.reloads();
    resolve_quietly(&host, &lookups).await;
    let signal = tokio::signal::ctrl_c();
    tokio::pin!(signal);
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    let outcome = loop {
        tokio::select! {
            res = &mut signal => break res.map_err(CliError::Signal),
            _ = ticker.tick() => {
                let reloads = host.reloads();
                if reloads != seen {
                    seen = reloads;
                    info!(generation = %host.generation_id(), reloads, "workspace reloaded");
                    resolve_quietly(&host, &lookups).await;
                }
            }
        }
    };

    info!("shutting down");
    reload.shutdown_and_join().await;
    idle_close.shutdown_and_join().await;
    outcome
}

/// Warm the new generation; failures are logged, not fatal.
async fn resolve_quietly(host: &Arc<GenerationHost>, names: &[String]) {
    for name in names {
        let host = Arc::clone(host);
        let name = name.clone();
        let result = tokio::task::spawn_blocking(move || {
            let outcome = host.lookup(&name);
            (name, outcome)
        })
        .await;
        match result {
            Ok((name, Ok(entry))) => info!(name, origin = entry.origin_repository(), "resolved"),
            Ok((name, Err(err))) => tracing::warn!(name, error = %err, "lookup failed"),
            Err(err) => tracing::warn!(error = %err, "lookup task failed"),
        }
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("weft_core=debug,weft=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
