use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::EnvFilter;
use vecstack_provisioner::atlas::AtlasConnector;
use vecstack_provisioner::{
    Cancellation, DependencyGraph, Manifest, ProvisionerError, StatePersistence, provision,
};

mod config;
mod public_ip;

use config::VecstackConfig;

#[derive(Parser)]
#[command(name = "vecstack", version)]
#[command(about = "Provision a MongoDB Atlas vector-search stack")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: <config dir>/vecstack/config.json)
    #[arg(long, global = true, env = "VECSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Desired-state document to apply instead of the configured stack
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// State journal (default: <config dir>/vecstack/state.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create whatever is missing, wait for builds, print the connection descriptor
    Provision {
        /// Abort the whole run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Write the descriptor here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show resources in dependency order without contacting anything
    Plan,

    /// Show the outcome of the last run
    Status,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match &cli.command {
        Command::Provision {
            timeout_secs,
            output,
        } => cmd_provision(&cli, *timeout_secs, output.as_deref()).await,
        Command::Plan => cmd_plan(&cli),
        Command::Status => cmd_status(&cli).await,
    }
}

/// Logs go to stderr; stdout carries the descriptor.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<VecstackConfig> {
    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env(|name| std::env::var(name).ok());
    Ok(config)
}

fn read_manifest(path: &Path) -> Result<Manifest> {
    let bytes = std::fs::read(path)
        .map_err(|e| eyre::eyre!("failed to read manifest at {}: {e}", path.display()))?;
    Ok(Manifest::from_json(&bytes)?)
}

async fn load_manifest(cli: &Cli, config: &VecstackConfig) -> Result<Manifest> {
    if let Some(path) = &cli.manifest {
        return read_manifest(path);
    }

    let ip_address = match &config.ip_address {
        Some(ip) => ip.clone(),
        None => public_ip::discover().await?,
    };
    Ok(Manifest::vector_search(&config.stack_params(ip_address)?))
}

fn journal(cli: &Cli) -> Result<StatePersistence> {
    let path = match &cli.state {
        Some(path) => path.clone(),
        None => config::config_dir()?.join("state.json"),
    };
    Ok(StatePersistence::new(path))
}

async fn cmd_provision(cli: &Cli, timeout_secs: Option<u64>, output: Option<&Path>) -> Result<ExitCode> {
    let config = load_config(cli)?;
    let manifest = load_manifest(cli, &config).await?;
    let connector = Arc::new(AtlasConnector::new(config.service_account()?)?);
    let journal = journal(cli)?;

    let (handle, mut cancel) = Cancellation::new();
    if let Some(secs) = timeout_secs {
        cancel = cancel.with_timeout(Duration::from_secs(secs));
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling provisioning run");
            handle.cancel();
        }
    });

    let outcome = provision(
        &manifest,
        connector,
        &config.provisioner,
        Some(&journal),
        &config.credential_ref(),
        &cancel,
    )
    .await;

    match outcome {
        Ok(provisioned) => {
            for node in &provisioned.report.nodes {
                eprintln!("  ✓ {:<22} {}", node.spec.name, node.state.summary());
            }
            let json = serde_json::to_string_pretty(&provisioned.descriptor)?;
            match output {
                Some(path) => {
                    std::fs::write(path, format!("{json}\n"))?;
                    tracing::info!(path = %path.display(), "connection descriptor written");
                }
                None => println!("{json}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(ProvisionerError::PartialFailure(failures)) => {
            eprintln!("provisioning incomplete:");
            for failure in &failures {
                eprintln!("  ✗ {failure}");
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

/// Offline: no IP lookup, no credentials needed.
fn cmd_plan(cli: &Cli) -> Result<ExitCode> {
    let manifest = match &cli.manifest {
        Some(path) => read_manifest(path)?,
        None => Manifest::vector_search(&load_config(cli)?.plan_params()?),
    };
    let graph = DependencyGraph::build(&manifest)?;

    let mut invalid = 0;
    for idx in graph.topological_order() {
        let spec = graph.spec(idx);
        let after: Vec<&str> = graph
            .dependencies(idx)
            .iter()
            .map(|&d| graph.spec(d).name.as_str())
            .collect();
        let after = if after.is_empty() {
            String::new()
        } else {
            format!("  (after {})", after.join(", "))
        };
        println!("{:<40}{after}", spec.addr().to_string());
        if let Err(e) = spec.validate() {
            invalid += 1;
            println!("    ! {e}");
        }
    }

    Ok(if invalid == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_status(cli: &Cli) -> Result<ExitCode> {
    let journal = journal(cli)?;
    let state = journal.load().await?;
    if state.resources.is_empty() {
        println!("no runs recorded at {}", journal.local_path.display());
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(last_run) = state.last_run {
        println!("last run: {last_run}");
    }
    for (addr, resource) in &state.resources {
        let status = serde_json::to_value(resource.status)?;
        let mut line = format!("{addr:<40} {}", status.as_str().unwrap_or_default());
        if let Some(readiness) = resource.readiness {
            line.push_str(&format!(" ({readiness:?})"));
        }
        if let Some(detail) = &resource.detail {
            line.push_str(&format!(": {detail}"));
        }
        println!("{line}");
    }
    Ok(ExitCode::SUCCESS)
}
