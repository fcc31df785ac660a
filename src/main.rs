//! smis-inventory
//!
//! Offline inventory of SMI-S arrays described by a YAML snapshot. The
//! snapshot is loaded into the in-memory provider and queried through the
//! same client used against live arrays; results are printed as JSON.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use smis_array_client::{
    ArrayClient, ArraySnapshot, ClientConfig, GroupKind, HardwareIdKey, ObjectPath,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Inventory of SMI-S managed arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML snapshot describing the arrays
    #[arg(long, env = "SMIS_SNAPSHOT")]
    snapshot: PathBuf,

    /// Client configuration file (YAML)
    #[arg(long, env = "SMIS_CONFIG")]
    config: Option<PathBuf>,

    /// Array serial, matched as a suffix of the system name
    #[arg(long, env = "SMIS_SYSTEM_ID")]
    system: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List storage systems
    Systems,
    /// List storage pools of the system
    Pools,
    /// List masking views of the system
    Views,
    /// List masking groups of one kind
    Groups {
        #[arg(value_parser = parse_group_kind)]
        kind: GroupKind,
    },
    /// List volumes of the system
    Volumes,
    /// List service levels (V3 arrays only)
    Slos,
    /// List registered hardware IDs
    HardwareIds,
    /// List the front-end ports an initiator is logged in through
    Endpoints {
        /// Initiator WWN or IQN
        hardware_id: String,
    },
}

fn parse_group_kind(s: &str) -> std::result::Result<GroupKind, String> {
    match s.to_ascii_lowercase().as_str() {
        "storage" => Ok(GroupKind::Storage),
        "port" => Ok(GroupKind::Port),
        "initiator" => Ok(GroupKind::Initiator),
        other => Err(format!(
            "unknown group kind {}, expected storage, port or initiator",
            other
        )),
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting smis-inventory {}", smis_array_client::VERSION);
    info!("  Snapshot: {}", args.snapshot.display());

    let config = match &args.config {
        Some(path) => ClientConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let array = ArraySnapshot::from_file(&args.snapshot)
        .and_then(|snapshot| snapshot.build())
        .with_context(|| format!("loading snapshot {}", args.snapshot.display()))?;
    let client = ArrayClient::new(Arc::new(array), config)?;

    run(&client, &args).await
}

async fn run(client: &ArrayClient, args: &Args) -> Result<()> {
    let inventory = client.inventory();

    match &args.command {
        Command::Systems => print_json(&inventory.storage_systems().await?),
        Command::Pools => {
            let system = target_system(client, args).await?;
            print_json(&inventory.pools(&system).await?)
        }
        Command::Views => {
            let system = target_system(client, args).await?;
            print_json(&inventory.masking_views(&system).await?)
        }
        Command::Groups { kind } => {
            let system = target_system(client, args).await?;
            print_json(&inventory.groups(&system, *kind).await?)
        }
        Command::Volumes => {
            let system = target_system(client, args).await?;
            print_json(&inventory.volumes(&system).await?)
        }
        Command::Slos => {
            let system = target_system(client, args).await?;
            print_json(&inventory.slos(&system).await?)
        }
        Command::HardwareIds => {
            let system = target_system(client, args).await?;
            print_json(&inventory.hardware_ids(&system).await?)
        }
        Command::Endpoints { hardware_id } => {
            let system = target_system(client, args).await?;
            let path = find_hardware_id(&inventory.hardware_ids(&system).await?, hardware_id)?;
            let endpoints = client
                .provisioning()
                .target_endpoints(&system, &path)
                .await?;
            print_json(&endpoints)
        }
    }
}

async fn target_system(client: &ArrayClient, args: &Args) -> Result<ObjectPath> {
    let Some(id) = args.system.as_deref() else {
        bail!("--system (or SMIS_SYSTEM_ID) is required for this command");
    };
    let system = client
        .resolver()
        .resolve_system(id)
        .await
        .with_context(|| format!("resolving system {}", id))?;
    debug!("Resolved {} to {}", id, system);
    Ok(system)
}

fn find_hardware_id(registered: &[ObjectPath], value: &str) -> Result<ObjectPath> {
    for path in registered {
        let key: HardwareIdKey = path.key("InstanceID")?.parse()?;
        if key.value.eq_ignore_ascii_case(value) {
            return Ok(path.clone());
        }
    }
    bail!("hardware ID {} is not registered", value)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout stays valid JSON
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}
