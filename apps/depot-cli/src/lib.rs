//! # Depot CLI Library
//!
//! Operator shell for the depot write-ahead queue. Every stock movement is
//! queued locally first; sync happens when the remote answers.
//!
//! ## Module Organization
//! ```text
//! depot_cli/
//! ├── lib.rs          ◄─── You are here (argument parsing & dispatch)
//! ├── context.rs      ◄─── Database + config for one invocation
//! ├── commands/       ◄─── intent, queue, mirror, sync
//! ├── emitter.rs      ◄─── Agent events as JSON lines
//! └── error.rs        ◄─── API error type for commands
//! ```
//!
//! ## Output
//! Results go to stdout as JSON. Logs go to stderr. A failed command prints
//! `{"code": ..., "message": ...}` to stderr and exits with status 1.

pub mod commands;
pub mod context;
pub mod emitter;
pub mod error;

#[cfg(test)]
mod test_remote;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use tracing::info;
use tracing_subscriber::EnvFilter;

use depot_core::{DamageReport, InboundReceipt, OutboundShipment, StockAdjustment, TransactionPayload};
use depot_db::{Database, DbConfig};
use depot_sync::SyncConfig;

use commands::{intent, mirror, print_json, queue, sync};
use context::AppContext;
use error::ApiError;

// =============================================================================
// Arguments
// =============================================================================

/// Offline-first warehouse stock movements.
#[derive(Debug, Parser)]
#[command(name = "depot", version, about)]
pub struct Cli {
    /// SQLite database file. Defaults to DEPOT_DB_PATH, then the platform data dir.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// sync.toml to load instead of the platform config path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record goods received into the warehouse.
    Receive {
        sku: String,
        quantity: i64,
        #[arg(long)]
        supplier: Option<String>,
        #[arg(long)]
        note: Option<String>,
        /// Queue only; do not try to sync.
        #[arg(long)]
        offline: bool,
    },

    /// Record goods shipped out.
    Ship {
        sku: String,
        quantity: i64,
        #[arg(long)]
        destination: Option<String>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        offline: bool,
    },

    /// Record a stock count; stock becomes the counted quantity.
    Adjust {
        sku: String,
        counted: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        offline: bool,
    },

    /// Write off damaged goods.
    Damage {
        sku: String,
        quantity: i64,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        offline: bool,
    },

    /// Show connectivity, queue counts and the last error.
    Status {
        /// Skip the remote reachability check.
        #[arg(long)]
        offline: bool,
    },

    /// List queued intents in submission order.
    Queue,

    /// Show the local inventory mirror, or one SKU.
    Mirror { sku: Option<String> },

    /// Retry a failed intent now.
    Retry {
        id: i64,
        #[arg(long)]
        offline: bool,
    },

    /// Drop a failed intent without sending it.
    Discard {
        id: i64,
        #[arg(long)]
        offline: bool,
    },

    /// Drain the queue once.
    Sync,

    /// Replace the mirror with the remote inventory.
    Refresh,

    /// Run the sync agent until Ctrl-C.
    Run,
}

impl Command {
    /// The intent an enqueue command describes, with its `--offline` flag.
    fn intent(self) -> Option<(TransactionPayload, bool)> {
        match self {
            Command::Receive { sku, quantity, supplier, note, offline } => {
                let mut receipt = InboundReceipt::new(sku, quantity);
                receipt.supplier = supplier;
                receipt.note = note;
                Some((TransactionPayload::Inbound(receipt), offline))
            }
            Command::Ship { sku, quantity, destination, note, offline } => {
                let mut shipment = OutboundShipment::new(sku, quantity);
                shipment.destination = destination;
                shipment.note = note;
                Some((TransactionPayload::Outbound(shipment), offline))
            }
            Command::Adjust { sku, counted, reason, offline } => Some((
                TransactionPayload::Adjust(StockAdjustment::new(sku, counted, reason)),
                offline,
            )),
            Command::Damage { sku, quantity, reason, offline } => Some((
                TransactionPayload::Damage(DamageReport::new(sku, quantity, reason)),
                offline,
            )),
            _ => None,
        }
    }
}

// =============================================================================
// Entry Point
// =============================================================================

/// Parses arguments, opens the store and runs one command.
///
/// ## Startup Sequence
/// 1. Initialize tracing (stderr)
/// 2. Load sync config (file, then DEPOT_* environment overrides)
/// 3. Determine database path & connect (migrations run on connect)
/// 4. Dispatch the command, print its JSON result
pub async fn run() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let config = SyncConfig::load(cli.config.clone()).map_err(ApiError::from)?;

    let db_path = get_database_path(cli.db.clone())?;
    info!(?db_path, "Database path determined");

    let db = Database::new(DbConfig::new(db_path))
        .await
        .map_err(ApiError::from)?;

    let ctx = AppContext::new(db, config);
    let result = execute(&ctx, cli.command).await;
    ctx.database().close().await;

    result?;
    Ok(())
}

/// Runs one command against `ctx` and prints its result.
pub async fn execute(ctx: &AppContext, command: Command) -> Result<(), ApiError> {
    match command {
        Command::Status { offline } => print_json(&queue::status(ctx, offline).await?),
        Command::Queue => print_json(&queue::list(ctx).await?),
        Command::Mirror { sku: Some(sku) } => print_json(&mirror::get(ctx, &sku).await?),
        Command::Mirror { sku: None } => print_json(&mirror::list(ctx).await?),
        Command::Retry { id, offline } => print_json(&queue::retry(ctx, id, offline).await?),
        Command::Discard { id, offline } => print_json(&queue::discard(ctx, id, offline).await?),
        Command::Sync => print_json(&sync::sync(ctx).await?),
        Command::Refresh => print_json(&sync::refresh(ctx).await?),
        Command::Run => sync::run(ctx).await,
        other => match other.intent() {
            Some((payload, offline)) => print_json(&intent::record(ctx, payload, offline).await?),
            None => Err(ApiError::internal("Unhandled command")),
        },
    }
}

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=depot_sync=trace` - Show trace for the sync crate only
/// - Default: INFO, sqlx at WARN
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Determines the database file path.
///
/// ## Resolution Order
/// 1. `--db`
/// 2. `DEPOT_DB_PATH` environment variable
/// 3. Platform data dir, e.g. `~/.local/share/depot/depot.db` on Linux
fn get_database_path(flag: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path);
    }

    if let Ok(path) = std::env::var("DEPOT_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ProjectDirs::from("com", "depot", "depot")
        .context("Could not determine app data directory")?;

    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Could not create {}", data_dir.display()))?;

    Ok(data_dir.join("depot.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ship_command() {
        let cli = Cli::try_parse_from(["depot", "ship", "A1", "5", "--destination", "Dock 3", "--offline"]).unwrap();

        let (payload, offline) = cli.command.intent().unwrap();
        assert!(offline);
        match payload {
            TransactionPayload::Outbound(shipment) => {
                assert_eq!(shipment.sku, "A1");
                assert_eq!(shipment.quantity, 5);
                assert_eq!(shipment.destination.as_deref(), Some("Dock 3"));
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_adjust_requires_reason() {
        assert!(Cli::try_parse_from(["depot", "adjust", "A1", "12"]).is_err());
        assert!(Cli::try_parse_from(["depot", "adjust", "A1", "12", "--reason", "cycle count"]).is_ok());
    }

    #[test]
    fn test_global_db_flag() {
        let cli = Cli::try_parse_from(["depot", "queue", "--db", "/tmp/depot-test.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/depot-test.db")));
        assert!(cli.command.intent().is_none());
        assert_eq!(
            get_database_path(cli.db).unwrap(),
            PathBuf::from("/tmp/depot-test.db")
        );
    }

    #[tokio::test]
    async fn test_execute_offline_receive() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ctx = AppContext::new(db, SyncConfig::default());

        let cli = Cli::try_parse_from(["depot", "receive", "B2", "7", "--offline"]).unwrap();
        execute(&ctx, cli.command).await.unwrap();

        assert_eq!(ctx.database().queue().count_pending().await.unwrap(), 1);
        assert_eq!(ctx.database().mirror().get("B2").await.unwrap().unwrap().stock, 7);
    }
}
