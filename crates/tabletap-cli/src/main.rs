//! tabletap CLI - register tables for change monitoring and run the
//! event-routing daemon.
//!
//! Registration subcommands (`add`, `get`, `remove`) take a schema and
//! table name; either may be given in canonical (optionally delimited) or
//! system-short form. `daemon` snapshots the registration set and forwards
//! captured events to the configured message bus until interrupted.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tabletap::table::normalize_name;
use tabletap::{MemoryBackend, RegistrationManager, RouteDaemon, TableRef, TapConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tabletap")]
#[command(about = "Table change-capture registration and event routing")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tables currently being monitored
    List,

    /// Add a table to monitoring
    Add {
        /// Schema of the table to monitor
        #[arg(long)]
        schema: String,
        /// Name of the table to monitor
        #[arg(long)]
        table: String,
    },

    /// Get monitoring details for a table
    Get {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        table: String,
    },

    /// Remove a table from monitoring
    Remove {
        #[arg(long)]
        schema: String,
        #[arg(long)]
        table: String,
    },

    /// Start the event-routing daemon
    Daemon,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TapConfig::load().context("could not load configuration")?;

    // The in-process backend backs standalone runs; catalog-backed
    // deployments construct the manager and daemon from the library with
    // their own trait implementations.
    let backend = MemoryBackend::new();
    let manager = RegistrationManager::new(
        config.library.clone(),
        backend.catalog(),
        backend.ddl(),
        backend.admin(),
    );

    match cli.command {
        Commands::List => {
            let registrations = manager.list().await?;
            if registrations.is_empty() {
                println!("No tables currently monitored");
            }
            for registration in registrations {
                println!("       {registration}");
            }
        }
        Commands::Add { schema, table } => {
            let table = resolve(&manager, &schema, &table).await?;
            let registration = manager.create(&table).await?;
            println!("Table monitoring started: {registration}");
        }
        Commands::Get { schema, table } => {
            let table = resolve(&manager, &schema, &table).await?;
            match manager.get(&table).await? {
                Some(registration) => println!("{registration}"),
                None => println!("Table is not monitored: {table}"),
            }
        }
        Commands::Remove { schema, table } => {
            let table = resolve(&manager, &schema, &table).await?;
            if let Some(registration) = manager.delete(&table).await? {
                println!("Table no longer monitored: {registration}");
            }
        }
        Commands::Daemon => {
            let daemon = RouteDaemon::new(
                config,
                backend.catalog(),
                backend.opener(),
                backend.bus(),
            );
            daemon.start().await?;

            // Runs until interrupted; routes do their work in background
            // tasks.
            tokio::signal::ctrl_c().await?;
            tracing::info!("interrupt received, unwinding routes...");
            daemon.shutdown();
            daemon.join().await?;
        }
    }

    Ok(())
}

/// Normalize operator input and resolve it against the table catalog.
async fn resolve(
    manager: &RegistrationManager,
    schema: &str,
    table: &str,
) -> anyhow::Result<TableRef> {
    let schema = normalize_name(schema);
    let table = normalize_name(table);
    match manager.resolve(&schema, &table).await? {
        Some(table) => Ok(table),
        None => bail!("specified table could not be found: {schema}.{table}"),
    }
}
