//! Geomarket CLI - Database migrations and zone maintenance.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! gm-cli migrate
//!
//! # Re-run the membership sweep for zone 3
//! gm-cli zones sync 3
//!
//! # Sweep every zone
//! gm-cli zones sync-all
//!
//! # Which zone contains a point
//! gm-cli zones resolve 48.8566 2.3522
//!
//! # Load stores, products, offers and zones
//! gm-cli seed demo.yaml
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gm-cli")]
#[command(author, version, about = "Geomarket CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Zone sweeps and lookups
    Zones {
        #[command(subcommand)]
        action: ZoneAction,
    },
    /// Seed stores, products, offers and zones from a YAML file
    Seed {
        /// Path to the seed file
        file: String,
    },
}

#[derive(Subcommand)]
enum ZoneAction {
    /// Re-resolve users and carts affected by one zone
    Sync {
        /// Zone ID
        id: i32,

        /// Entities reconciled concurrently
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Sweep every zone
    SyncAll {
        /// Entities reconciled concurrently
        #[arg(short, long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Print the zone containing a coordinate
    Resolve {
        /// Latitude in degrees
        #[arg(allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(allow_hyphen_values = true)]
        lng: f64,
    },
}

#[tokio::main]
async fn main() {
    // Defaults to info level if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Zones { action } => match action {
            ZoneAction::Sync { id, concurrency } => commands::zones::sync(id, concurrency).await?,
            ZoneAction::SyncAll { concurrency } => commands::zones::sync_all(concurrency).await?,
            ZoneAction::Resolve { lat, lng } => commands::zones::resolve(lat, lng).await?,
        },
        Commands::Seed { file } => commands::seed::from_file(&file).await?,
    }
    Ok(())
}
