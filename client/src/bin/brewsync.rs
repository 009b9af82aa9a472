//! brewsync - inspect and drive the offline cache from a terminal.

use brewsync_client::{
    logging, Config, ConnectionType, FileStore, HttpApi, NetworkMonitor, NetworkState,
    OfflineSync, StaticDataService, SyncStatusMonitor, UserCacheService,
};
use brewsync_engine::StaticDataset;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "brewsync")]
#[command(about = "Offline cache and sync for the brewing companion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Treat the device as disconnected
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sync status banner
    Status,

    /// List queued operations
    Pending,

    /// Replay queued operations and refresh reference data
    Sync,

    /// Discard every queued operation
    Clear,

    /// Reference data
    Static {
        #[command(subcommand)]
        command: StaticCommands,
    },
}

#[derive(Subcommand)]
enum StaticCommands {
    /// Compare cached versions with the server
    Check,

    /// Download datasets
    Update {
        /// Only this dataset (ingredients, beer-styles)
        #[arg(short, long)]
        dataset: Option<String>,
    },
}

fn parse_dataset(raw: &str) -> Result<StaticDataset, String> {
    match raw {
        "ingredients" => Ok(StaticDataset::Ingredients),
        "beer-styles" | "beer_styles" | "beerStyles" => Ok(StaticDataset::BeerStyles),
        other => Err(format!("unknown dataset: {other}")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = Arc::new(FileStore::open(&config.cache_dir).await?);
    let api = Arc::new(HttpApi::new(
        config.api_url.clone(),
        config.api_token.clone(),
        config.http_timeout,
    )?);
    let network = NetworkMonitor::new(if cli.offline {
        NetworkState::offline()
    } else {
        NetworkState::online(ConnectionType::Unknown)
    });

    let user_cache = UserCacheService::new_shared(
        store.clone(),
        api.clone(),
        network.subscribe(),
        config.node_id.clone(),
    );
    let static_data = Arc::new(StaticDataService::new(
        store,
        api,
        config.static_check_interval,
    ));
    let offline_sync = OfflineSync::new(user_cache.clone(), static_data.clone(), network.subscribe());

    tracing::debug!(cache_dir = %config.cache_dir.display(), "Opened cache");

    match cli.command {
        Commands::Status => {
            let state = offline_sync.refresh().await;
            let view = SyncStatusMonitor::for_service(&user_cache, network.subscribe()).current();
            println!("{} ({})", view.message, view.status);
            println!("conflicts: {}", state.conflicts);
        }
        Commands::Pending => {
            for op in user_cache.pending_operations().await? {
                let held = if op.is_conflicted() { " [conflict]" } else { "" };
                println!(
                    "{}  {} {} {}  attempts={}{}",
                    op.id, op.operation_type, op.entity_type, op.entity_id, op.attempts, held
                );
            }
        }
        Commands::Sync => {
            let result = offline_sync.sync().await?;
            println!(
                "processed: {}, failed: {}, conflicts: {}",
                result.processed, result.failed, result.conflicts
            );
            for error in &result.errors {
                println!("  {} ({:?}): {}", error.operation_id, error.kind, error.message);
            }
        }
        Commands::Clear => {
            let cleared = offline_sync.clear_pending().await?;
            println!("cleared {cleared} operation(s)");
        }
        Commands::Static { command } => match command {
            StaticCommands::Check => {
                let check = static_data.check_for_updates().await?;
                println!("ingredients: {}", if check.ingredients { "stale" } else { "current" });
                println!("beer styles: {}", if check.beer_styles { "stale" } else { "current" });
            }
            StaticCommands::Update { dataset } => {
                let datasets = match dataset {
                    Some(raw) => vec![parse_dataset(&raw)?],
                    None => StaticDataset::ALL.to_vec(),
                };
                for dataset in datasets {
                    let snapshot = static_data.update_cache(dataset).await?;
                    println!("{}: {} items at {}", dataset, snapshot.len(), snapshot.version);
                }
            }
        },
    }

    Ok(())
}
