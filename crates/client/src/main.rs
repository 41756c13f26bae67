use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use augustus_client::ingest::{IngestReport, IngestStatus};
use augustus_client::storage::{KeyValueStore, MemoryStore, SqliteStore};
use augustus_client::{
    ApiClient, Backend, ClientConfig, ConversationCache, EventSender, Orchestrator, SessionGate, ui,
};

#[derive(Parser)]
#[command(name = "augustus", version, about = "Terminal client for Augustus video Q&A")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat,
    /// List cached conversations
    History {
        /// Forget all cached conversations
        #[arg(long)]
        clear: bool,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Wait until the gateway reports healthy
    Ready {
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    SetServer { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let mut config = ClientConfig::load().context("Failed to load config")?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let orchestrator = build(&config)?;
            ui::interactive_chat(Arc::new(orchestrator)).await?;
        }
        Commands::History { clear } => {
            let cache = open_cache(&config);
            if clear {
                cache.clear();
                println!("Cleared cached conversations.");
            } else {
                ui::print_conversations(&cache.list());
            }
        }
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                println!("Current config:");
                println!("  Server URL: {}", config.server_url);
                println!("  Storage: {}", config.storage_path()?.display());
                println!("  Cache capacity: {}", config.cache_capacity);
                println!("  Sign-out delay: {}ms", config.sign_out_delay_ms);
            }
            ConfigAction::SetServer { url } => {
                config.set_server_url(&url).context("Failed to update server URL")?;
                println!("Server URL updated to: {}", config.server_url);
            }
        },
        Commands::Ready { timeout_secs } => {
            let client = ApiClient::new(&config.server_url)?;
            let poll = config.ingest_poll(timeout_secs.map(Duration::from_secs));
            let report = poll
                .run(
                    || {
                        let client = client.clone();
                        async move { client.health().await.map(|body| IngestReport::from_health(&body)) }
                    },
                    |report| println!("{}", report.status.label()),
                )
                .await;

            if report.status == IngestStatus::Error {
                anyhow::bail!(
                    "{} is not ready: {}",
                    config.server_url,
                    report.message.unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_cache(config: &ClientConfig) -> ConversationCache {
    let store: Arc<dyn KeyValueStore> = match config
        .storage_path()
        .map_err(anyhow::Error::from)
        .and_then(|path| SqliteStore::open(&path).map_err(anyhow::Error::from))
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "could not open conversation storage; history will not persist");
            Arc::new(MemoryStore::new())
        }
    };
    ConversationCache::new(store, config.cache_capacity)
}

fn build(config: &ClientConfig) -> Result<Orchestrator> {
    let backend: Arc<dyn Backend> = Arc::new(
        ApiClient::new(&config.server_url).context("Failed to create HTTP client")?,
    );
    let events = EventSender::default();
    let session = Arc::new(SessionGate::new(Arc::clone(&backend), events.clone()));

    Ok(Orchestrator::new(
        backend,
        Arc::new(open_cache(config)),
        session,
        events,
        config.orchestrator(),
    ))
}
