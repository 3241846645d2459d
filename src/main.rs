use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;
use willowbot::api::{KrakenClient, OrderGateway, PaperGateway};
use willowbot::config::{Credentials, Settings, TickBackend};
use willowbot::db::PostgresPersistence;
use willowbot::execution::{Evaluator, ExecutionOrchestrator};
use willowbot::feed::{OwnTradesListener, StreamIngestor, WsTransport};
use willowbot::persistence::{
    MemoryAuditLog, MemoryTickStore, OrderJournal, RedisTickStore, ScoreStore, TickStore,
};
use willowbot::shutdown;

#[derive(Parser)]
#[command(author, version, about = "Kraken ticker ingestion and signal pipeline", long_about = None)]
struct Cli {
    /// TOML settings file (defaults to ./willow.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Pairs to track, comma separated (e.g. "XBT/USD,ETH/USD")
    #[arg(short, long, value_delimiter = ',')]
    pairs: Option<Vec<String>>,

    /// Log orders instead of sending them
    #[arg(long)]
    paper: bool,
}

/// Durable score/order history, or the in-memory fallback
struct AuditStores {
    scores: Arc<dyn ScoreStore>,
    journal: Arc<dyn OrderJournal>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to load settings")?;
    if let Some(pairs) = cli.pairs {
        settings.pairs = pairs.into_iter().map(|p| p.trim().to_string()).collect();
    }
    if cli.paper {
        settings.paper_trading = true;
    }
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid settings")?;

    tracing::info!("🚀 Willowbot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Pairs: {}", settings.pairs.join(", "));
    tracing::info!("  Evaluation every {}s", settings.evaluation.interval_secs);
    tracing::info!("  Score threshold: {}", settings.evaluation.score_threshold);
    tracing::info!("  Notional per trade: {}", settings.evaluation.notional_per_trade);
    tracing::info!("  Tick store: {:?}", settings.storage.tick_backend);
    tracing::info!(
        "  Mode: {}",
        if settings.paper_trading { "PAPER" } else { "LIVE" }
    );

    let postgres = connect_to_postgres(settings.storage.database_url.as_deref()).await;
    let ticks = build_tick_store(&settings, postgres.as_ref()).await?;
    let audit = build_audit_stores(postgres.as_ref());
    let gateway = build_gateway(&settings)?;

    let ingestor = StreamIngestor::new(Arc::new(WsTransport::new(&settings.feed.public_url)), ticks.clone())
        .with_reconnect_delay(Duration::from_secs(settings.feed.reconnect_delay_secs));

    let evaluator = Evaluator::new(
        ticks,
        audit.scores,
        audit.journal,
        gateway.clone(),
        &settings.evaluation,
    );

    let mut orchestrator = ExecutionOrchestrator::new(
        Arc::new(ingestor),
        Arc::new(evaluator),
        Duration::from_secs(settings.evaluation.interval_secs),
    );

    if settings.private_feed {
        if settings.paper_trading {
            tracing::warn!("Private feed requested in paper mode; skipping it");
        } else {
            let listener = OwnTradesListener::new(
                Arc::new(WsTransport::new(&settings.feed.private_url)),
                gateway,
            )
            .with_reconnect_delay(Duration::from_secs(settings.feed.reconnect_delay_secs));
            orchestrator = orchestrator.with_own_trades(Arc::new(listener));
        }
    }

    let (trigger, signal) = shutdown::channel();
    let pairs = settings.pairs.clone();
    let running = tokio::spawn(async move { orchestrator.run(pairs, signal).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("\n🛑 Shutdown requested, stopping loops...");
    trigger.trigger();

    running.await.context("Orchestrator task failed")?;
    tracing::info!("👋 Willowbot stopped");

    Ok(())
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("willowbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn connect_to_postgres(database_url: Option<&str>) -> Option<PostgresPersistence> {
    let database_url = database_url?;

    match PostgresPersistence::new(database_url).await {
        Ok(p) => {
            tracing::info!("Postgres persistence enabled (scores & orders)");
            Some(p)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to connect to Postgres ({}), continuing with in-memory history",
                e
            );
            None
        }
    }
}

async fn build_tick_store(
    settings: &Settings,
    postgres: Option<&PostgresPersistence>,
) -> Result<Arc<dyn TickStore>> {
    let store: Arc<dyn TickStore> = match settings.storage.tick_backend {
        TickBackend::Memory => Arc::new(MemoryTickStore::new()),
        TickBackend::Redis => Arc::new(
            RedisTickStore::new(&settings.storage.redis_url)
                .await
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to connect to Redis")?,
        ),
        TickBackend::Postgres => match postgres {
            Some(p) => Arc::new(p.clone()),
            None => anyhow::bail!("tick_backend = \"postgres\" requires a reachable database_url"),
        },
    };

    Ok(store)
}

fn build_audit_stores(postgres: Option<&PostgresPersistence>) -> AuditStores {
    match postgres {
        Some(p) => AuditStores {
            scores: Arc::new(p.clone()),
            journal: Arc::new(p.clone()),
        },
        None => {
            let memory = MemoryAuditLog::new();
            AuditStores {
                scores: Arc::new(memory.clone()),
                journal: Arc::new(memory),
            }
        }
    }
}

fn build_gateway(settings: &Settings) -> Result<Arc<dyn OrderGateway>> {
    if settings.paper_trading {
        tracing::info!("📝 Paper trading: orders are logged, not sent");
        return Ok(Arc::new(PaperGateway::new()));
    }

    let credentials = Credentials::from_env()
        .context("KRAKEN_API_KEY and KRAKEN_API_SECRET must be set for live trading (or use --paper)")?;

    let client = KrakenClient::new(
        &settings.exchange.rest_url,
        Some(credentials),
        settings.exchange.requests_per_minute,
    )?;

    Ok(Arc::new(client))
}
