//! Signal Engine - one long-horizon evaluation batch per invocation
//!
//! 1. Loads configuration (file + SIGNAL_ENGINE__* env)
//! 2. Connects to Postgres and applies migrations
//! 3. Evaluates every eligible instrument against the score providers
//! 4. Prints the run summary as JSON

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};

use signal_engine::repository::{
    init_db, PgInstrumentRepository, PgSignalRepository, PgTradingSignalSink,
};
use signal_engine::{
    BatchOrchestrator, Dimension, HttpScoreProvider, ScoreProviders, ServiceConfig, ShutdownSignal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting Signal Engine...");

    let config = ServiceConfig::load()?;
    info!(
        pool_size = config.engine.pool_size,
        timeout_ms = config.engine.instrument_timeout_ms,
        "Configuration loaded"
    );

    info!("Connecting to database...");
    let db = init_db(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    info!("✓ Migrations applied");

    let request_timeout = Duration::from_secs(config.providers.request_timeout_secs);
    let providers = ScoreProviders {
        fundamental: Arc::new(HttpScoreProvider::new(
            Dimension::Fundamental,
            &config.providers.fundamental_url,
            request_timeout,
        )?),
        technical: Arc::new(HttpScoreProvider::new(
            Dimension::Technical,
            &config.providers.technical_url,
            request_timeout,
        )?),
        sentiment: Arc::new(HttpScoreProvider::new(
            Dimension::Sentiment,
            &config.providers.sentiment_url,
            request_timeout,
        )?),
    };

    let orchestrator = BatchOrchestrator::new(
        config.engine,
        providers,
        Arc::new(PgInstrumentRepository::new(db.clone())),
        Arc::new(PgSignalRepository::new(db.clone())),
        Arc::new(PgTradingSignalSink::new(db)),
    )?;

    let shutdown = ShutdownSignal::new();
    let listener = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown requested, no new instruments will start");
            listener.trigger();
        }
    });

    let summary = orchestrator.run(&shutdown).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
