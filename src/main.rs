use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use veridian::aggregator::{AggregatorSettings, SignalAggregator};
use veridian::core::config::RunMode;
use veridian::core::{ExchangeInterface, Symbol, Ticker, Timeframe};
use veridian::exchanges::PaperExchange;
use veridian::execution::OrderRouter;
use veridian::feeds::RestSourceFactory;
use veridian::harvester::{DataHarvester, HarvesterSettings};
use veridian::storage::{MemoryStream, SqliteCandleStore};
use veridian::Config;

/// Half-spread applied when bridging harvested prices into the paper venue
const PAPER_HALF_SPREAD: f64 = 0.0001;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and config
    dotenv::dotenv().ok();

    let mut config = Config::load_default();
    config.apply_env()?;
    config.validate()?;

    // 2. Logger
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},veridian=debug", config.app.log_level)));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!("Veridian starting in {:?} mode", config.app.mode);
    if config.app.mode == RunMode::Live {
        tracing::warn!("No live order adapters are configured, orders route to the paper venue");
    }

    // 3. Harvester over the OHLCV store and REST venues
    let db_path = config.db_path();
    let store = Arc::new(SqliteCandleStore::open(&db_path)?);
    tracing::info!("OHLCV store at {}", db_path.display());

    let factory = Arc::new(RestSourceFactory::new()?);
    let harvester = Arc::new(
        DataHarvester::bootstrap(HarvesterSettings::from_config(&config), factory, store).await?,
    );
    tracing::info!(
        "Harvester mode: {:?}, host: {:?}",
        harvester.mode(),
        harvester.environment()
    );

    // 4. Aggregator, router and the paper venue
    let sink = Arc::new(MemoryStream::new());
    let aggregator = Arc::new(SignalAggregator::new(
        sink,
        AggregatorSettings::from_config(&config),
    ));
    let router = OrderRouter::new();

    let paper = Arc::new(PaperExchange::new("paper"));
    let symbols: Vec<Symbol> = config
        .harvester
        .symbols
        .iter()
        .filter_map(|s| match Symbol::parse(s) {
            Ok(symbol) => Some(symbol),
            Err(e) => {
                tracing::warn!("Ignoring tracked symbol: {}", e);
                None
            }
        })
        .collect();

    aggregator.register_exchange(paper.clone(), &symbols).await?;
    router.register_exchange(paper.clone()).await;
    tracing::info!("Routing venues: {:?}", router.venues());

    // 5. Background tasks
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn({
        let harvester = harvester.clone();
        let shutdown = shutdown_rx.clone();
        async move { harvester.cycle_pairs(shutdown).await }
    }));

    // harvested prices drive the paper venue's ticker feeds
    tasks.push(tokio::spawn({
        let subscription = harvester.register();
        let paper = paper.clone();
        let mut shutdown = shutdown_rx.clone();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    update = subscription.rx.recv_async() => {
                        let Ok(update) = update else { break };
                        let tick = Ticker::new(
                            paper.name(),
                            update.symbol.clone(),
                            update.price * (1.0 - PAPER_HALF_SPREAD),
                            update.price * (1.0 + PAPER_HALF_SPREAD),
                            update.price,
                        );
                        if let Err(e) = paper.push_tick(tick) {
                            tracing::debug!("Paper tick dropped: {}", e);
                        }
                    }
                }
            }
        }
    }));

    if let Some(symbol) = config.harvester.boot_backfill_symbol.clone() {
        let days = config.harvester.boot_backfill_days;
        let harvester = harvester.clone();
        tasks.push(tokio::spawn(async move {
            match harvester.backfill_history(&symbol, days, Timeframe::H1).await {
                Ok(written) => tracing::info!("Boot backfill of {} wrote {} candles", symbol, written),
                Err(e) => tracing::error!("Boot backfill of {} failed: {}", symbol, e),
            }
        }));
    }

    tasks.push(tokio::spawn({
        let aggregator = aggregator.clone();
        let mut shutdown = shutdown_rx.clone();
        async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = interval.tick() => {
                        match aggregator.stream_ticks(1, 0).await {
                            Ok(latest) => tracing::info!(
                                "Published {} ticks, latest: {:?}",
                                aggregator.published_count(),
                                latest.first().map(|e| &e.fields)
                            ),
                            Err(e) => tracing::warn!("Stream read failed: {}", e),
                        }
                    }
                }
            }
        }
    }));

    tracing::info!("Booted {} background tasks. Ctrl-C to stop.", tasks.len());

    // 6. Shutdown
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    aggregator.shutdown().await?;
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("Background task failed: {}", e);
        }
    }

    tracing::info!("Veridian stopped");
    Ok(())
}
