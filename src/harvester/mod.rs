//! Market data harvester - historical candles and live prices with venue failover
//!
//! Venues are tried in priority order. Transient venue errors move the chain
//! to the next venue; once every venue is exhausted the harvester serves
//! synthetic data. Price and candle reads fail only on bad input, such as a
//! pair no venue lists or has a usable quote for, or on storage trouble.

pub mod failover;
pub mod subscribers;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::core::{
    Candle, CandleStore, Config, Error, MarketDataSource, PriceUpdate, Result, SourceFactory,
    Symbol, Timeframe, config::TOP_20_PAIRS,
};
use crate::feeds::SyntheticFeed;

pub use failover::{FeedMode, VenueChain};
pub use subscribers::{SubscriberSet, Subscription};

const DAY_MS: i64 = 86_400_000;

/// Harvester tuning, built once from [`Config`]
#[derive(Debug, Clone)]
pub struct HarvesterSettings {
    /// Venue priority list, most preferred first
    pub exchanges: Vec<String>,
    /// Symbols the broadcast loop polls
    pub symbols: Vec<String>,
    pub poll_interval: Duration,
    pub subscriber_capacity: usize,
    pub page_size: usize,
    /// Hard cap on candles written by one backfill
    pub max_backfill: usize,
}

impl Default for HarvesterSettings {
    fn default() -> Self {
        Self {
            exchanges: vec!["binance".into(), "binanceus".into(), "mexc".into()],
            symbols: TOP_20_PAIRS.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_secs(5),
            subscriber_capacity: 256,
            page_size: 1000,
            max_backfill: 10_000,
        }
    }
}

impl HarvesterSettings {
    pub fn from_config(config: &Config) -> Self {
        let h = &config.harvester;
        Self {
            exchanges: h.exchanges.clone(),
            symbols: h.symbols.clone(),
            poll_interval: Duration::try_from_secs_f64(h.poll_interval_secs)
                .unwrap_or(Duration::from_secs(5)),
            subscriber_capacity: h.subscriber_capacity,
            page_size: h.page_size.max(1),
            max_backfill: h.max_backfill,
        }
    }
}

/// Host facts pushed to subscribers on connect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEnvironment {
    pub system: String,
    pub is_windows: bool,
    pub docker_profile: String,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        let system = match std::env::consts::OS {
            "windows" => "Windows".to_string(),
            "linux" => "Linux".to_string(),
            "macos" => "Darwin".to_string(),
            other => other.to_string(),
        };
        let is_windows = cfg!(windows);
        Self {
            system,
            is_windows,
            docker_profile: if is_windows { "docker-desktop" } else { "native" }.to_string(),
        }
    }
}

/// Market data harvester
pub struct DataHarvester {
    settings: HarvesterSettings,
    factory: Arc<dyn SourceFactory>,
    store: Arc<dyn CandleStore>,
    chain: Mutex<VenueChain>,
    mode: watch::Receiver<FeedMode>,
    subscribers: SubscriberSet,
    synthetic: SyntheticFeed,
    environment: HostEnvironment,
}

impl DataHarvester {
    /// Bring up the first reachable venue, or start in mock mode.
    ///
    /// Fails only on an empty priority list.
    pub async fn bootstrap(
        settings: HarvesterSettings,
        factory: Arc<dyn SourceFactory>,
        store: Arc<dyn CandleStore>,
    ) -> Result<Self> {
        let mut chain = VenueChain::new(settings.exchanges.clone())?;
        let mode = chain.bootstrap(factory.as_ref()).await;
        let environment = HostEnvironment::detect();
        info!(?mode, system = %environment.system, "harvester ready");

        Ok(Self {
            subscribers: SubscriberSet::new(settings.subscriber_capacity),
            mode: chain.subscribe_mode(),
            chain: Mutex::new(chain),
            settings,
            factory,
            store,
            synthetic: SyntheticFeed::new(),
            environment,
        })
    }

    pub fn settings(&self) -> &HarvesterSettings {
        &self.settings
    }

    pub fn mode(&self) -> FeedMode {
        self.mode.borrow().clone()
    }

    /// Mode changes, for transports that surface degraded data
    pub fn watch_mode(&self) -> watch::Receiver<FeedMode> {
        self.mode.clone()
    }

    pub fn environment(&self) -> &HostEnvironment {
        &self.environment
    }

    pub fn register(&self) -> Subscription {
        self.subscribers.register()
    }

    pub fn unregister(&self, id: u64) -> bool {
        self.subscribers.unregister(id)
    }

    /// Returns how many subscribers accepted the update
    pub fn broadcast(&self, update: &PriceUpdate) -> usize {
        self.subscribers.broadcast(update)
    }

    async fn active_source(&self) -> Option<(usize, Arc<dyn MarketDataSource>)> {
        self.chain.lock().await.active()
    }

    async fn fail_over(&self, failed: usize, tried: &mut HashSet<usize>) -> FeedMode {
        let mut chain = self.chain.lock().await;
        chain.fail_over(self.factory.as_ref(), failed, tried).await
    }

    /// Latest price for `symbol`, failing over on venue errors.
    ///
    /// Falls back to the synthetic feed once every venue is exhausted.
    pub async fn fetch_live_price(&self, symbol: &str) -> Result<f64> {
        let symbol = Symbol::parse(symbol)?;
        let mut tried = HashSet::new();

        for _ in 0..=self.settings.exchanges.len() {
            let Some((index, source)) = self.active_source().await else {
                break;
            };
            match fetch_price(source.as_ref(), &symbol).await {
                Ok(price) => return Ok(price),
                Err(e) if e.is_transient() => {
                    warn!(venue = source.id(), %symbol, "Price fetch failed: {}", e);
                    let mode = self.fail_over(index, &mut tried).await;
                    debug!(?mode, "after failover");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(self.synthetic.price(&symbol))
    }

    /// Page `days` of history into the store; returns candles written.
    ///
    /// Never writes more than `max_backfill` candles. When no venue yields a
    /// single candle, synthetic candles covering the window are written
    /// instead.
    pub async fn backfill_history(&self, symbol: &str, days: u32, timeframe: Timeframe) -> Result<usize> {
        let symbol = Symbol::parse(symbol)?;
        let step = timeframe.duration_ms();
        let cap = self.settings.max_backfill;
        let now = chrono::Utc::now().timestamp_millis();
        let start = now - i64::from(days) * DAY_MS;

        let mut since = start;
        let mut written = 0usize;
        let mut tried = HashSet::new();

        while written < cap && since < now {
            let Some((index, source)) = self.active_source().await else {
                break;
            };
            let limit = self.settings.page_size.min(cap - written);

            match source.fetch_ohlcv(&symbol, timeframe, since, limit).await {
                Ok(mut candles) => {
                    let short = candles.len() < limit;
                    candles.truncate(cap - written);
                    let Some(last_ts) = candles.last().map(|c| c.ts) else {
                        break;
                    };
                    written += self.persist(&symbol, candles).await?;
                    since = since.max(last_ts + step);
                    trace!(venue = source.id(), %symbol, written, "backfill page stored");
                    if short {
                        break;
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(venue = source.id(), %symbol, "History fetch failed: {}", e);
                    self.fail_over(index, &mut tried).await;
                }
                Err(e) => return Err(e),
            }
        }

        if written == 0 {
            let periods = usize::try_from((now - start) / step).unwrap_or(0).clamp(1, cap.max(1));
            let aligned = start - start.rem_euclid(step);
            let candles = self.synthetic.candles(&symbol, timeframe, aligned, periods);
            written = self.persist(&symbol, candles).await?;
            info!(%symbol, %timeframe, written, "backfilled synthetic candles");
        } else {
            info!(%symbol, %timeframe, days, written, "backfill complete");
        }
        Ok(written)
    }

    /// Most recent `limit` stored candles, ascending. Storage only.
    pub async fn load_ohlcv(&self, symbol: &str, limit: usize) -> Result<Vec<Candle>> {
        let symbol = Symbol::parse(symbol)?;
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load_recent(&symbol, limit))
            .await
            .map_err(|e| Error::InvalidState(format!("candle store task failed: {}", e)))?
    }

    /// Stored candles, backfilling roughly `limit` periods first when there are none.
    pub async fn load_or_generate(&self, symbol: &str, limit: usize, timeframe: Timeframe) -> Result<Vec<Candle>> {
        let candles = self.load_ohlcv(symbol, limit).await?;
        if !candles.is_empty() {
            return Ok(candles);
        }

        let span_ms = i64::try_from(limit).unwrap_or(i64::MAX).saturating_mul(timeframe.duration_ms());
        let days = u32::try_from((span_ms + DAY_MS - 1) / DAY_MS).unwrap_or(u32::MAX).max(1);
        debug!(symbol, days, "no stored candles, backfilling");
        self.backfill_history(symbol, days, timeframe).await?;
        self.load_ohlcv(symbol, limit).await
    }

    /// Poll every tracked symbol each interval and broadcast prices until
    /// `shutdown` flips.
    pub async fn cycle_pairs(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(symbols = self.settings.symbols.len(), "price broadcast loop started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            for symbol in &self.settings.symbols {
                match self.fetch_live_price(symbol).await {
                    Ok(price) => {
                        let update = PriceUpdate {
                            symbol: Symbol::new(symbol.as_str()),
                            price,
                            ts: chrono::Utc::now().timestamp_millis(),
                        };
                        let delivered = self.subscribers.broadcast(&update);
                        trace!(%symbol, price, delivered, "price broadcast");
                    }
                    Err(e) => warn!(%symbol, "Skipping price update: {}", e),
                }
            }
        }
        info!("price broadcast loop stopped");
    }

    async fn persist(&self, symbol: &Symbol, candles: Vec<Candle>) -> Result<usize> {
        let store = self.store.clone();
        let symbol = symbol.clone();
        tokio::task::spawn_blocking(move || store.upsert(&symbol, &candles))
            .await
            .map_err(|e| Error::InvalidState(format!("candle store task failed: {}", e)))?
    }
}

/// A price is only usable when positive and finite. A bad quote is about the
/// pair, not the venue, so it never triggers failover.
async fn fetch_price(source: &dyn MarketDataSource, symbol: &Symbol) -> Result<f64> {
    let ticker = source.fetch_ticker(symbol).await?;
    if ticker.last.is_finite() && ticker.last > 0.0 {
        Ok(ticker.last)
    } else {
        Err(Error::NoQuote(format!(
            "{} returned an unusable price for {}: {}",
            source.id(),
            symbol,
            ticker.last
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Ticker;
    use crate::feeds::rest_client::classify_status;
    use crate::storage::SqliteCandleStore;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Source with a fixed price whose calls can be switched to fail
    struct StubSource {
        id: String,
        price: f64,
        down: AtomicBool,
        full_pages: bool,
        /// Only this pair is listed when set
        listed: Option<String>,
        /// History calls start timing out after this many pages
        page_budget: Option<usize>,
        ticker_calls: AtomicUsize,
        pages: AtomicUsize,
    }

    impl StubSource {
        fn build(id: &str, price: f64, full_pages: bool) -> Self {
            Self {
                id: id.to_string(),
                price,
                down: AtomicBool::new(false),
                full_pages,
                listed: None,
                page_budget: None,
                ticker_calls: AtomicUsize::new(0),
                pages: AtomicUsize::new(0),
            }
        }

        fn new(id: &str, price: f64) -> Arc<Self> {
            Arc::new(Self::build(id, price, false))
        }

        fn failing(id: &str) -> Arc<Self> {
            let source = Self::new(id, 1.0);
            source.down.store(true, Ordering::SeqCst);
            source
        }

        /// Always returns full pages, like a venue with endless history
        fn paging(id: &str, price: f64) -> Arc<Self> {
            Arc::new(Self::build(id, price, true))
        }

        /// Full pages until `pages` have been served, then timeouts
        fn paging_until(id: &str, price: f64, pages: usize) -> Arc<Self> {
            Arc::new(Self {
                page_budget: Some(pages),
                ..Self::build(id, price, true)
            })
        }

        /// Answers like a Binance-compatible venue that only lists `symbol`
        fn listing(id: &str, price: f64, symbol: &str) -> Arc<Self> {
            Arc::new(Self {
                listed: Some(symbol.to_string()),
                ..Self::build(id, price, false)
            })
        }
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        fn id(&self) -> &str {
            &self.id
        }

        async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(Error::VenueUnavailable(format!("{} is down", self.id)));
            }
            if self.listed.as_deref().is_some_and(|listed| listed != symbol.as_str()) {
                return Err(classify_status(
                    &self.id,
                    StatusCode::BAD_REQUEST,
                    r#"{"code":-1121,"msg":"Invalid symbol."}"#,
                ));
            }
            Ok(Ticker::new(self.id.clone(), symbol.clone(), self.price, self.price, self.price))
        }

        async fn fetch_ohlcv(
            &self,
            _symbol: &Symbol,
            timeframe: Timeframe,
            since_ms: i64,
            limit: usize,
        ) -> Result<Vec<Candle>> {
            let served = self.pages.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) || self.page_budget.is_some_and(|budget| served >= budget) {
                return Err(Error::Timeout(format!("{} timed out", self.id)));
            }
            let count = if self.full_pages { limit } else { limit.min(3) };
            Ok((0..count as i64)
                .map(|i| Candle {
                    ts: since_ms + i * timeframe.duration_ms(),
                    open: self.price,
                    high: self.price,
                    low: self.price,
                    close: self.price,
                    volume: 1.0,
                })
                .collect())
        }
    }

    /// Factory over a fixed venue table; ids not in the table never initialize
    struct StubFactory {
        sources: HashMap<String, Arc<StubSource>>,
        bootstraps: SyncMutex<Vec<String>>,
    }

    impl StubFactory {
        fn with(sources: Vec<Arc<StubSource>>) -> Arc<Self> {
            Arc::new(Self {
                sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
                bootstraps: SyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SourceFactory for StubFactory {
        async fn bootstrap(&self, venue_id: &str) -> Result<Arc<dyn MarketDataSource>> {
            self.bootstraps.lock().push(venue_id.to_string());
            match self.sources.get(venue_id) {
                Some(source) => Ok(source.clone()),
                None => Err(Error::VenueUnavailable(format!("{} failed to load markets", venue_id))),
            }
        }
    }

    fn settings(exchanges: &[&str]) -> HarvesterSettings {
        HarvesterSettings {
            exchanges: exchanges.iter().map(|s| s.to_string()).collect(),
            symbols: vec!["BTC/USDT".into()],
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn harvester(exchanges: &[&str], factory: Arc<StubFactory>) -> (DataHarvester, Arc<SqliteCandleStore>) {
        let store = Arc::new(SqliteCandleStore::open_in_memory().unwrap());
        let harvester = DataHarvester::bootstrap(settings(exchanges), factory, store.clone())
            .await
            .unwrap();
        (harvester, store)
    }

    #[tokio::test]
    async fn test_empty_priority_is_config_error() {
        let store = Arc::new(SqliteCandleStore::open_in_memory().unwrap());
        let result = DataHarvester::bootstrap(settings(&[]), StubFactory::with(vec![]), store).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fails_over_to_third_venue() {
        let a = StubSource::failing("a");
        let b = StubSource::failing("b");
        let c = StubSource::new("c", 42.0);
        let factory = StubFactory::with(vec![a.clone(), b.clone(), c.clone()]);
        let (harvester, _) = harvester(&["a", "b", "c"], factory.clone()).await;
        assert_eq!(harvester.mode(), FeedMode::Live { index: 0, venue: "a".into() });

        assert_eq!(harvester.fetch_live_price("BTC/USDT").await.unwrap(), 42.0);
        assert_eq!(harvester.mode(), FeedMode::Live { index: 2, venue: "c".into() });
        assert_eq!(a.ticker_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.ticker_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*factory.bootstraps.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_all_venues_down_serves_synthetic() {
        let factory = StubFactory::with(vec![
            StubSource::failing("a"),
            StubSource::failing("b"),
            StubSource::failing("c"),
        ]);
        let (harvester, _) = harvester(&["a", "b", "c"], factory).await;

        for _ in 0..3 {
            let price = harvester.fetch_live_price("BTC/USDT").await.unwrap();
            assert!(price.is_finite() && price > 0.0);
        }
        assert_eq!(harvester.mode(), FeedMode::Mock);
    }

    #[tokio::test]
    async fn test_uninitializable_venue_starts_in_mock() {
        let (harvester, _) = harvester(&["x"], StubFactory::with(vec![])).await;
        assert!(harvester.mode().is_mock());

        let price = harvester.fetch_live_price("BTC/USDT").await.unwrap();
        assert!(price.is_finite() && price > 0.0);
    }

    #[tokio::test]
    async fn test_unusable_price_stays_on_venue() {
        let a = StubSource::new("a", f64::NAN);
        let b = StubSource::new("b", 7.5);
        let factory = StubFactory::with(vec![a.clone(), b.clone()]);
        let (harvester, _) = harvester(&["a", "b"], factory).await;

        assert!(matches!(
            harvester.fetch_live_price("ETH/USDT").await,
            Err(Error::NoQuote(_))
        ));
        assert_eq!(harvester.mode(), FeedMode::Live { index: 0, venue: "a".into() });
        assert_eq!(b.ticker_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unlisted_symbol_keeps_venue_live() {
        let factory = StubFactory::with(vec![
            StubSource::listing("a", 50_000.0, "BTC/USDT"),
            StubSource::listing("b", 50_000.0, "BTC/USDT"),
        ]);
        let (harvester, _) = harvester(&["a", "b"], factory.clone()).await;
        let live_a = FeedMode::Live { index: 0, venue: "a".into() };

        for _ in 0..3 {
            assert!(matches!(
                harvester.fetch_live_price("MATIC/USDT").await,
                Err(Error::InvalidSymbol(_))
            ));
            assert_eq!(harvester.mode(), live_a);
        }
        assert_eq!(harvester.fetch_live_price("BTC/USDT").await.unwrap(), 50_000.0);
        assert_eq!(*factory.bootstraps.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_invalid_symbol_is_rejected() {
        let (harvester, _) = harvester(&["x"], StubFactory::with(vec![])).await;
        assert!(matches!(
            harvester.fetch_live_price("BTCUSDT").await,
            Err(Error::InvalidSymbol(_))
        ));
        assert!(harvester.backfill_history("", 1, Timeframe::H1).await.is_err());
    }

    #[tokio::test]
    async fn test_backfill_respects_cap() {
        let factory = StubFactory::with(vec![StubSource::paging("a", 100.0)]);
        let (harvester, store) = harvester(&["a"], factory).await;

        let written = harvester.backfill_history("BTC/USDT", 30, Timeframe::M1).await.unwrap();
        assert_eq!(written, 10_000);
        assert_eq!(store.count(&Symbol::new("BTC/USDT")).unwrap(), 10_000);
    }

    #[tokio::test]
    async fn test_backfill_continues_on_next_venue() {
        let a = StubSource::paging_until("a", 100.0, 2);
        let b = StubSource::paging("b", 200.0);
        let factory = StubFactory::with(vec![a.clone(), b.clone()]);
        let (harvester, store) = harvester(&["a", "b"], factory).await;

        let written = harvester.backfill_history("BTC/USDT", 30, Timeframe::M1).await.unwrap();
        assert_eq!(written, 10_000);
        assert_eq!(harvester.mode(), FeedMode::Live { index: 1, venue: "b".into() });

        // real candles only, contiguous across the venue switch
        let candles = store.load_recent(&Symbol::new("BTC/USDT"), 20_000).unwrap();
        assert_eq!(candles.len(), 10_000);
        assert_eq!(candles.iter().filter(|c| c.close == 100.0).count(), 2_000);
        assert_eq!(candles.iter().filter(|c| c.close == 200.0).count(), 8_000);
        assert!(candles.windows(2).all(|w| w[1].ts - w[0].ts == Timeframe::M1.duration_ms()));
    }

    #[tokio::test]
    async fn test_backfill_stops_on_short_page() {
        let factory = StubFactory::with(vec![StubSource::new("a", 10.0)]);
        let (harvester, store) = harvester(&["a"], factory).await;

        let written = harvester.backfill_history("BTC/USDT", 1, Timeframe::H1).await.unwrap();
        assert_eq!(written, 3);
        let candles = store.load_recent(&Symbol::new("BTC/USDT"), 10).unwrap();
        assert!(candles.iter().all(|c| c.close == 10.0));
    }

    #[tokio::test]
    async fn test_backfill_falls_back_to_synthetic() {
        let factory = StubFactory::with(vec![StubSource::failing("a"), StubSource::failing("b")]);
        let (harvester, store) = harvester(&["a", "b"], factory).await;

        let written = harvester.backfill_history("ETH/USDT", 1, Timeframe::H1).await.unwrap();
        assert_eq!(written, 24);
        assert_eq!(store.count(&Symbol::new("ETH/USDT")).unwrap(), 24);
        assert!(harvester.mode().is_mock());
    }

    #[tokio::test]
    async fn test_load_or_generate_backfills_empty_store() {
        let (harvester, _) = harvester(&["x"], StubFactory::with(vec![])).await;
        assert!(harvester.load_ohlcv("SOL/USDT", 48).await.unwrap().is_empty());

        let candles = harvester.load_or_generate("SOL/USDT", 48, Timeframe::H1).await.unwrap();
        assert_eq!(candles.len(), 48);
        assert!(candles.windows(2).all(|w| w[0].ts < w[1].ts));

        // second call is served from storage
        let again = harvester.load_or_generate("SOL/USDT", 48, Timeframe::H1).await.unwrap();
        assert_eq!(again, candles);
    }

    #[tokio::test]
    async fn test_cycle_pairs_broadcasts_until_shutdown() {
        let factory = StubFactory::with(vec![StubSource::new("a", 123.0)]);
        let (harvester, _) = harvester(&["a"], factory).await;
        let harvester = Arc::new(harvester);
        let subscription = harvester.register();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let harvester = harvester.clone();
            async move { harvester.cycle_pairs(shutdown_rx).await }
        });

        let update = tokio::time::timeout(Duration::from_secs(2), subscription.rx.recv_async())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.symbol.as_str(), "BTC/USDT");
        assert_eq!(update.price, 123.0);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stalled_subscriber_is_dropped() {
        let (harvester, _) = harvester(&["x"], StubFactory::with(vec![])).await;
        let mut tight = settings(&["x"]);
        tight.subscriber_capacity = 1;
        let harvester = DataHarvester {
            subscribers: SubscriberSet::new(tight.subscriber_capacity),
            settings: tight,
            ..harvester
        };

        let _stalled = harvester.register();
        let update = PriceUpdate {
            symbol: Symbol::new("BTC/USDT"),
            price: 1.0,
            ts: 0,
        };
        assert_eq!(harvester.broadcast(&update), 1);
        assert_eq!(harvester.broadcast(&update), 0);
        assert_eq!(harvester.broadcast(&update), 0);
    }

    #[test]
    fn test_host_environment() {
        let env = HostEnvironment::detect();
        assert_eq!(env.is_windows, cfg!(windows));
        let expected = if cfg!(windows) { "docker-desktop" } else { "native" };
        assert_eq!(env.docker_profile, expected);
        assert!(!env.system.is_empty());
    }
}
