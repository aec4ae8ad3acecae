//! Signal aggregator - fan-in of venue tick streams into one deduplicated stream
//!
//! One consumer task per (venue, symbol). Each task drains its adapter's
//! ticker stream, drops ticks whose fingerprint was published within the
//! dedup window, and appends the rest to the configured stream key.

pub mod dedup;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::{StreamExt, TryStreamExt};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::core::{
    Config, ExchangeInterface, Result, StreamCursor, StreamEntry, StreamSink, Symbol, Ticker,
    TickerStream,
};

pub use dedup::DedupWindow;

/// Aggregator tuning, built once from [`Config`]
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub stream_key: String,
    pub stream_max_len: usize,
    pub dedup_ttl: Duration,
    pub dedup_sweep_interval: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            stream_key: "veridian:ticks".to_string(),
            stream_max_len: 2048,
            dedup_ttl: Duration::from_millis(250),
            dedup_sweep_interval: Duration::from_secs(30),
        }
    }
}

impl AggregatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream_key: config.stream.key.clone(),
            stream_max_len: config.stream.max_len,
            dedup_ttl: Duration::from_millis(config.aggregator.dedup_ttl_ms),
            dedup_sweep_interval: Duration::from_secs(config.aggregator.dedup_sweep_secs),
        }
    }
}

struct Registration {
    exchange: Arc<dyn ExchangeInterface>,
    symbols: Vec<Symbol>,
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

/// Everything a consumer task needs to publish, cloned per task
#[derive(Clone)]
struct Publisher {
    sink: Arc<dyn StreamSink>,
    stream_key: Arc<str>,
    max_len: usize,
    dedup: Arc<parking_lot::Mutex<DedupWindow>>,
    published: Arc<AtomicU64>,
}

impl Publisher {
    async fn publish(&self, tick: Ticker) {
        let fingerprint = tick.fingerprint();
        let duplicate = self.dedup.lock().is_duplicate(&fingerprint, Instant::now());
        if duplicate {
            trace!(%fingerprint, "dropping duplicate tick");
            return;
        }

        match self
            .sink
            .append(&self.stream_key, tick.to_stream_payload(), self.max_len)
            .await
        {
            Ok(id) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                trace!(%fingerprint, id, "published tick");
            }
            Err(e) => error!(%fingerprint, "Failed to publish tick: {}", e),
        }
    }
}

/// Signal aggregation engine
pub struct SignalAggregator {
    settings: AggregatorSettings,
    publisher: Publisher,
    registrations: Mutex<HashMap<String, Registration>>,
    shutdown: watch::Sender<bool>,
}

impl SignalAggregator {
    pub fn new(sink: Arc<dyn StreamSink>, settings: AggregatorSettings) -> Self {
        let publisher = Publisher {
            sink,
            stream_key: Arc::from(settings.stream_key.as_str()),
            max_len: settings.stream_max_len,
            dedup: Arc::new(parking_lot::Mutex::new(DedupWindow::new(
                settings.dedup_ttl,
                settings.dedup_sweep_interval,
            ))),
            published: Arc::new(AtomicU64::new(0)),
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            settings,
            publisher,
            registrations: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    /// Connect `exchange`, subscribe `symbols` and start one consumer per symbol.
    ///
    /// All-or-nothing: when any subscription fails, the symbols subscribed so
    /// far are unsubscribed, the adapter is disconnected and the error is
    /// returned with no consumer left running.
    pub async fn register_exchange(
        &self,
        exchange: Arc<dyn ExchangeInterface>,
        symbols: &[Symbol],
    ) -> Result<()> {
        let name = exchange.name().to_string();
        let mut unique: Vec<Symbol> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !unique.contains(symbol) {
                unique.push(symbol.clone());
            }
        }

        exchange.connect().await?;

        let mut subscribed = Vec::with_capacity(unique.len());
        let streams = match open_streams(&exchange, &unique, &mut subscribed).await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(venue = %name, "Registration failed, rolling back: {}", e);
                for symbol in &subscribed {
                    if let Err(unsub) = exchange.unsubscribe_ticker(symbol).await {
                        debug!(venue = %name, %symbol, "rollback unsubscribe failed: {}", unsub);
                    }
                }
                if let Err(disc) = exchange.disconnect().await {
                    debug!(venue = %name, "rollback disconnect failed: {}", disc);
                }
                return Err(e);
            }
        };

        let (cancel, _) = watch::channel(false);
        let tasks = streams
            .into_iter()
            .map(|(symbol, stream)| {
                tokio::spawn(consume(
                    name.clone(),
                    symbol,
                    stream,
                    self.publisher.clone(),
                    cancel.subscribe(),
                    self.shutdown.subscribe(),
                ))
            })
            .collect();

        let registration = Registration {
            exchange,
            symbols: unique,
            cancel,
            tasks,
        };
        info!(venue = %name, symbols = registration.symbols.len(), "exchange registered");

        let mut registrations = self.registrations.lock().await;
        if registrations.insert(name.clone(), registration).is_some() {
            warn!(venue = %name, "replaced an existing registration without deregistering it");
        }
        Ok(())
    }

    /// Unsubscribe, cancel and await every consumer, then disconnect.
    /// Unknown names are a no-op.
    pub async fn deregister_exchange(&self, name: &str) -> Result<()> {
        let Some(registration) = self.registrations.lock().await.remove(name) else {
            debug!(venue = name, "deregister: not registered");
            return Ok(());
        };
        let Registration {
            exchange,
            symbols,
            cancel,
            tasks,
        } = registration;

        for symbol in &symbols {
            if let Err(e) = exchange.unsubscribe_ticker(symbol).await {
                debug!(venue = name, %symbol, "unsubscribe failed during teardown: {}", e);
            }
        }

        let _ = cancel.send(true);
        for task in tasks {
            if let Err(e) = task.await {
                error!(venue = name, "consumer task aborted: {}", e);
            }
        }

        exchange.disconnect().await?;
        info!(venue = name, "exchange deregistered");
        Ok(())
    }

    /// Stop accepting ticks, tear down every venue and close the sink.
    pub async fn shutdown(&self) -> Result<()> {
        let _ = self.shutdown.send(true);

        let names: Vec<String> = self.registrations.lock().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.deregister_exchange(&name).await {
                warn!(venue = %name, "disconnect failed during shutdown: {}", e);
            }
        }

        self.publisher.sink.close().await?;
        info!(published = self.published_count(), "aggregator stopped");
        Ok(())
    }

    /// Recent stream entries for polling consumers.
    ///
    /// `block_ms == 0` returns the newest `count` entries immediately;
    /// otherwise waits up to `block_ms` for entries appended after the call.
    pub async fn stream_ticks(&self, count: usize, block_ms: u64) -> Result<Vec<StreamEntry>> {
        let sink = &self.publisher.sink;
        if block_ms == 0 {
            sink.tail(&self.settings.stream_key, count).await
        } else {
            sink.read_since(
                &self.settings.stream_key,
                StreamCursor::Latest,
                count,
                Duration::from_millis(block_ms),
            )
            .await
        }
    }

    pub async fn registered_venues(&self) -> Vec<String> {
        let mut venues: Vec<String> = self.registrations.lock().await.keys().cloned().collect();
        venues.sort();
        venues
    }

    pub fn published_count(&self) -> u64 {
        self.publisher.published.load(Ordering::Relaxed)
    }
}

async fn open_streams(
    exchange: &Arc<dyn ExchangeInterface>,
    symbols: &[Symbol],
    subscribed: &mut Vec<Symbol>,
) -> Result<Vec<(Symbol, TickerStream)>> {
    let mut streams = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        exchange.subscribe_ticker(symbol).await?;
        subscribed.push(symbol.clone());
        streams.push((symbol.clone(), exchange.ticker_stream(symbol)?));
    }
    Ok(streams)
}

async fn consume(
    venue: String,
    symbol: Symbol,
    mut stream: TickerStream,
    publisher: Publisher,
    mut cancel: watch::Receiver<bool>,
    shutdown: watch::Receiver<bool>,
) {
    debug!(%venue, %symbol, "consumer started");
    loop {
        let next = tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(tick)) => {
                if *shutdown.borrow() {
                    break;
                }
                publisher.publish(tick).await;
            }
            Some(Err(e)) => {
                error!(%venue, %symbol, "Ticker feed failed: {}", e);
                break;
            }
            None => {
                debug!(%venue, %symbol, "ticker stream ended");
                break;
            }
        }
    }
    debug!(%venue, %symbol, "consumer stopped");
}

/// Collect a ticker stream until it ends, failing on the first error item.
pub async fn drain(stream: TickerStream) -> Result<Vec<Ticker>> {
    stream.try_collect().await
}
