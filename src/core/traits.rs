//! Core traits - Venue, storage and sink contracts the engines consume polymorphically

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::core::{Result, types::*};

/// Lazy, non-restartable sequence of ticks for one subscribed symbol.
///
/// Ends when the symbol is unsubscribed or the adapter shuts down. An `Err`
/// item means the feed itself failed.
pub type TickerStream = BoxStream<'static, Result<Ticker>>;

/// Exchange capability contract - implemented by every venue adapter
#[async_trait]
pub trait ExchangeInterface: Send + Sync {
    /// Registration key used by the aggregator and router
    fn name(&self) -> &str;

    /// Whether `connect` has completed and `disconnect` has not
    fn is_connected(&self) -> bool;

    /// Establish venue sessions (idempotent)
    async fn connect(&self) -> Result<()>;

    /// Release venue sessions (idempotent)
    async fn disconnect(&self) -> Result<()>;

    /// Start streaming ticker data for a symbol
    async fn subscribe_ticker(&self, symbol: &Symbol) -> Result<()>;

    /// Stop the ticker stream for a symbol
    async fn unsubscribe_ticker(&self, symbol: &Symbol) -> Result<()>;

    /// Tick stream for a subscribed symbol
    fn ticker_stream(&self, symbol: &Symbol) -> Result<TickerStream>;

    /// Latest account balances
    async fn fetch_balances(&self) -> Result<Vec<BalanceSnapshot>>;

    /// Submit an order
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderStatus>;

    /// Cancel an existing order
    async fn cancel_order(&self, exchange_order_id: &str, symbol: Option<&Symbol>) -> Result<OrderStatus>;

    /// All open orders, optionally for one symbol
    async fn fetch_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<OrderStatus>>;
}

/// Connected flag shared by adapter implementations
#[derive(Debug, Default)]
pub struct ConnectionState {
    connected: AtomicBool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_connected(&self) {
        self.connected.store(true, Ordering::Release);
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

/// Polled market data source used by the harvester
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Venue id (e.g., "binance")
    fn id(&self) -> &str;

    /// Current ticker
    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker>;

    /// Up to `limit` candles opening at or after `since_ms`, ascending
    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>>;
}

/// Builds and primes a market data source for a venue id
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn bootstrap(&self, venue_id: &str) -> Result<Arc<dyn MarketDataSource>>;
}

/// One record of an ordered stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub id: u64,
    pub fields: StreamFields,
}

/// Where a stream read starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCursor {
    /// Only entries appended after the read begins
    Latest,
    /// Entries with an id greater than this one
    After(u64),
}

/// Append-only, approximately length-bounded ordered sink
#[async_trait]
pub trait StreamSink: Send + Sync {
    /// Append a record; the stream may retain slightly more than `max_len`
    async fn append(&self, key: &str, fields: StreamFields, max_len: usize) -> Result<u64>;

    /// Up to `count` entries after `cursor`, waiting up to `block` when none are ready
    async fn read_since(
        &self,
        key: &str,
        cursor: StreamCursor,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;

    /// The most recent `count` entries, oldest first
    async fn tail(&self, key: &str, count: usize) -> Result<Vec<StreamEntry>>;

    /// Release the sink; later appends fail
    async fn close(&self) -> Result<()>;
}

/// Persistent OHLCV storage with (symbol, ts) upsert semantics
pub trait CandleStore: Send + Sync {
    /// Insert or replace; returns rows written
    fn upsert(&self, symbol: &Symbol, candles: &[Candle]) -> Result<usize>;

    /// Most recent `limit` candles in ascending time order
    fn load_recent(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Candle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        let state = ConnectionState::new();
        assert!(!state.is_connected());
        state.mark_connected();
        state.mark_connected();
        assert!(state.is_connected());
        state.mark_disconnected();
        assert!(!state.is_connected());
    }
}
