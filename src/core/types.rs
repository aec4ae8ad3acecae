//! Core types - Normalized market data and order payloads shared by every engine

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// Flat string-keyed record appended to the tick stream.
pub type StreamFields = BTreeMap<String, String>;

/// Tradeable symbol (e.g., "BTC/USDT")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Normalize and require the `BASE/QUOTE` shape.
    pub fn parse(s: &str) -> Result<Self> {
        let symbol = Self::new(s);
        match symbol.0.split_once('/') {
            Some((base, quote))
                if !base.is_empty()
                    && !quote.is_empty()
                    && base.chars().all(|c| c.is_ascii_alphanumeric())
                    && quote.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Ok(symbol)
            }
            _ => Err(Error::InvalidSymbol(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.0.split_once('/').map(|(b, _)| b).unwrap_or(&self.0)
    }

    pub fn quote(&self) -> &str {
        self.0.split_once('/').map(|(_, q)| q).unwrap_or("")
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Normalized tick snapshot pushed through the signal aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub exchange: String,
    pub symbol: Symbol,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub timestamp: DateTime<Utc>,
    pub sequence_id: Option<u64>,
    #[serde(default)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl Ticker {
    pub fn new(exchange: impl Into<String>, symbol: Symbol, bid: f64, ask: f64, last: f64) -> Self {
        Self {
            exchange: exchange.into(),
            symbol,
            bid,
            ask,
            last,
            timestamp: Utc::now(),
            sequence_id: None,
            raw: BTreeMap::new(),
        }
    }

    pub fn with_sequence(mut self, sequence_id: u64) -> Self {
        self.sequence_id = Some(sequence_id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_raw(mut self, raw: BTreeMap<String, serde_json::Value>) -> Self {
        self.raw = raw;
        self
    }

    /// Deterministic identifier used for deduplication.
    ///
    /// Falls back to microsecond timestamps when the venue does not sequence
    /// its updates, so two unsequenced ticks in the same microsecond collide.
    pub fn fingerprint(&self) -> String {
        match self.sequence_id {
            Some(seq) => format!("{}:{}:{}", self.exchange, self.symbol, seq),
            None => format!(
                "{}:{}:{}",
                self.exchange,
                self.symbol,
                self.timestamp.timestamp_micros()
            ),
        }
    }

    /// Flatten into a stream record. Timestamps are milliseconds and
    /// absent fields are omitted.
    pub fn to_stream_payload(&self) -> StreamFields {
        let mut payload = StreamFields::new();
        payload.insert("exchange".into(), self.exchange.clone());
        payload.insert("symbol".into(), self.symbol.to_string());
        payload.insert("bid".into(), self.bid.to_string());
        payload.insert("ask".into(), self.ask.to_string());
        payload.insert("last".into(), self.last.to_string());
        payload.insert("ts".into(), self.timestamp.timestamp_millis().to_string());
        if let Some(seq) = self.sequence_id {
            payload.insert("sequence_id".into(), seq.to_string());
        }
        let raw = serde_json::to_string(&self.raw).unwrap_or_else(|_| "{}".to_string());
        payload.insert("raw".into(), raw);
        payload
    }

    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) * 0.5
    }

    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

impl OrderType {
    /// Whether the venue needs a limit price for this type.
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Stop => write!(f, "STOP"),
            OrderType::StopLimit => write!(f, "STOP_LIMIT"),
        }
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled
    #[default]
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
}

/// Normalized order payload for the router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl OrderRequest {
    pub fn market(symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            client_order_id: None,
            time_in_force: TimeInForce::Gtc,
            metadata: BTreeMap::new(),
        }
    }

    pub fn limit(symbol: Symbol, side: Side, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(symbol, side, quantity)
        }
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.client_order_id = Some(id.into());
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

/// Order lifecycle state reported by a venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

/// Execution result for submitted orders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub exchange_order_id: String,
    pub client_order_id: Option<String>,
    pub state: OrderState,
    pub filled_qty: Decimal,
    pub remaining_qty: Decimal,
    pub avg_price: Option<Decimal>,
    #[serde(default)]
    pub raw_response: BTreeMap<String, serde_json::Value>,
}

/// Balance of a single asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl BalanceSnapshot {
    pub fn new(asset: impl Into<String>, free: Decimal, locked: Decimal) -> Self {
        Self {
            asset: asset.into(),
            free,
            locked,
            timestamp: Utc::now(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// OHLCV bar, keyed by (symbol, ts) in storage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time in milliseconds
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Open time in seconds, as charting front-ends expect.
    pub fn time_secs(&self) -> i64 {
        self.ts / 1000
    }
}

/// Candle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn duration_ms(&self) -> i64 {
        const MINUTE: i64 = 60_000;
        match self {
            Timeframe::M1 => MINUTE,
            Timeframe::M5 => 5 * MINUTE,
            Timeframe::M15 => 15 * MINUTE,
            Timeframe::M30 => 30 * MINUTE,
            Timeframe::H1 => 60 * MINUTE,
            Timeframe::H4 => 240 * MINUTE,
            Timeframe::D1 => 1440 * MINUTE,
        }
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(Error::Config(format!("unsupported timeframe: {}", other))),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live price pushed to harvester subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub symbol: Symbol,
    pub price: f64,
    /// Milliseconds since epoch
    pub ts: i64,
}
