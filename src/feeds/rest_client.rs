//! REST client for market data - Binance-compatible public endpoints

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, info};

use crate::core::{
    Candle, Error, MarketDataSource, Result, SourceFactory, Symbol, Ticker, Timeframe,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// REST market data source for one venue
pub struct RestMarketSource {
    id: String,
    base_url: String,
    client: reqwest::Client,
}

impl RestMarketSource {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            client,
        }
    }

    /// Cheap reachability probe
    pub async fn ping(&self) -> Result<()> {
        self.get_json("/v3/ping", &[]).await.map(|_| ())
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<Value>().await?);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify_status(&self.id, status, &body))
    }
}

/// Binance error code for a pair the venue does not list
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Map a failed HTTP status onto the error taxonomy.
///
/// Only throttling, server faults and denied access are venue-wide; anything
/// else the venue refuses is about this one request.
pub fn classify_status(venue: &str, status: StatusCode, body: &str) -> Error {
    // 418 is Binance's IP-ban escalation of 429, 451 its region block
    match status.as_u16() {
        429 | 418 | 403 | 451 => Error::VenueUnavailable(format!("{} returned {}", venue, status)),
        _ if status.is_server_error() => Error::VenueUnavailable(format!("{} returned {}", venue, status)),
        400 if is_unknown_symbol(body) => {
            Error::InvalidSymbol(format!("{} does not list the pair: {}", venue, body))
        }
        _ => Error::Rejected(format!("{} returned {}: {}", venue, status, body)),
    }
}

fn is_unknown_symbol(body: &str) -> bool {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["code"].as_i64());
    code == Some(INVALID_SYMBOL_CODE) || body.to_ascii_lowercase().contains("invalid symbol")
}

/// "BTC/USDT" -> "BTCUSDT"
pub fn venue_symbol(symbol: &Symbol) -> String {
    format!("{}{}", symbol.base(), symbol.quote())
}

fn parse_number(v: &Value) -> Option<f64> {
    match v {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parse one `/v3/klines` row: `[openTime, "open", "high", "low", "close", "volume", ...]`
pub fn parse_kline(row: &Value) -> Option<Candle> {
    let row = row.as_array()?;
    Some(Candle {
        ts: row.first()?.as_i64()?,
        open: parse_number(row.get(1)?)?,
        high: parse_number(row.get(2)?)?,
        low: parse_number(row.get(3)?)?,
        close: parse_number(row.get(4)?)?,
        volume: parse_number(row.get(5)?)?,
    })
}

#[async_trait]
impl MarketDataSource for RestMarketSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Ticker> {
        let resp = self
            .get_json("/v3/ticker/24hr", &[("symbol", venue_symbol(symbol))])
            .await?;

        let field = |name: &str| {
            parse_number(&resp[name])
                .ok_or_else(|| Error::Exchange(format!("{} ticker missing {}", self.id, name)))
        };
        let mut ticker = Ticker::new(
            self.id.clone(),
            symbol.clone(),
            field("bidPrice")?,
            field("askPrice")?,
            field("lastPrice")?,
        );
        if let Some(seq) = resp["lastId"].as_u64() {
            ticker = ticker.with_sequence(seq);
        }
        Ok(ticker)
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let resp = self
            .get_json(
                "/v3/klines",
                &[
                    ("symbol", venue_symbol(symbol)),
                    ("interval", timeframe.as_str().to_string()),
                    ("startTime", since_ms.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let rows = resp
            .as_array()
            .ok_or_else(|| Error::Exchange(format!("{} klines response is not an array", self.id)))?;
        let candles: Vec<Candle> = rows.iter().filter_map(parse_kline).collect();
        debug!(venue = %self.id, %symbol, rows = rows.len(), parsed = candles.len(), "fetched klines");
        Ok(candles)
    }
}

/// Builds REST sources for venues with a known Binance-compatible endpoint
pub struct RestSourceFactory {
    client: reqwest::Client,
    endpoints: HashMap<String, String>,
}

impl RestSourceFactory {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let endpoints = [
            ("binance", "https://api.binance.com/api"),
            ("binanceus", "https://api.binance.us/api"),
            ("mexc", "https://api.mexc.com/api"),
        ]
        .into_iter()
        .map(|(id, url)| (id.to_string(), url.to_string()))
        .collect();
        Ok(Self { client, endpoints })
    }

    pub fn with_endpoint(mut self, venue_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.endpoints.insert(venue_id.into(), base_url.into());
        self
    }

    pub fn endpoint(&self, venue_id: &str) -> Option<&str> {
        self.endpoints.get(venue_id).map(String::as_str)
    }
}

#[async_trait]
impl SourceFactory for RestSourceFactory {
    async fn bootstrap(&self, venue_id: &str) -> Result<Arc<dyn MarketDataSource>> {
        let base_url = self.endpoint(venue_id).ok_or_else(|| {
            Error::VenueUnavailable(format!("no REST endpoint configured for {}", venue_id))
        })?;
        let source = RestMarketSource::new(venue_id, base_url, self.client.clone());
        source.ping().await?;
        info!(venue = venue_id, "REST source online");
        Ok(Arc::new(source))
    }
}
