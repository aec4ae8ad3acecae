//! Configuration - Type-safe, validated config
//!
//! Loaded from `config.toml`, then overridden by `VERIDIAN_*` environment
//! variables. Engines never read configuration themselves; `main` builds
//! their settings from this struct.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// The twenty pairs tracked out of the box.
pub const TOP_20_PAIRS: [&str; 20] = [
    "BTC/USDT", "ETH/USDT", "BNB/USDT", "XRP/USDT", "SOL/USDT",
    "DOGE/USDT", "ADA/USDT", "MATIC/USDT", "DOT/USDT", "LTC/USDT",
    "TRX/USDT", "SHIB/USDT", "AVAX/USDT", "ATOM/USDT", "LINK/USDT",
    "XMR/USDT", "XLM/USDT", "APT/USDT", "ARB/USDT", "OP/USDT",
];

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Tick stream sink
    pub stream: StreamConfig,

    /// Signal aggregator
    pub aggregator: AggregatorConfig,

    /// Market data harvester
    pub harvester: HarvesterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run mode: paper or live
    pub mode: RunMode,

    /// Log level used when RUST_LOG is unset
    pub log_level: String,

    /// Directory holding the OHLCV database
    pub data_dir: PathBuf,

    /// Explicit database path (wins over data_dir)
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Stream identifier ticks are appended to
    pub key: String,

    /// Approximate cap on retained entries
    pub max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Window in which identical fingerprints count as one event
    pub dedup_ttl_ms: u64,

    /// How often stale fingerprints are swept
    pub dedup_sweep_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvesterConfig {
    /// Venue priority list, most preferred first
    pub exchanges: Vec<String>,

    /// Symbols polled by the live broadcast loop
    pub symbols: Vec<String>,

    /// Seconds between broadcast cycles
    pub poll_interval_secs: f64,

    /// Bounded queue size per live price subscriber
    pub subscriber_capacity: usize,

    /// Candles requested per history page
    pub page_size: usize,

    /// Hard cap on candles written by one backfill
    pub max_backfill: usize,

    /// Pair backfilled on boot so charts have history
    pub boot_backfill_symbol: Option<String>,

    /// Days backfilled on boot
    pub boot_backfill_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Paper,
            log_level: "info".to_string(),
            data_dir: PathBuf::from("data"),
            db_path: None,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            key: "veridian:ticks".to_string(),
            max_len: 2048,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_ms: 250,
            dedup_sweep_secs: 30,
        }
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            exchanges: vec!["binance".into(), "binanceus".into(), "mexc".into()],
            symbols: TOP_20_PAIRS.iter().map(|s| s.to_string()).collect(),
            poll_interval_secs: 5.0,
            subscriber_capacity: 256,
            page_size: 1000,
            max_backfill: 10_000,
            boot_backfill_symbol: Some("BTC/USDT".to_string()),
            boot_backfill_days: 7,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load `config.toml` from the working directory or the crate root,
    /// falling back to defaults.
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", path);
                    return cfg;
                }
                Err(e) if Path::new(path).exists() => {
                    tracing::warn!("Ignoring {}: {}", path, e);
                }
                Err(_) => {}
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    /// Apply `VERIDIAN_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("VERIDIAN_EXCHANGES") {
            let venues = split_list(&raw);
            if !venues.is_empty() {
                self.harvester.exchanges = venues;
            }
        }
        if let Some(raw) = lookup("VERIDIAN_SYMBOLS") {
            let symbols = split_list(&raw);
            if !symbols.is_empty() {
                self.harvester.symbols = symbols;
            }
        }
        if let Some(key) = lookup("VERIDIAN_STREAM_KEY") {
            self.stream.key = key;
        }
        if let Some(raw) = lookup("VERIDIAN_STREAM_MAXLEN") {
            self.stream.max_len = parse_var("VERIDIAN_STREAM_MAXLEN", &raw)?;
        }
        if let Some(raw) = lookup("VERIDIAN_DEDUP_TTL_MS") {
            self.aggregator.dedup_ttl_ms = parse_var("VERIDIAN_DEDUP_TTL_MS", &raw)?;
        }
        if let Some(raw) = lookup("VERIDIAN_POLL_INTERVAL_SECS") {
            self.harvester.poll_interval_secs = parse_var("VERIDIAN_POLL_INTERVAL_SECS", &raw)?;
        }
        if let Some(path) = lookup("VERIDIAN_DB_PATH") {
            self.app.db_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Reject settings no engine can run with.
    pub fn validate(&self) -> Result<()> {
        if self.harvester.exchanges.is_empty() {
            return Err(Error::Config("At least one exchange must be specified".into()));
        }
        if self.stream.key.is_empty() {
            return Err(Error::Config("stream key must not be empty".into()));
        }
        if self.stream.max_len == 0 {
            return Err(Error::Config("stream max_len must be positive".into()));
        }
        if self.aggregator.dedup_ttl_ms == 0 {
            return Err(Error::Config("dedup_ttl_ms must be positive".into()));
        }
        if !(self.harvester.poll_interval_secs.is_finite() && self.harvester.poll_interval_secs > 0.0) {
            return Err(Error::Config("poll_interval_secs must be positive".into()));
        }
        if self.harvester.subscriber_capacity == 0 {
            return Err(Error::Config("subscriber_capacity must be positive".into()));
        }
        if self.harvester.page_size == 0 || self.harvester.max_backfill == 0 {
            return Err(Error::Config("page_size and max_backfill must be positive".into()));
        }
        Ok(())
    }

    /// Where the OHLCV database lives
    pub fn db_path(&self) -> PathBuf {
        self.app
            .db_path
            .clone()
            .unwrap_or_else(|| self.app.data_dir.join("vortex_ohlcv.sqlite"))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} has an invalid value: {}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_validate() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.stream.key, "veridian:ticks");
        assert_eq!(cfg.stream.max_len, 2048);
        assert_eq!(cfg.aggregator.dedup_ttl_ms, 250);
        assert_eq!(cfg.harvester.symbols.len(), 20);
        assert_eq!(cfg.harvester.exchanges[0], "binance");
        assert_eq!(cfg.db_path(), PathBuf::from("data/vortex_ohlcv.sqlite"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("VERIDIAN_EXCHANGES", " kraken, ,binance "),
            ("VERIDIAN_SYMBOLS", "ETH/USDT"),
            ("VERIDIAN_STREAM_MAXLEN", "512"),
            ("VERIDIAN_DEDUP_TTL_MS", "100"),
            ("VERIDIAN_DB_PATH", "/tmp/ohlcv.sqlite"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_overrides(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(cfg.harvester.exchanges, vec!["kraken", "binance"]);
        assert_eq!(cfg.harvester.symbols, vec!["ETH/USDT"]);
        assert_eq!(cfg.stream.max_len, 512);
        assert_eq!(cfg.aggregator.dedup_ttl_ms, 100);
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/ohlcv.sqlite"));
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let vars = env(&[("VERIDIAN_STREAM_MAXLEN", "lots")]);
        let mut cfg = Config::default();
        let err = cfg.apply_overrides(|k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_empty_priority_rejected() {
        let mut cfg = Config::default();
        cfg.harvester.exchanges.clear();
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            [harvester]
            exchanges = ["mexc"]
            poll_interval_secs = 2.5

            [stream]
            key = "ticks:test"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.harvester.exchanges, vec!["mexc"]);
        assert_eq!(cfg.harvester.poll_interval_secs, 2.5);
        assert_eq!(cfg.harvester.page_size, 1000);
        assert_eq!(cfg.stream.key, "ticks:test");
        assert_eq!(cfg.stream.max_len, 2048);
        assert_eq!(cfg.app.mode, RunMode::Paper);
    }
}
