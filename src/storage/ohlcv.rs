//! SQLite OHLCV store - (symbol, ts) keyed candles with insert-or-replace

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::core::{Candle, CandleStore, Result, Symbol};

const OHLCV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ohlcv (
    symbol TEXT NOT NULL,
    ts INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL,
    PRIMARY KEY (symbol, ts)
);
"#;

/// Embedded candle store.
///
/// Calls block on SQLite; async callers go through `spawn_blocking`.
pub struct SqliteCandleStore {
    conn: Mutex<Connection>,
}

impl SqliteCandleStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                crate::core::Error::Config(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(OHLCV_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored candles for a symbol
    pub fn count(&self, symbol: &Symbol) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM ohlcv WHERE symbol = ?1",
            params![symbol.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl CandleStore for SqliteCandleStore {
    fn upsert(&self, symbol: &Symbol, candles: &[Candle]) -> Result<usize> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO ohlcv(symbol, ts, open, high, low, close, volume) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for c in candles {
                stmt.execute(params![symbol.as_str(), c.ts, c.open, c.high, c.low, c.close, c.volume])?;
            }
        }
        tx.commit()?;
        Ok(candles.len())
    }

    fn load_recent(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Candle>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT ts, open, high, low, close, volume FROM ohlcv \
             WHERE symbol = ?1 ORDER BY ts DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![symbol.as_str(), limit as i64], |row| {
            Ok(Candle {
                ts: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
            })
        })?;

        let mut candles = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        candles.reverse();
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle { ts, open: close, high: close + 1.0, low: close - 1.0, close, volume: 10.0 }
    }

    #[test]
    fn test_load_recent_is_ascending() {
        let store = SqliteCandleStore::open_in_memory().unwrap();
        let btc = Symbol::new("BTC/USDT");
        let rows: Vec<_> = (0..5).map(|i| candle(i * 60_000, 100.0 + i as f64)).collect();
        assert_eq!(store.upsert(&btc, &rows).unwrap(), 5);

        let recent = store.load_recent(&btc, 3).unwrap();
        let ts: Vec<_> = recent.iter().map(|c| c.ts).collect();
        assert_eq!(ts, vec![120_000, 180_000, 240_000]);
        assert_eq!(recent[2].time_secs(), 240);
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let store = SqliteCandleStore::open_in_memory().unwrap();
        let btc = Symbol::new("BTC/USDT");
        let eth = Symbol::new("ETH/USDT");

        store.upsert(&btc, &[candle(0, 100.0)]).unwrap();
        store.upsert(&btc, &[candle(0, 105.0)]).unwrap();
        store.upsert(&eth, &[candle(0, 7.0)]).unwrap();

        assert_eq!(store.count(&btc).unwrap(), 1);
        assert_eq!(store.load_recent(&btc, 10).unwrap()[0].close, 105.0);
        assert_eq!(store.load_recent(&eth, 10).unwrap()[0].close, 7.0);
    }

    #[test]
    fn test_empty_symbol() {
        let store = SqliteCandleStore::open_in_memory().unwrap();
        assert!(store.load_recent(&Symbol::new("DOGE/USDT"), 10).unwrap().is_empty());
        assert_eq!(store.upsert(&Symbol::new("DOGE/USDT"), &[]).unwrap(), 0);
    }
}
