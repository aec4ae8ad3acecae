//! Error handling - Hierarchical errors for the data and order pipeline

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Veridian error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors (fatal at construction)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Venue unreachable or throttling us
    #[error("Venue unavailable: {0}")]
    VenueUnavailable(String),

    /// Exchange-side API errors
    #[error("Exchange error: {0}")]
    Exchange(String),

    /// Venue refused this particular request (bad parameters, unknown endpoint)
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Venue answered but has no usable price for the pair
    #[error("No usable quote: {0}")]
    NoQuote(String),

    /// Venue call exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Caller referenced a venue nobody registered
    #[error("Exchange {0} is not registered")]
    VenueNotRegistered(String),

    /// Malformed market symbol
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Order payload rejected before reaching the venue
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Stream sink unavailable
    #[error("Stream sink error: {0}")]
    Sink(String),

    /// Candle store errors
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Not implemented
    #[error("Not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Upstream venue trouble that failover is allowed to absorb.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::VenueUnavailable(_) | Error::Exchange(_) | Error::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::VenueUnavailable("binance".into()).is_transient());
        assert!(Error::Exchange("rate limited".into()).is_transient());
        assert!(Error::Timeout("fetch_ticker".into()).is_transient());
        assert!(!Error::VenueNotRegistered("kraken".into()).is_transient());
        assert!(!Error::InvalidSymbol("BTCUSDT".into()).is_transient());
        assert!(!Error::Config("empty".into()).is_transient());
        assert!(!Error::Rejected("binance returned 404".into()).is_transient());
        assert!(!Error::NoQuote("ETH/USDT".into()).is_transient());
    }

    #[test]
    fn test_unregistered_message() {
        let err = Error::VenueNotRegistered("unknown-venue".into());
        assert_eq!(err.to_string(), "Exchange unknown-venue is not registered");
    }
}
