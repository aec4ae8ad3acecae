//! Market data feeds - REST ingestion and the synthetic fallback

pub mod rest_client;
pub mod synthetic;

pub use rest_client::{RestMarketSource, RestSourceFactory};
pub use synthetic::SyntheticFeed;
