//! Storage - Candle persistence and the in-process tick stream

pub mod ohlcv;
pub mod stream;

pub use ohlcv::SqliteCandleStore;
pub use stream::MemoryStream;
