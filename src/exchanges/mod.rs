//! Exchange implementations - Pluggable exchange adapters

pub mod paper;

pub use paper::PaperExchange;
