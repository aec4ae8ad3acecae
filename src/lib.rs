//! Veridian - Core Library
//! Market data ingestion, signal aggregation and order routing

// Public modules
pub mod core;
pub mod feeds;
pub mod exchanges;
pub mod aggregator;
pub mod execution;
pub mod harvester;
pub mod storage;

// Re-exports
pub use core::{Config, Error, Result};
