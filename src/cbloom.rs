//! Counting Bloom filter with removal and background expiry
pub mod config;
pub mod counters;
pub mod error;
mod expiry;
pub mod filter;
pub mod traits;

pub use config::{
    CountingFilterConfig, CountingFilterConfigBuilder,
    CountingFilterConfigBuilderError, DEFAULT_PERIOD, DEFAULT_SIZE,
    ExpiryStrategy,
};
pub use counters::CounterArray;
pub use error::{CbloomError, Result};
pub use filter::CountingBloomFilter;
pub use traits::{
    CountingBloomFilterBulkOps, CountingBloomFilterOps, CountingBloomFilterStats,
};
