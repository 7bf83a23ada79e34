//! Counting Bloom filter with removal and time-based forgetting.
//!
//! HowTo:
//!    * Counters: a fixed array of `u8` counters replaces the usual bit vector,
//!      so keys can be removed as well as added.
//!    * Hashing: one FNV-1a 64-bit hash per key; trial `i` of `K = 12` mixes
//!      `hash + i` through a SplitMix64 finalizer and takes it modulo `size`.
//!
//! Insertion:
//!     * Increment the K counters of the key (saturating at 255).
//! Query:
//!     * The key is reported present when none of its K counters is zero.
//! Removal:
//!     * Decrement the K counters, never below zero.
//! Expiration (one strategy per filter, run on a tokio task every period):
//!     * `Lazy`: decrement the next 10% of the array, wrapping around.
//!     * `ResetEveryPeriod`: zero the whole array.
//!     * `ExpiryDuration`: remember insertion time per key, drop keys older
//!       than the period on lookup and in sampled background sweeps.
//!
//! Obvious problems:
//!     * False Positives: reported presence may be wrong, absence never is
//!       (unless the key was removed or expired).
//!     * Removing a key that was never added can knock out other keys that
//!       share its counters.
//!     * `ExpiryDuration` keeps every distinct key in memory until it expires.
//!
//! ```rust,no_run
//! use counting_bloom_rs::{
//!     CountingBloomFilter, CountingBloomFilterOps, CountingFilterConfigBuilder,
//!     ExpiryStrategy,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> counting_bloom_rs::Result<()> {
//!     let config = CountingFilterConfigBuilder::default()
//!         .size(1 << 20)
//!         .expiry_strategy(ExpiryStrategy::ExpiryDuration)
//!         .period(Duration::from_secs(30))
//!         .build()
//!         .expect("valid config");
//!     let filter = CountingBloomFilter::new(config)?;
//!
//!     filter.add("user:42")?;
//!     assert!(filter.check("user:42")?);
//!     filter.remove("user:42")?;
//!     Ok(())
//! }
//! ```

pub mod cbloom;
pub mod hash;

pub use cbloom::{
    CbloomError, CounterArray, CountingBloomFilter, CountingBloomFilterBulkOps,
    CountingBloomFilterOps, CountingBloomFilterStats, CountingFilterConfig,
    CountingFilterConfigBuilder, CountingFilterConfigBuilderError,
    DEFAULT_PERIOD, DEFAULT_SIZE, ExpiryStrategy, Result,
};
pub use hash::{
    NUM_HASHES, expected_false_positive_rate, hash_indices, recommended_size,
};
