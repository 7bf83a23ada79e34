use crate::cbloom::config::ExpiryStrategy;
use crate::cbloom::error::Result;
use std::time::Duration;

/// Core operations for counting bloom filter
pub trait CountingBloomFilterOps {
    /// Count the key in; under `ExpiryDuration` also stamp its insertion time
    fn add(&self, key: &str) -> Result<()>;

    /// Probabilistic membership test, may expire the key on the way
    fn check(&self, key: &str) -> Result<bool>;

    /// Count the key out, never below zero
    fn remove(&self, key: &str) -> Result<()>;

    fn remove_all(&self) -> Result<()>;

    /// Run one pass of the configured expiry strategy right now
    fn cleanup_expired(&self) -> Result<usize>;
}

/// Bulk operations, one lock acquisition per call
pub trait CountingBloomFilterBulkOps {
    fn add_bulk(&self, keys: &[&str]) -> Result<()>;
    fn check_bulk(&self, keys: &[&str]) -> Result<Vec<bool>>;
}

/// Statistics for counting bloom filter
pub trait CountingBloomFilterStats {
    fn size(&self) -> usize;
    fn num_hashes(&self) -> usize;
    fn expiry_strategy(&self) -> ExpiryStrategy;
    fn period(&self) -> Duration;
    fn tracked_keys(&self) -> Result<usize>;
    fn nonzero_counters(&self) -> Result<usize>;
    fn fill_ratio(&self) -> Result<f64>;
    fn saturated_increments(&self) -> Result<u64>;
    fn estimated_false_positive_rate(&self, inserted: usize) -> f64;
}
