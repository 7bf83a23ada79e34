use crate::cbloom::config::{CountingFilterConfig, ExpiryStrategy};
use crate::cbloom::counters::CounterArray;
use crate::cbloom::error::{CbloomError, Result};
use crate::cbloom::expiry::{ExpiryTask, Sweeper};
use crate::cbloom::traits::{
    CountingBloomFilterBulkOps, CountingBloomFilterOps, CountingBloomFilterStats,
};
use crate::hash::{NUM_HASHES, base_hash, expected_false_positive_rate};
use fnv::FnvHashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Everything guarded by the filter lock.
#[derive(Debug)]
pub(crate) struct FilterState {
    pub(crate) counters: CounterArray,
    /// Key -> instant of last insertion, only filled under `ExpiryDuration`
    pub(crate) timestamps: FnvHashMap<String, Instant>,
    pub(crate) lazy_cursor: usize,
    pub(crate) sweep_cursor: usize,
}

impl FilterState {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            counters: CounterArray::new(size),
            timestamps: FnvHashMap::default(),
            lazy_cursor: 0,
            sweep_cursor: 0,
        }
    }

    pub(crate) fn remove_key(&mut self, key: &str) {
        self.counters.decrement_all(base_hash(key.as_bytes()));
        self.timestamps.remove(key);
    }

    pub(crate) fn clear(&mut self) {
        self.counters.reset_all();
        self.timestamps.clear();
        self.sweep_cursor = 0;
    }

    fn is_expired(&self, key: &str, ttl: Duration, now: Instant) -> bool {
        self.timestamps
            .get(key)
            .is_some_and(|ts| now.saturating_duration_since(*ts) > ttl)
    }
}

/// State shared between the filter handle and its expiry task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: CountingFilterConfig,
    state: RwLock<FilterState>,
}

impl Shared {
    pub(crate) fn new(config: CountingFilterConfig) -> Self {
        Self {
            state: RwLock::new(FilterState::new(config.size)),
            config,
        }
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, FilterState>> {
        self.state.read().map_err(|_| {
            CbloomError::LockError(
                "Failed to acquire read lock on filter state".to_string(),
            )
        })
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, FilterState>> {
        self.state.write().map_err(|_| {
            CbloomError::LockError(
                "Failed to acquire write lock on filter state".to_string(),
            )
        })
    }

    fn tracks_timestamps(&self) -> bool {
        self.config.expiry_strategy.tracks_timestamps()
    }
}

/// Counting Bloom filter with removal and optional background expiry.
///
/// All counters and the timestamp index sit behind one `RwLock`. Lookups
/// share it; inserts, removals and expiry passes take it exclusively.
///
/// Periodic strategies run on a tokio task spawned at construction. The task
/// only holds a weak reference and is aborted when the filter is dropped or
/// [`shutdown`](Self::shutdown) is called.
pub struct CountingBloomFilter {
    shared: Arc<Shared>,
    sweeper: Option<Sweeper>,
    expiry_task: Mutex<Option<ExpiryTask>>,
}

impl CountingBloomFilter {
    /// Build a filter, spawning the expiry task on the current tokio runtime
    /// when the strategy is periodic.
    pub fn new(config: CountingFilterConfig) -> Result<Self> {
        if config.expiry_strategy.is_periodic() {
            let handle = Handle::try_current()
                .map_err(|e| CbloomError::RuntimeUnavailable(e.to_string()))?;
            Self::with_runtime(config, &handle)
        } else {
            Self::build(config, None)
        }
    }

    /// Like [`new`](Self::new) but spawns the expiry task on `runtime`.
    pub fn with_runtime(
        config: CountingFilterConfig,
        runtime: &Handle,
    ) -> Result<Self> {
        Self::build(config, Some(runtime))
    }

    /// Filter of `size` counters without expiry.
    pub fn with_size(size: usize) -> Result<Self> {
        Self::build(
            CountingFilterConfig {
                size,
                ..CountingFilterConfig::default()
            },
            None,
        )
    }

    /// `DEFAULT_SIZE` counters, no expiry.
    pub fn default_filter() -> Self {
        let shared = Arc::new(Shared::new(CountingFilterConfig::default()));
        Self {
            shared,
            sweeper: None,
            expiry_task: Mutex::new(None),
        }
    }

    fn build(
        mut config: CountingFilterConfig,
        runtime: Option<&Handle>,
    ) -> Result<Self> {
        config.validate()?;
        config.period = config.effective_period();

        let sweeper =
            Sweeper::for_strategy(config.expiry_strategy, config.period);
        let shared = Arc::new(Shared::new(config));

        let expiry_task = match (sweeper, runtime) {
            (Some(sweeper), Some(runtime)) => Some(ExpiryTask::spawn(
                runtime,
                sweeper,
                shared.config.period,
                Arc::downgrade(&shared),
            )),
            (Some(_), None) => {
                return Err(CbloomError::RuntimeUnavailable(format!(
                    "strategy '{}' needs a tokio runtime",
                    shared.config.expiry_strategy
                )));
            }
            (None, _) => None,
        };

        info!(
            size = shared.config.size,
            memory_bytes = shared.config.size,
            strategy = %shared.config.expiry_strategy,
            period = ?shared.config.period,
            "counting bloom filter created"
        );

        Ok(Self {
            shared,
            sweeper,
            expiry_task: Mutex::new(expiry_task),
        })
    }

    pub fn config(&self) -> &CountingFilterConfig {
        &self.shared.config
    }

    /// Whether a background expiry task is still running.
    pub fn is_expiry_running(&self) -> bool {
        self.expiry_task.lock().is_ok_and(|task| {
            task.as_ref().is_some_and(|task| !task.is_finished())
        })
    }

    /// Stop the background expiry task. The filter stays usable and
    /// [`cleanup_expired`](CountingBloomFilterOps::cleanup_expired) can still
    /// drive expiry by hand. Works through a shared `Arc` handle.
    pub fn shutdown(&self) -> Result<()> {
        let task = self
            .expiry_task
            .lock()
            .map_err(|_| {
                CbloomError::LockError(
                    "Failed to acquire expiry task lock".to_string(),
                )
            })?
            .take();
        drop(task);
        Ok(())
    }

    fn ttl(&self) -> Duration {
        self.shared.config.period
    }

    /// Drop `keys` that are still expired now that the write lock is held.
    ///
    /// Another caller may have re-added a key between the read and the
    /// write lock; such keys keep their fresh timestamp.
    fn expire_keys(&self, keys: &[&str]) -> Result<Vec<bool>> {
        let mut state = self.shared.write()?;
        let now = Instant::now();
        let ttl = self.ttl();

        Ok(keys
            .iter()
            .map(|key| {
                if state.is_expired(key, ttl, now) {
                    state.remove_key(key);
                    debug!(key, "key expired on check");
                    false
                } else {
                    state.counters.all_nonzero(base_hash(key.as_bytes()))
                }
            })
            .collect())
    }
}

impl CountingBloomFilterOps for CountingBloomFilter {
    fn add(&self, key: &str) -> Result<()> {
        let hash = base_hash(key.as_bytes());
        let mut state = self.shared.write()?;
        state.counters.increment_all(hash);

        if self.shared.tracks_timestamps() {
            state.timestamps.insert(key.to_string(), Instant::now());
        }
        Ok(())
    }

    fn check(&self, key: &str) -> Result<bool> {
        let hash = base_hash(key.as_bytes());
        {
            let state = self.shared.read()?;
            if !state.counters.all_nonzero(hash) {
                return Ok(false);
            }
            if !self.shared.tracks_timestamps()
                || !state.is_expired(key, self.ttl(), Instant::now())
            {
                return Ok(true);
            }
        }

        Ok(self.expire_keys(&[key])?.first().copied().unwrap_or(false))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.shared.write()?.remove_key(key);
        Ok(())
    }

    fn remove_all(&self) -> Result<()> {
        self.shared.write()?.clear();
        Ok(())
    }

    fn cleanup_expired(&self) -> Result<usize> {
        match self.sweeper {
            Some(sweeper) => sweeper.sweep(&self.shared),
            None => Ok(0),
        }
    }
}

impl CountingBloomFilterBulkOps for CountingBloomFilter {
    fn add_bulk(&self, keys: &[&str]) -> Result<()> {
        let tracks_timestamps = self.shared.tracks_timestamps();
        let mut state = self.shared.write()?;
        let now = Instant::now();

        for key in keys {
            state.counters.increment_all(base_hash(key.as_bytes()));
            if tracks_timestamps {
                state.timestamps.insert(key.to_string(), now);
            }
        }
        Ok(())
    }

    fn check_bulk(&self, keys: &[&str]) -> Result<Vec<bool>> {
        let mut results = Vec::with_capacity(keys.len());
        let mut pending = Vec::new();
        {
            let state = self.shared.read()?;
            let now = Instant::now();
            for (pos, key) in keys.iter().enumerate() {
                let present =
                    state.counters.all_nonzero(base_hash(key.as_bytes()));
                if present
                    && self.shared.tracks_timestamps()
                    && state.is_expired(key, self.ttl(), now)
                {
                    pending.push(pos);
                }
                results.push(present);
            }
        }

        if !pending.is_empty() {
            let expiring: Vec<&str> =
                pending.iter().map(|&pos| keys[pos]).collect();
            let rechecked = self.expire_keys(&expiring)?;
            for (pos, present) in pending.into_iter().zip(rechecked) {
                results[pos] = present;
            }
        }
        Ok(results)
    }
}

impl CountingBloomFilterStats for CountingBloomFilter {
    fn size(&self) -> usize {
        self.shared.config.size
    }

    fn num_hashes(&self) -> usize {
        NUM_HASHES
    }

    fn expiry_strategy(&self) -> ExpiryStrategy {
        self.shared.config.expiry_strategy
    }

    fn period(&self) -> Duration {
        self.shared.config.period
    }

    fn tracked_keys(&self) -> Result<usize> {
        Ok(self.shared.read()?.timestamps.len())
    }

    fn nonzero_counters(&self) -> Result<usize> {
        Ok(self.shared.read()?.counters.nonzero_count())
    }

    fn fill_ratio(&self) -> Result<f64> {
        Ok(self.nonzero_counters()? as f64 / self.size() as f64)
    }

    fn saturated_increments(&self) -> Result<u64> {
        Ok(self.shared.read()?.counters.saturated_increments())
    }

    fn estimated_false_positive_rate(&self, inserted: usize) -> f64 {
        expected_false_positive_rate(inserted, self.size(), NUM_HASHES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbloom::config::{CountingFilterConfigBuilder, DEFAULT_SIZE};

    #[test]
    fn test_periodic_without_runtime_is_rejected() {
        let config = CountingFilterConfigBuilder::default()
            .expiry_strategy(ExpiryStrategy::Lazy)
            .build()
            .unwrap();
        assert!(matches!(
            CountingBloomFilter::new(config),
            Err(CbloomError::RuntimeUnavailable(_))
        ));
    }

    #[test]
    fn test_zero_period_falls_back_to_default() {
        let config = CountingFilterConfigBuilder::default()
            .period(Duration::ZERO)
            .build()
            .unwrap();
        let filter = CountingBloomFilter::new(config).unwrap();
        assert_eq!(filter.period(), crate::cbloom::config::DEFAULT_PERIOD);
    }

    #[test]
    fn test_recheck_keeps_fresh_readd() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let config = CountingFilterConfigBuilder::default()
            .size(4096)
            .expiry_strategy(ExpiryStrategy::ExpiryDuration)
            .period(Duration::from_secs(1))
            .build()
            .unwrap();
        let filter =
            CountingBloomFilter::with_runtime(config, runtime.handle()).unwrap();

        filter.add("key").unwrap();
        // Age the entry, then re-add before the escalated removal runs
        {
            let mut state = filter.shared.write().unwrap();
            let old = Instant::now() - Duration::from_secs(5);
            state.timestamps.insert("key".to_string(), old);
        }
        filter.add("key").unwrap();
        assert_eq!(filter.expire_keys(&["key"]).unwrap(), vec![true]);
        assert_eq!(filter.tracked_keys().unwrap(), 1);

        // Stale again: now it really goes away
        {
            let mut state = filter.shared.write().unwrap();
            let old = Instant::now() - Duration::from_secs(5);
            state.timestamps.insert("key".to_string(), old);
        }
        assert!(!filter.check("key").unwrap());
        assert_eq!(filter.tracked_keys().unwrap(), 0);
        // One add is still counted
        let state = filter.shared.read().unwrap();
        assert!(state.counters.all_nonzero(base_hash(b"key")));
    }

    #[test]
    fn test_default_filter() {
        let filter = CountingBloomFilter::default_filter();
        assert_eq!(filter.size(), DEFAULT_SIZE);
        assert_eq!(filter.expiry_strategy(), ExpiryStrategy::NoExpiration);
        assert!(!filter.is_expiry_running());
    }
}
