use crate::cbloom::config::{
    ExpiryStrategy, LAZY_BATCH_RATE, SWEEP_REPEAT_THRESHOLD, SWEEP_SAMPLE_SIZE,
};
use crate::cbloom::error::Result;
use crate::cbloom::filter::{FilterState, Shared};
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// One expiry pass, picked once from the configured strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sweeper {
    /// Decrement the next `LAZY_BATCH_RATE` share of counters.
    Lazy,
    /// Zero everything.
    Reset,
    /// Evict sampled timestamp entries older than `ttl`.
    Timestamp { ttl: Duration },
}

impl Sweeper {
    pub(crate) fn for_strategy(
        strategy: ExpiryStrategy,
        period: Duration,
    ) -> Option<Self> {
        match strategy {
            ExpiryStrategy::NoExpiration => None,
            ExpiryStrategy::Lazy => Some(Sweeper::Lazy),
            ExpiryStrategy::ResetEveryPeriod => Some(Sweeper::Reset),
            ExpiryStrategy::ExpiryDuration => {
                Some(Sweeper::Timestamp { ttl: period })
            }
        }
    }

    /// Run one pass against `shared`.
    ///
    /// Returns counters decremented (lazy), counters cleared (reset) or keys
    /// evicted (timestamp).
    pub(crate) fn sweep(&self, shared: &Shared) -> Result<usize> {
        match *self {
            Sweeper::Lazy => {
                let mut state = shared.write()?;
                Ok(lazy_pass(&mut state))
            }
            Sweeper::Reset => {
                let mut state = shared.write()?;
                let cleared = state.counters.nonzero_count();
                state.clear();
                Ok(cleared)
            }
            Sweeper::Timestamp { ttl } => {
                let mut evicted_total = 0;
                loop {
                    // Lock per sample so callers can interleave between repeats
                    let mut state = shared.write()?;
                    let (sampled, evicted) =
                        timestamp_pass(&mut state, ttl, Instant::now());
                    drop(state);
                    evicted_total += evicted;

                    if sampled == 0
                        || (evicted as f64 / sampled as f64)
                            <= SWEEP_REPEAT_THRESHOLD
                    {
                        break;
                    }
                }
                Ok(evicted_total)
            }
        }
    }
}

/// Decrement one batch of counters starting at the lazy cursor.
fn lazy_pass(state: &mut FilterState) -> usize {
    let size = state.counters.len();
    let batch = ((size as f64 * LAZY_BATCH_RATE).ceil() as usize).max(1);
    let start = if state.lazy_cursor >= size {
        0
    } else {
        state.lazy_cursor
    };

    let decremented = state.counters.decrement_range(start, batch);
    let next = start + batch;
    state.lazy_cursor = if next >= size { 0 } else { next };
    decremented
}

/// Inspect up to `SWEEP_SAMPLE_SIZE` entries from the sweep cursor and evict
/// the expired ones. Returns `(sampled, evicted)`.
///
/// The cursor follows map iteration order, which is arbitrary but stable
/// between removals, so consecutive passes walk the whole index.
fn timestamp_pass(
    state: &mut FilterState,
    ttl: Duration,
    now: Instant,
) -> (usize, usize) {
    let len = state.timestamps.len();
    if len == 0 {
        state.sweep_cursor = 0;
        return (0, 0);
    }
    let cursor = if state.sweep_cursor >= len {
        0
    } else {
        state.sweep_cursor
    };

    let sampled = SWEEP_SAMPLE_SIZE.min(len - cursor);
    let expired: Vec<String> = state
        .timestamps
        .iter()
        .skip(cursor)
        .take(sampled)
        .filter(|(_, ts)| now.saturating_duration_since(**ts) > ttl)
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        state.remove_key(key);
    }

    // Evicted entries left the window, so survivors shift back
    let next = cursor + sampled;
    state.sweep_cursor = if next >= len {
        0
    } else {
        next - expired.len()
    };
    (sampled, expired.len())
}

/// Background task running a [`Sweeper`] every period.
///
/// Aborted on drop.
#[derive(Debug)]
pub(crate) struct ExpiryTask {
    sweeper: Sweeper,
    handle: JoinHandle<()>,
}

impl ExpiryTask {
    pub(crate) fn spawn(
        runtime: &Handle,
        sweeper: Sweeper,
        period: Duration,
        shared: Weak<Shared>,
    ) -> Self {
        info!(?sweeper, ?period, "starting expiry task");
        let handle = runtime.spawn(run_expiry_loop(sweeper, period, shared));
        Self { sweeper, handle }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ExpiryTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            info!(sweeper = ?self.sweeper, "stopping expiry task");
        }
        self.handle.abort();
    }
}

async fn run_expiry_loop(
    sweeper: Sweeper,
    period: Duration,
    shared: Weak<Shared>,
) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(filter) = shared.upgrade() else {
            debug!(?sweeper, "filter dropped, expiry task exiting");
            break;
        };

        match sweeper.sweep(&filter) {
            Ok(reclaimed) => debug!(?sweeper, reclaimed, "expiry pass done"),
            Err(e) => {
                error!(
                    ?sweeper,
                    error = %e,
                    "expiry pass failed, stopping task"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbloom::config::CountingFilterConfig;
    use crate::hash::base_hash;

    fn state_with_keys(size: usize, keys: &[(&str, Instant)]) -> FilterState {
        let mut state = FilterState::new(size);
        for (key, ts) in keys {
            state.counters.increment_all(base_hash(key.as_bytes()));
            state.timestamps.insert(key.to_string(), *ts);
        }
        state
    }

    #[test]
    fn test_strategy_dispatch() {
        let period = Duration::from_millis(300);
        assert_eq!(
            Sweeper::for_strategy(ExpiryStrategy::NoExpiration, period),
            None
        );
        assert_eq!(
            Sweeper::for_strategy(ExpiryStrategy::Lazy, period),
            Some(Sweeper::Lazy)
        );
        assert_eq!(
            Sweeper::for_strategy(ExpiryStrategy::ResetEveryPeriod, period),
            Some(Sweeper::Reset)
        );
        assert_eq!(
            Sweeper::for_strategy(ExpiryStrategy::ExpiryDuration, period),
            Some(Sweeper::Timestamp { ttl: period })
        );
    }

    #[test]
    fn test_lazy_pass_walks_and_wraps() {
        let mut state = FilterState::new(25);
        // batch = ceil(2.5) = 3
        assert_eq!(lazy_pass(&mut state), 0);
        assert_eq!(state.lazy_cursor, 3);

        for _ in 0..7 {
            lazy_pass(&mut state);
        }
        assert_eq!(state.lazy_cursor, 24);
        lazy_pass(&mut state);
        assert_eq!(state.lazy_cursor, 0);
    }

    #[test]
    fn test_lazy_full_cycle_decrements_every_counter_once() {
        let mut state = FilterState::new(100);
        state.counters.increment_all(base_hash(b"item1"));
        state.counters.increment_all(base_hash(b"item1"));
        let before = state.counters.nonzero_count();

        let total: usize = (0..10).map(|_| lazy_pass(&mut state)).sum();
        assert_eq!(total, before);
        assert_eq!(state.lazy_cursor, 0);
        // Counted twice, so one full cycle leaves it present
        assert!(state.counters.all_nonzero(base_hash(b"item1")));
    }

    #[test]
    fn test_timestamp_pass_evicts_only_expired() {
        let now = Instant::now();
        let old = now - Duration::from_secs(10);
        let mut state = state_with_keys(
            4096,
            &[("stale1", old), ("fresh", now), ("stale2", old)],
        );

        let (sampled, evicted) =
            timestamp_pass(&mut state, Duration::from_secs(1), now);
        assert_eq!((sampled, evicted), (3, 2));
        assert_eq!(state.timestamps.len(), 1);
        assert!(state.timestamps.contains_key("fresh"));
        assert!(state.counters.all_nonzero(base_hash(b"fresh")));
        assert!(!state.counters.all_nonzero(base_hash(b"stale1")));
        assert_eq!(state.sweep_cursor, 0);
    }

    #[test]
    fn test_timestamp_pass_is_bounded() {
        let now = Instant::now();
        let old = now - Duration::from_secs(10);
        let keys: Vec<String> = (0..50).map(|i| format!("item{i}")).collect();
        let entries: Vec<(&str, Instant)> =
            keys.iter().map(|k| (k.as_str(), old)).collect();
        let mut state = state_with_keys(1 << 16, &entries);

        let (sampled, evicted) =
            timestamp_pass(&mut state, Duration::from_secs(1), now);
        assert_eq!(sampled, SWEEP_SAMPLE_SIZE);
        assert_eq!(evicted, SWEEP_SAMPLE_SIZE);
        assert_eq!(state.timestamps.len(), 50 - SWEEP_SAMPLE_SIZE);
    }

    #[test]
    fn test_timestamp_cursor_reaches_whole_index() {
        let now = Instant::now();
        let old = now - Duration::from_secs(10);
        let keys: Vec<String> = (0..60).map(|i| format!("key{i}")).collect();
        let mut entries: Vec<(&str, Instant)> =
            keys.iter().map(|k| (k.as_str(), now)).collect();
        entries.push(("lonely_stale", old));
        let mut state = state_with_keys(1 << 16, &entries);

        let mut evicted = 0;
        for _ in 0..4 {
            evicted +=
                timestamp_pass(&mut state, Duration::from_secs(1), now).1;
        }
        assert_eq!(evicted, 1);
        assert!(!state.timestamps.contains_key("lonely_stale"));
        assert_eq!(state.timestamps.len(), 60);
    }

    fn shared_with(strategy: ExpiryStrategy, size: usize) -> Shared {
        Shared::new(CountingFilterConfig {
            size,
            expiry_strategy: strategy,
            period: Duration::from_secs(1),
        })
    }

    #[test]
    fn test_lazy_sweep_takes_the_lock() {
        let shared = shared_with(ExpiryStrategy::Lazy, 100);
        shared
            .write()
            .unwrap()
            .counters
            .increment_all(base_hash(b"item1"));
        let touched = shared.read().unwrap().counters.nonzero_count();

        let total: usize =
            (0..10).map(|_| Sweeper::Lazy.sweep(&shared).unwrap()).sum();
        assert_eq!(total, touched);
        assert!(
            !shared
                .read()
                .unwrap()
                .counters
                .all_nonzero(base_hash(b"item1"))
        );
    }

    #[test]
    fn test_reset_sweep_clears_state() {
        let shared = shared_with(ExpiryStrategy::ResetEveryPeriod, 4096);
        {
            let mut state = shared.write().unwrap();
            state.counters.increment_all(base_hash(b"item1"));
            state.timestamps.insert("item1".to_string(), Instant::now());
        }

        assert!(Sweeper::Reset.sweep(&shared).unwrap() > 0);
        let state = shared.read().unwrap();
        assert_eq!(state.counters.nonzero_count(), 0);
        assert!(state.timestamps.is_empty());
    }

    #[test]
    fn test_timestamp_sweep_repeats_until_index_is_fresh() {
        let shared = shared_with(ExpiryStrategy::ExpiryDuration, 1 << 16);
        let old = Instant::now() - Duration::from_secs(10);
        {
            let mut state = shared.write().unwrap();
            for i in 0..50 {
                let key = format!("stale{i}");
                state.counters.increment_all(base_hash(key.as_bytes()));
                state.timestamps.insert(key, old);
            }
            state.counters.increment_all(base_hash(b"fresh"));
            state.timestamps.insert("fresh".to_string(), Instant::now());
        }

        let sweeper = Sweeper::Timestamp {
            ttl: Duration::from_secs(1),
        };
        // Every full sample is mostly stale, so one call drains them all
        assert_eq!(sweeper.sweep(&shared).unwrap(), 50);
        let state = shared.read().unwrap();
        assert_eq!(state.timestamps.len(), 1);
        assert!(state.counters.all_nonzero(base_hash(b"fresh")));
    }

    #[test]
    fn test_timestamp_pass_on_empty_index() {
        let mut state = FilterState::new(16);
        state.sweep_cursor = 5;
        assert_eq!(
            timestamp_pass(&mut state, Duration::from_secs(1), Instant::now()),
            (0, 0)
        );
        assert_eq!(state.sweep_cursor, 0);
    }
}
