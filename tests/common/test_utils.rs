use counting_bloom_rs::{
    CountingBloomFilter, CountingFilterConfigBuilder, ExpiryStrategy,
};
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

/// Install a test subscriber once per binary, filtered by `RUST_LOG`
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Filter without expiry
#[allow(dead_code)]
pub fn create_test_filter(size: usize) -> CountingBloomFilter {
    CountingBloomFilter::with_size(size).expect("Failed to create test filter")
}

/// Filter with a periodic strategy; must be called inside a tokio runtime
#[allow(dead_code)]
pub fn create_expiring_filter(
    size: usize,
    strategy: ExpiryStrategy,
    period: Duration,
) -> CountingBloomFilter {
    init_tracing();
    let config = CountingFilterConfigBuilder::default()
        .size(size)
        .expiry_strategy(strategy)
        .period(period)
        .build()
        .expect("Failed to build test config");

    CountingBloomFilter::new(config).expect("Failed to create test filter")
}

#[allow(dead_code)]
pub fn generate_test_keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}_{i:06}")).collect()
}
