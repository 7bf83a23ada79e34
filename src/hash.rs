use crate::cbloom::error::{CbloomError, Result};
use fnv::FnvHasher;
use std::hash::Hasher;

/// Number of hash trials per key.
///
/// With `K = 12` and 30 counters per element the expected false positive
/// rate is about `1.65e-6` (`1e6` counters for 33 333 keys).
pub const NUM_HASHES: usize = 12;

/// Base 64-bit hash of a key (FNV-1a over the raw bytes).
///
/// Every trial index is derived from this single value, so callers that
/// touch all `K` positions hash the key once and reuse it.
pub fn base_hash(key: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish()
}

/// SplitMix64 finalizer.
#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Position of `trial` for a key whose base hash is `hash`.
///
/// The trial is added to the hash and the sum is mixed before the modulo;
/// without mixing all trials of a key would land on adjacent slots.
///
/// **Parameters:**
///
/// - `hash: u64`
///   - Result of [`base_hash`] for the key.
/// - `trial: usize`
///   - Trial number in `[0, NUM_HASHES)`, added to the hash as an offset.
/// - `size: usize`
///   - Length of the counter array, must be greater than zero.
///
/// **Returns:**
///
/// - `usize` in `[0, size)`. Different trials may land on the same slot.
#[inline]
pub fn trial_index(hash: u64, trial: usize, size: usize) -> usize {
    (splitmix64(hash.wrapping_add(trial as u64)) % size as u64) as usize
}

/// All `NUM_HASHES` positions for a key.
pub fn hash_indices(
    key: &[u8],
    size: usize,
) -> impl Iterator<Item = usize> + use<> {
    let hash = base_hash(key);
    (0..NUM_HASHES).map(move |trial| trial_index(hash, trial, size))
}

/// Expected false positive rate `(1 - e^(-k*n/m))^k` for `n` keys in `m`
/// counters with `k` trials.
pub fn expected_false_positive_rate(n: usize, m: usize, k: usize) -> f64 {
    if m == 0 {
        return 1.0;
    }
    let exponent = -(k as f64) * n as f64 / m as f64;
    (1.0 - exponent.exp()).powi(k as i32)
}

/// Smallest counter array length that keeps `n` keys under `fpr` with
/// `NUM_HASHES` trials.
///
/// `fpr` must lie strictly between 0 and 1. The result is at least 1, so it
/// is always accepted as a filter size.
pub fn recommended_size(n: usize, fpr: f64) -> Result<usize> {
    if !(fpr > 0.0 && fpr < 1.0) {
        return Err(CbloomError::InvalidConfig(format!(
            "False positive rate must be in (0, 1), got {fpr}"
        )));
    }
    let k = NUM_HASHES as f64;
    let per_trial = fpr.powf(1.0 / k);
    let size = ((-k * n as f64) / (1.0 - per_trial).ln()).ceil() as usize;
    Ok(size.max(1))
}
