use crate::hash::{NUM_HASHES, trial_index};

/// Fixed-length array of saturating `u8` counters.
///
/// Keys are addressed by their base hash (see [`crate::hash::base_hash`]);
/// each operation touches the `NUM_HASHES` positions derived from it.
#[derive(Debug, Clone)]
pub struct CounterArray {
    counters: Vec<u8>,
    saturated: u64,
}

impl CounterArray {
    pub fn new(size: usize) -> Self {
        Self {
            counters: vec![0; size],
            saturated: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.counters.get(index).copied()
    }

    fn positions(&self, hash: u64) -> impl Iterator<Item = usize> + use<> {
        let size = self.counters.len();
        (0..NUM_HASHES).map(move |trial| trial_index(hash, trial, size))
    }

    /// +1 on every position of the key, holding at `u8::MAX`.
    pub fn increment_all(&mut self, hash: u64) {
        for idx in self.positions(hash) {
            match self.counters[idx].checked_add(1) {
                Some(value) => self.counters[idx] = value,
                None => self.saturated += 1,
            }
        }
    }

    /// -1 on every position of the key that is above zero.
    pub fn decrement_all(&mut self, hash: u64) {
        for idx in self.positions(hash) {
            self.counters[idx] = self.counters[idx].saturating_sub(1);
        }
    }

    /// Membership test: false as soon as one position is zero.
    pub fn all_nonzero(&self, hash: u64) -> bool {
        self.positions(hash).all(|idx| self.counters[idx] > 0)
    }

    pub fn reset_all(&mut self) {
        self.counters.fill(0);
    }

    /// Decrement `[start, start + count)`, clamped to the array bounds.
    ///
    /// Returns how many counters actually went down.
    pub fn decrement_range(&mut self, start: usize, count: usize) -> usize {
        let len = self.counters.len();
        let start = start.min(len);
        let end = start.saturating_add(count).min(len);

        let mut decremented = 0;
        for counter in &mut self.counters[start..end] {
            if *counter > 0 {
                *counter -= 1;
                decremented += 1;
            }
        }
        decremented
    }

    pub fn nonzero_count(&self) -> usize {
        self.counters.iter().filter(|&&c| c > 0).count()
    }

    /// Increments dropped because a counter was already at `u8::MAX`.
    pub fn saturated_increments(&self) -> u64 {
        self.saturated
    }
}
