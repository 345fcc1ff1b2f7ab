//! Statistics reported by lifecycle operations.

use std::time::{Duration, Instant};

/// Which reconciliation path an activation took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// No manifest had been recorded; the live partition was rebuilt from scratch.
    FreshInstall,
    /// A previous manifest was found and used as the diff baseline.
    Upgrade,
}

/// Statistics for one successful activation.
#[derive(Debug, Clone)]
pub struct ActivationStats {
    /// Reconciliation path taken.
    pub kind: ActivationKind,
    /// Live entries kept because their fingerprint did not change.
    pub retained: usize,
    /// Live entries removed because they vanished from or changed in the manifest.
    pub evicted: usize,
    /// Shell entries promoted from staging into the live partition.
    pub promoted: usize,
    /// Time spent reconciling.
    pub elapsed: Duration,
}

/// Builder for accumulating activation statistics while reconciling.
#[derive(Debug)]
pub struct ActivationStatsBuilder {
    kind: ActivationKind,
    retained: usize,
    evicted: usize,
    promoted: usize,
    start_time: Instant,
}

impl ActivationStatsBuilder {
    /// Creates a builder for the given reconciliation path.
    #[must_use]
    pub fn new(kind: ActivationKind) -> Self {
        Self {
            kind,
            retained: 0,
            evicted: 0,
            promoted: 0,
            start_time: Instant::now(),
        }
    }

    /// Records a live entry that was kept.
    pub const fn add_retained(&mut self) {
        self.retained += 1;
    }

    /// Records a live entry that was removed.
    pub const fn add_evicted(&mut self) {
        self.evicted += 1;
    }

    /// Sets the number of entries promoted from staging.
    pub const fn set_promoted(&mut self, count: usize) {
        self.promoted = count;
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(self) -> ActivationStats {
        ActivationStats {
            kind: self.kind,
            retained: self.retained,
            evicted: self.evicted,
            promoted: self.promoted,
            elapsed: self.start_time.elapsed(),
        }
    }
}

/// Statistics for a batch download into a partition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Resources requested from the network.
    pub fetched: usize,
    /// Resources skipped because they were already cached.
    pub skipped: usize,
    /// Sum of the stored body sizes in bytes.
    pub total_bytes: u64,
}
