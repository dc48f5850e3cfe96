// Buffer accounting for the pull loop

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the sink's buffer counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    pub allocated: u64,
    pub freed: u64,
    /// Buffers currently owned by the sink (0 or 1)
    pub live: u64,
    pub enqueued: u64,
    pub enqueue_failures: u64,
    pub retries: u64,
    pub dropped: u64,
}

#[derive(Default)]
pub(crate) struct EnqueueCounters {
    enqueued: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

impl EnqueueCounters {
    pub fn record_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new dropped total
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self, allocated: u64, freed: u64, live: bool) -> BufferStats {
        BufferStats {
            allocated,
            freed,
            live: live as u64,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            enqueue_failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
