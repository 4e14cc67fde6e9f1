use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for a forwarder, shared across concurrent reconciliations.
#[derive(Debug, Default)]
pub struct ForwarderStats {
    accepted: AtomicU64,
    publish_failures: AtomicU64,
    skipped: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Point-in-time copy of [`ForwarderStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub publish_failures: u64,
    pub skipped: u64,
    pub fetch_failures: u64,
}

impl ForwarderStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}
