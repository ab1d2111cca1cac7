use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Counters describing what a transport has done.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub(crate) appends: AtomicU64,
    pub(crate) append_failures: AtomicU64,
    pub(crate) deliveries: AtomicU64,
    pub(crate) malformed_dropped: AtomicU64,
    pub(crate) read_failures: AtomicU64,
    pub(crate) acks: AtomicU64,
    pub(crate) ack_failures: AtomicU64,
    pub(crate) groups_created: AtomicU64,
    pub(crate) recoveries: AtomicU64,
    pub(crate) acks_into_fresh_group: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub appends: u64,
    pub append_failures: u64,
    pub deliveries: u64,
    pub malformed_dropped: u64,
    pub read_failures: u64,
    pub acks: u64,
    pub ack_failures: u64,
    pub groups_created: u64,
    pub recoveries: u64,
    /// Acknowledgments that had to provision their group first
    pub acks_into_fresh_group: u64,
}

impl TransportStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            appends: self.appends.load(Ordering::Relaxed),
            append_failures: self.append_failures.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            acks: self.acks.load(Ordering::Relaxed),
            ack_failures: self.ack_failures.load(Ordering::Relaxed),
            groups_created: self.groups_created.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            acks_into_fresh_group: self.acks_into_fresh_group.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    add(counter, 1);
}

pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}
