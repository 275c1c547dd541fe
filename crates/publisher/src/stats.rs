//! Publisher counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot returned by `Publisher::stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublisherStats {
    /// Successful emissions (a flushed batch group counts once)
    pub published: u64,
    /// Emissions with failures that were not handed to the retry loop
    pub failed: u64,
    /// Batch groups emitted
    pub batches_flushed: u64,
    pub retries_scheduled: u64,
    pub retries_succeeded: u64,
    pub retries_exhausted: u64,
    /// Events waiting in the batch queue
    pub batch_queue_len: usize,
    /// Events waiting in the retry queue
    pub retry_queue_len: usize,
    pub batching_enabled: bool,
    pub destroyed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PublisherCounters {
    published: AtomicU64,
    failed: AtomicU64,
    batches_flushed: AtomicU64,
    retries_scheduled: AtomicU64,
    retries_succeeded: AtomicU64,
    retries_exhausted: AtomicU64,
}

impl PublisherCounters {
    pub(crate) fn inc_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_batches_flushed(&self) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_retries_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_retries_succeeded(&self) {
        self.retries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_retries_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counter part of the snapshot; queue lengths are filled by the caller
    pub(crate) fn snapshot(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            retries_succeeded: self.retries_succeeded.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            ..PublisherStats::default()
        }
    }
}
