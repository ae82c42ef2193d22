use std::sync::atomic::{AtomicU64, Ordering};

/// How a dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Success,
    /// The dispatcher returned an error or panicked.
    Failed(String),
}

impl FlushOutcome {
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Success)
    }
}

/// Summary of one completed flush cycle, handed to flush observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub queue: String,
    /// Messages in the dispatched batch.
    pub delivered: usize,
    pub acked: usize,
    pub requeued: usize,
    /// Messages discarded after reaching the attempt limit.
    pub dropped: usize,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    pub(crate) fn new(queue: &str, delivered: usize, outcome: FlushOutcome) -> Self {
        Self {
            queue: queue.to_owned(),
            delivered,
            acked: 0,
            requeued: 0,
            dropped: 0,
            outcome,
        }
    }
}

// Per-queue counters. Relaxed ordering: these are coarse and only read for
// reporting.
#[derive(Debug, Default)]
pub struct QueueStats {
    sent: AtomicU64,
    flushes: AtomicU64,
    failed_flushes: AtomicU64,
    delivered: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub sent: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    pub delivered: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dropped: u64,
}

impl QueueStats {
    #[inline]
    pub(crate) fn inc_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, report: &FlushReport) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        if !report.outcome.is_success() {
            self.failed_flushes.fetch_add(1, Ordering::Relaxed);
        }
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.acked.fetch_add(report.acked as u64, Ordering::Relaxed);
        self.requeued
            .fetch_add(report.requeued as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
