// src/progress.rs

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};

/// Observer for a single chunk job, typically a progress bar.
///
/// A sink is told the total once headers are known, then receives byte
/// deltas as the body streams to disk, then exactly one of `complete` or
/// `abort`.
pub trait ProgressSink: Send + Sync {
    /// `None` when the server did not send a usable `Content-Length`.
    fn announce_total(&self, total: Option<u64>);
    fn report_progress(&self, delta: u64);
    fn complete(&self);
    fn abort(&self);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn announce_total(&self, _total: Option<u64>) {}
    fn report_progress(&self, _delta: u64) {}
    fn complete(&self) {}
    fn abort(&self) {}
}

/// Terminal state observed by a [`ProgressCounter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Running,
    Completed,
    Aborted,
}

/// Sink that keeps atomic counters, used by the manager for reporting and
/// handy in tests.
#[derive(Debug)]
pub struct ProgressCounter {
    /// -1 until announced, or when the total is unknown.
    total: AtomicI64,
    transferred: AtomicU64,
    state: AtomicU8,
}

impl Default for ProgressCounter {
    fn default() -> Self {
        Self {
            total: AtomicI64::new(-1),
            transferred: AtomicU64::new(0),
            state: AtomicU8::new(0),
        }
    }
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> Option<u64> {
        u64::try_from(self.total.load(Ordering::SeqCst)).ok()
    }

    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SinkState {
        match self.state.load(Ordering::SeqCst) {
            1 => SinkState::Completed,
            2 => SinkState::Aborted,
            _ => SinkState::Running,
        }
    }
}

impl ProgressSink for ProgressCounter {
    fn announce_total(&self, total: Option<u64>) {
        let raw = total.and_then(|t| i64::try_from(t).ok()).unwrap_or(-1);
        self.total.store(raw, Ordering::SeqCst);
    }

    fn report_progress(&self, delta: u64) {
        self.transferred.fetch_add(delta, Ordering::SeqCst);
    }

    fn complete(&self) {
        self.state.store(1, Ordering::SeqCst);
    }

    fn abort(&self) {
        self.state.store(2, Ordering::SeqCst);
    }
}
