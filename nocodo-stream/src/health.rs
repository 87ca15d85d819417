use shared_types::StreamSummary;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

const RECENT_CLOSED: usize = 64;

/// Flush failures and the most recently closed streams, shared by all adapters
#[derive(Default)]
pub struct HealthLedger {
    failures: AtomicU64,
    closed: Mutex<VecDeque<StreamSummary>>,
}

impl HealthLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn record_closed(&self, summary: StreamSummary) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if closed.len() == RECENT_CLOSED {
            closed.pop_front();
        }
        closed.push_back(summary);
    }

    /// Newest first
    pub fn recently_closed(&self) -> Vec<StreamSummary> {
        let closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        closed.iter().rev().cloned().collect()
    }

    pub fn reset(&self) {
        self.failures.store(0, Ordering::Relaxed);
        self.closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
