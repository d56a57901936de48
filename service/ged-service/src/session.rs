use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Issues monotonically increasing search sequence numbers. A newer ticket
/// supersedes every older one, so only the latest response gets applied.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    latest: Arc<AtomicU64>,
}

impl SearchSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> SearchTicket {
        let seq = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        SearchTicket { seq, latest: Arc::clone(&self.latest) }
    }

    /// Invalidates all outstanding tickets without starting a search.
    pub fn supersede_all(&self) {
        let _ = self.latest.fetch_add(1, Ordering::SeqCst);
    }

    pub fn latest_seq(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SearchTicket {
    seq: u64,
    latest: Arc<AtomicU64>,
}

impl SearchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.seq
    }
}
