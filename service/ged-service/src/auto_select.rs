//! Programmatic selection of one tree leaf once the tree is on screen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ged_model::{DocumentId, SelectionEvent, TreeNode};
use tracing::{debug, warn};

use crate::CancelToken;

/// Longest single sleep while waiting, so cancellation is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Readiness of the surface that renders the tree.
pub trait MountProbe: Send + Sync {
    /// Whether the tree built by search `seq` (or a newer one) is on screen.
    fn is_mounted(&self, seq: u64) -> bool;
}

/// Ready signal a rendering surface raises after it has laid out the tree of
/// a given search. Holds the newest search seq painted so far; 0 means none.
#[derive(Debug, Clone, Default)]
pub struct MountFlag(Arc<AtomicU64>);

impl MountFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn mark_mounted(&self, seq: u64) {
        self.0.fetch_max(seq, Ordering::AcqRel);
    }
    pub fn mounted_seq(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

impl MountProbe for MountFlag {
    fn is_mounted(&self, seq: u64) -> bool {
        self.mounted_seq() >= seq
    }
}

/// Probe for surfaces that render synchronously (CLI output, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysMounted;

impl MountProbe for AlwaysMounted {
    fn is_mounted(&self, _seq: u64) -> bool {
        true
    }
}

/// Bounded wait for the ready signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSelectOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for AutoSelectOptions {
    fn default() -> Self {
        Self { poll_interval: Duration::from_millis(50), timeout: Duration::from_secs(5) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSelectOutcome {
    Selected(SelectionEvent),
    NotFound,
    TimedOut,
    Canceled,
}

/// Target document to open once the next tree is built. Consumed at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingAutoSelection {
    target: Option<DocumentId>,
}

impl PendingAutoSelection {
    pub fn new(target: Option<DocumentId>) -> Self {
        Self { target }
    }
    pub fn set(&mut self, target: DocumentId) {
        self.target = Some(target);
    }
    pub fn target(&self) -> Option<DocumentId> {
        self.target
    }
    pub fn is_pending(&self) -> bool {
        self.target.is_some()
    }
    pub fn take(&mut self) -> Option<DocumentId> {
        self.target.take()
    }
    pub fn clear(&mut self) {
        self.target = None;
    }
}

/// Handle on a scheduled selection.
#[derive(Debug)]
pub struct AutoSelectHandle {
    cancel: CancelToken,
    worker: Option<JoinHandle<AutoSelectOutcome>>,
    settled: Option<AutoSelectOutcome>,
}

impl AutoSelectHandle {
    fn settled(outcome: AutoSelectOutcome) -> Self {
        Self { cancel: CancelToken::new(), worker: None, settled: Some(outcome) }
    }

    /// Stops a pending selection; the not-found callback runs instead.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        match &self.worker {
            Some(worker) => worker.is_finished(),
            None => true,
        }
    }

    /// Blocks until the callbacks have run.
    pub fn wait(mut self) -> AutoSelectOutcome {
        if let Some(outcome) = self.settled.take() {
            return outcome;
        }
        match self.worker.take().map(JoinHandle::join) {
            Some(Ok(outcome)) => outcome,
            _ => AutoSelectOutcome::Canceled,
        }
    }
}

/// Selects `target_id` after a fixed `delay`.
///
/// A target missing from `tree` calls `on_not_found` right away on the caller's
/// thread. Otherwise `on_found` runs once on a worker thread after `delay`,
/// unless the handle is cancelled first, in which case `on_not_found` runs.
pub fn schedule_auto_select<F, G>(
    tree: &TreeNode,
    target_id: DocumentId,
    on_found: F,
    on_not_found: G,
    delay: Duration,
) -> AutoSelectHandle
where
    F: FnOnce(SelectionEvent) + Send + 'static,
    G: FnOnce() + Send + 'static,
{
    let Some(event) = lookup(tree, target_id) else {
        on_not_found();
        return AutoSelectHandle::settled(AutoSelectOutcome::NotFound);
    };
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let worker = thread::spawn(move || {
        let deadline = Instant::now() + delay;
        while !token.is_canceled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
        if token.is_canceled() {
            debug!(doc_id = %event.doc_id, "auto-selection canceled");
            on_not_found();
            return AutoSelectOutcome::Canceled;
        }
        on_found(event.clone());
        AutoSelectOutcome::Selected(event)
    });
    AutoSelectHandle { cancel, worker: Some(worker), settled: None }
}

/// Selects `target_id` as soon as `probe` reports the tree of search `seq`
/// mounted. A tree left over from an earlier search does not count.
///
/// Polls every `options.poll_interval` for at most `options.timeout`; running
/// out of time degrades to `on_not_found` instead of waiting forever.
pub fn schedule_auto_select_when_ready<F, G>(
    tree: &TreeNode,
    target_id: DocumentId,
    seq: u64,
    probe: Arc<dyn MountProbe>,
    options: AutoSelectOptions,
    on_found: F,
    on_not_found: G,
) -> AutoSelectHandle
where
    F: FnOnce(SelectionEvent) + Send + 'static,
    G: FnOnce() + Send + 'static,
{
    let Some(event) = lookup(tree, target_id) else {
        on_not_found();
        return AutoSelectHandle::settled(AutoSelectOutcome::NotFound);
    };
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let poll = options.poll_interval.max(Duration::from_millis(1));
    let worker = thread::spawn(move || {
        let deadline = Instant::now() + options.timeout;
        loop {
            if token.is_canceled() {
                debug!(doc_id = %event.doc_id, "auto-selection canceled");
                on_not_found();
                return AutoSelectOutcome::Canceled;
            }
            if probe.is_mounted(seq) {
                on_found(event.clone());
                return AutoSelectOutcome::Selected(event);
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(doc_id = %event.doc_id, seq, timeout_ms = options.timeout.as_millis() as u64, "tree never reported mounted; dropping auto-selection");
                on_not_found();
                return AutoSelectOutcome::TimedOut;
            }
            thread::sleep((deadline - now).min(poll));
        }
    });
    AutoSelectHandle { cancel, worker: Some(worker), settled: None }
}

fn lookup(tree: &TreeNode, target_id: DocumentId) -> Option<SelectionEvent> {
    match tree.find(target_id) {
        Some(leaf) => Some(SelectionEvent::from(leaf)),
        None => {
            warn!(doc_id = %target_id, protocol = %tree.protocol, "auto-selection target not in tree; dropping");
            None
        }
    }
}
