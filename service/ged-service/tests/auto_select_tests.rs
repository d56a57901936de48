use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ged_model::{DocumentId, SearchResultItem, SelectionEvent, TreeNode};
use ged_service::{
    project, schedule_auto_select, schedule_auto_select_when_ready, AlwaysMounted, AutoSelectOptions,
    AutoSelectOutcome, MountFlag, MountProbe, PendingAutoSelection,
};

#[derive(Clone, Default)]
struct Calls {
    found: Arc<Mutex<Vec<SelectionEvent>>>,
    not_found: Arc<AtomicUsize>,
}

impl Calls {
    fn on_found(&self) -> impl FnOnce(SelectionEvent) + Send + 'static {
        let found = Arc::clone(&self.found);
        move |ev| found.lock().expect("found lock").push(ev)
    }
    fn on_not_found(&self) -> impl FnOnce() + Send + 'static {
        let not_found = Arc::clone(&self.not_found);
        move || {
            not_found.fetch_add(1, Ordering::SeqCst);
        }
    }
    fn found(&self) -> Vec<SelectionEvent> {
        self.found.lock().expect("found lock").clone()
    }
    fn not_found(&self) -> usize {
        self.not_found.load(Ordering::SeqCst)
    }
}

fn tree_with_seven() -> TreeNode {
    project(&[SearchResultItem::new(7, "Oficio 7", 0).with_extension("pdf")], "P")
}

fn quick_options(timeout_ms: u64) -> AutoSelectOptions {
    AutoSelectOptions { poll_interval: Duration::from_millis(5), timeout: Duration::from_millis(timeout_ms) }
}

#[test]
fn found_target_fires_once_with_leaf_fields() {
    let calls = Calls::default();
    let handle = schedule_auto_select(&tree_with_seven(), DocumentId(7), calls.on_found(), calls.on_not_found(), Duration::ZERO);
    let outcome = handle.wait();

    let expected = SelectionEvent { doc_id: DocumentId(7), extension: "pdf".into(), name: "Oficio 7".into() };
    assert_eq!(outcome, AutoSelectOutcome::Selected(expected.clone()));
    assert_eq!(calls.found(), vec![expected]);
    assert_eq!(calls.not_found(), 0);
}

#[test]
fn missing_target_reports_not_found_immediately() {
    let calls = Calls::default();
    let handle = schedule_auto_select(&tree_with_seven(), DocumentId(99), calls.on_found(), calls.on_not_found(), Duration::from_secs(60));
    // callback already ran on this thread
    assert_eq!(calls.not_found(), 1);
    assert!(handle.is_finished());
    assert_eq!(handle.wait(), AutoSelectOutcome::NotFound);
    assert!(calls.found().is_empty());
}

#[test]
fn canceled_delay_degrades_to_not_found() {
    let calls = Calls::default();
    let handle = schedule_auto_select(&tree_with_seven(), DocumentId(7), calls.on_found(), calls.on_not_found(), Duration::from_secs(60));
    handle.cancel();
    assert_eq!(handle.wait(), AutoSelectOutcome::Canceled);
    assert!(calls.found().is_empty());
    assert_eq!(calls.not_found(), 1);
}

#[test]
fn ready_signal_releases_the_selection() {
    let calls = Calls::default();
    let flag = MountFlag::new();
    let handle = schedule_auto_select_when_ready(
        &tree_with_seven(),
        DocumentId(7),
        1,
        Arc::new(flag.clone()),
        quick_options(5_000),
        calls.on_found(),
        calls.on_not_found(),
    );
    thread::sleep(Duration::from_millis(30));
    assert!(calls.found().is_empty(), "must not select before the tree is mounted");
    flag.mark_mounted(1);

    assert!(matches!(handle.wait(), AutoSelectOutcome::Selected(ev) if ev.doc_id == DocumentId(7)));
    assert_eq!(calls.found().len(), 1);
    assert_eq!(calls.not_found(), 0);
}

#[test]
fn already_mounted_tree_selects_without_waiting() {
    let calls = Calls::default();
    let handle = schedule_auto_select_when_ready(
        &tree_with_seven(),
        DocumentId(7),
        1,
        Arc::new(AlwaysMounted),
        quick_options(50),
        calls.on_found(),
        calls.on_not_found(),
    );
    assert!(matches!(handle.wait(), AutoSelectOutcome::Selected(_)));
    assert_eq!(calls.found().len(), 1);
}

#[test]
fn readiness_timeout_degrades_to_not_found() {
    let calls = Calls::default();
    let handle = schedule_auto_select_when_ready(
        &tree_with_seven(),
        DocumentId(7),
        1,
        Arc::new(MountFlag::new()),
        quick_options(40),
        calls.on_found(),
        calls.on_not_found(),
    );
    assert_eq!(handle.wait(), AutoSelectOutcome::TimedOut);
    assert!(calls.found().is_empty());
    assert_eq!(calls.not_found(), 1);
}

#[test]
fn pending_selection_is_consumed_once() {
    let mut pending = PendingAutoSelection::new(Some(DocumentId(42)));
    assert!(pending.is_pending());
    assert_eq!(pending.take(), Some(DocumentId(42)));
    assert_eq!(pending.take(), None);
    assert!(!pending.is_pending());
}

#[test]
fn tree_from_an_earlier_search_does_not_count_as_mounted() {
    let calls = Calls::default();
    let flag = MountFlag::new();
    // the previous search's tree is still on screen
    flag.mark_mounted(3);
    let handle = schedule_auto_select_when_ready(
        &tree_with_seven(),
        DocumentId(7),
        4,
        Arc::new(flag.clone()),
        quick_options(5_000),
        calls.on_found(),
        calls.on_not_found(),
    );
    thread::sleep(Duration::from_millis(30));
    assert!(calls.found().is_empty(), "stale tree released the selection");
    assert!(!handle.is_finished());

    flag.mark_mounted(4);
    assert!(matches!(handle.wait(), AutoSelectOutcome::Selected(_)));
    assert_eq!(calls.found().len(), 1);
}

#[test]
fn mount_flag_only_moves_forward() {
    let flag = MountFlag::new();
    assert!(!flag.is_mounted(1));
    flag.mark_mounted(5);
    flag.mark_mounted(2);
    assert_eq!(flag.mounted_seq(), 5);
    assert!(flag.is_mounted(5));
    assert!(!flag.is_mounted(6));
}
