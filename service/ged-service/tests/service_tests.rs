use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ged_client::api::{ApiError, ApiInfo, Catalog, CatalogFile, DocumentApi, InMemoryDocumentApi};
use ged_model::{DocumentFile, DocumentId, SearchRequest, SearchResponse, SearchResultItem, SelectionEvent};
use ged_service::{
    AlwaysMounted, AutoSelectOutcome, DeepLink, DocumentView, GedService, MountFlag, SearchOutcome, SearchProgress,
    ServiceConfig, ServiceError, ViewState,
};

const PROTOCOL: &str = "23.000123/2024-01";

fn catalog() -> Catalog {
    Catalog {
        documents: vec![
            SearchResultItem::new(40, "Despacho", 2).with_protocol(PROTOCOL).with_extension("html"),
            SearchResultItem::new(41, "Oficio", 0).with_protocol(PROTOCOL).with_extension("pdf"),
            SearchResultItem::new(42, "Parecer", 1).with_protocol(PROTOCOL).with_extension("pdf"),
            SearchResultItem::new(50, "Memorando solto", 0).with_generated_protocol("GEN-7").with_extension("docx"),
            SearchResultItem::new(60, "Sem protocolo", 0).with_extension("txt"),
        ],
        files: vec![
            CatalogFile { id: DocumentId(40), content_type: "text/html; charset=utf-8".into(), body: "<p>Despacho</p>".into() },
            CatalogFile { id: DocumentId(41), content_type: "application/pdf".into(), body: "%PDF-1.7".into() },
        ],
    }
}

fn service() -> GedService {
    GedService::new(ServiceConfig::default(), Arc::new(InMemoryDocumentApi::new(catalog())))
}

/// Fails every search with a server error.
struct FailingApi {
    info: ApiInfo,
}

impl DocumentApi for FailingApi {
    fn search(&self, _request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        Err(ApiError::Status { status: 503, message: "unavailable".into() })
    }
    fn fetch_file(&self, _id: DocumentId) -> Result<DocumentFile, ApiError> {
        Err(ApiError::Status { status: 503, message: "unavailable".into() })
    }
    fn info(&self) -> &ApiInfo {
        &self.info
    }
}

/// Holds searches for `slow_protocol` until released.
struct GatedApi {
    inner: InMemoryDocumentApi,
    slow_protocol: String,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl DocumentApi for GatedApi {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        if request.protocol.as_deref() == Some(self.slow_protocol.as_str()) {
            self.entered.lock().expect("entered lock").send(()).expect("test listens");
            self.release.lock().expect("release lock").recv().expect("test releases");
        }
        self.inner.search(request)
    }
    fn fetch_file(&self, id: DocumentId) -> Result<DocumentFile, ApiError> {
        self.inner.fetch_file(id)
    }
    fn info(&self) -> &ApiInfo {
        self.inner.info()
    }
}

#[test]
fn protocol_search_builds_ordered_tree() {
    let svc = service();
    let outcome = svc.search(&SearchRequest::by_protocol(PROTOCOL)).expect("search succeeds");
    let tree = outcome.tree().expect("tree loaded");
    assert_eq!(tree.label, format!("Protocol {PROTOCOL}"));
    let ids: Vec<i64> = tree.children.iter().map(|c| c.id.0).collect();
    assert_eq!(ids, vec![41, 42, 40]);
    assert_eq!(svc.view_state().tree(), Some(tree));
}

#[test]
fn name_and_id_searches_take_label_from_first_result() {
    let svc = service();
    let outcome = svc.search(&SearchRequest::by_name("memorando")).expect("search succeeds");
    assert_eq!(outcome.tree().map(|t| t.protocol.as_str()), Some("GEN-7"));

    let outcome = svc.search(&SearchRequest::by_id(DocumentId(60))).expect("search succeeds");
    assert_eq!(outcome.tree().map(|t| t.protocol.as_str()), Some("60"), "no protocol: falls back to the query");
}

#[test]
fn empty_results_are_not_an_error() {
    let svc = service();
    let outcome = svc.search(&SearchRequest::by_protocol("nope")).expect("search succeeds");
    assert!(matches!(outcome, SearchOutcome::NoResults { ref protocol_label, .. } if protocol_label == "nope"));
    assert!(matches!(svc.view_state(), ViewState::NoResults { .. }));
}

#[test]
fn blank_criterion_is_rejected_before_any_request() {
    let svc = service();
    let err = svc.search(&SearchRequest::by_name("  ")).expect_err("blank name");
    assert!(matches!(err, ServiceError::EmptyQuery));
    assert_eq!(svc.view_state(), ViewState::Idle);
}

#[test]
fn failed_search_clears_the_tree() {
    let svc = GedService::new(
        ServiceConfig::default(),
        Arc::new(FailingApi { info: InMemoryDocumentApi::new(Catalog::default()).info().clone() }),
    );
    let mut events = Vec::new();
    let mut record = |ev: SearchProgress| events.push(ev);
    let err = svc
        .search_with_progress(&SearchRequest::by_protocol(PROTOCOL), Some(&mut record))
        .expect_err("server error surfaces");
    assert!(matches!(err, ServiceError::Api(ApiError::Status { status: 503, .. })));
    let state = svc.view_state();
    assert!(matches!(state, ViewState::Error { .. }));
    assert!(state.tree().is_none());
    assert!(matches!(events.as_slice(), [SearchProgress::Started { seq: 1 }, SearchProgress::Failed { seq: 1, .. }]));
}

#[test]
fn latest_search_wins_over_a_slower_earlier_one() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let api = GatedApi {
        inner: InMemoryDocumentApi::new(catalog()),
        slow_protocol: "GEN-7".into(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let svc = Arc::new(GedService::new(ServiceConfig::default(), Arc::new(api)));

    let (progress_tx, progress_rx) = mpsc::channel();
    let slow = svc.search_in_background(
        SearchRequest::by_protocol("GEN-7"),
        Box::new(move |ev: SearchProgress| {
            let _ = progress_tx.send(ev);
        }),
    );
    entered_rx.recv().expect("slow search reached the api");

    let fast = svc.search(&SearchRequest::by_protocol(PROTOCOL)).expect("fast search succeeds");
    assert_eq!(fast.seq(), 2);

    release_tx.send(()).expect("slow search waiting");
    let slow_outcome = slow.join().expect("worker joins").expect("slow search returns");
    assert_eq!(slow_outcome, SearchOutcome::Superseded { seq: 1 });

    let state = svc.view_state();
    assert_eq!(state.seq(), Some(2));
    assert_eq!(state.tree().map(|t| t.protocol.as_str()), Some(PROTOCOL));

    let progress: Vec<SearchProgress> = progress_rx.try_iter().collect();
    assert_eq!(progress, vec![SearchProgress::Started { seq: 1 }, SearchProgress::Superseded { seq: 1 }]);
}

#[test]
fn deep_link_selects_linked_document_without_interaction() {
    let svc = service();
    let selected: Arc<Mutex<Vec<SelectionEvent>>> = Arc::default();
    let sink = Arc::clone(&selected);
    let link = DeepLink::parse(&format!("?protocol={PROTOCOL}&documentId=42"));

    let opened = svc
        .open_deep_link(&link, Arc::new(AlwaysMounted), move |ev| sink.lock().expect("sink").push(ev))
        .expect("deep link opens");
    assert!(matches!(opened.outcome, SearchOutcome::Loaded { .. }));
    let outcome = opened.auto_select.expect("selection scheduled").wait();

    let expected = SelectionEvent { doc_id: DocumentId(42), extension: "pdf".into(), name: "Parecer".into() };
    assert_eq!(outcome, AutoSelectOutcome::Selected(expected.clone()));
    assert_eq!(*selected.lock().expect("selected"), vec![expected]);
    assert_eq!(svc.pending_selection(), None, "pending target is consumed");
}

#[test]
fn deep_link_to_absent_document_still_shows_tree() {
    let svc = service();
    let selected: Arc<Mutex<Vec<SelectionEvent>>> = Arc::default();
    let sink = Arc::clone(&selected);
    let link = DeepLink::parse(&format!("?protocol={PROTOCOL}&documentId=999"));

    let opened = svc
        .open_deep_link(&link, Arc::new(AlwaysMounted), move |ev| sink.lock().expect("sink").push(ev))
        .expect("deep link opens");
    let outcome = opened.auto_select.expect("target was pending").wait();
    assert_eq!(outcome, AutoSelectOutcome::NotFound);
    assert!(selected.lock().expect("selected").is_empty());
    assert_eq!(svc.view_state().tree().map(|t| t.len()), Some(3));
    assert_eq!(svc.pending_selection(), None);
}

#[test]
fn deep_link_with_only_a_document_searches_by_id() {
    let svc = service();
    let link = DeepLink::parse("documentId=50");
    let opened = svc.open_deep_link(&link, Arc::new(AlwaysMounted), |_| {}).expect("deep link opens");
    assert_eq!(opened.outcome.tree().map(|t| t.protocol.as_str()), Some("GEN-7"));
    assert!(matches!(opened.auto_select.expect("scheduled").wait(), AutoSelectOutcome::Selected(_)));

    let err = svc.open_deep_link(&DeepLink::default(), Arc::new(AlwaysMounted), |_| {}).expect_err("empty link");
    assert!(matches!(err, ServiceError::EmptyQuery));
}

#[test]
fn pending_selection_is_taken_at_most_once() {
    let svc = service();
    let outcome = svc.search(&SearchRequest::by_protocol(PROTOCOL)).expect("search succeeds");
    let tree = outcome.tree().expect("tree loaded");

    svc.set_pending_selection(DocumentId(40));
    let ev = svc.take_pending_selection(tree).expect("target in tree");
    assert_eq!(ev.doc_id, DocumentId(40));
    assert!(svc.take_pending_selection(tree).is_none());

    svc.set_pending_selection(DocumentId(1));
    assert!(svc.take_pending_selection(tree).is_none());
    assert_eq!(svc.pending_selection(), None, "missing target is dropped, not retried");
}

#[test]
fn selections_route_to_the_file_api() {
    let svc = service();
    let html = svc
        .open_document(&SelectionEvent { doc_id: DocumentId(40), extension: "html".into(), name: "Despacho".into() })
        .expect("html fetched");
    assert_eq!(html, DocumentView::Html("<p>Despacho</p>".into()));

    let pdf = svc
        .open_document(&SelectionEvent { doc_id: DocumentId(41), extension: "pdf".into(), name: "Oficio".into() })
        .expect("pdf fetched");
    assert_eq!(pdf.kind(), "pdf");
    assert_eq!(pdf.file_name("Oficio", "pdf"), "Oficio.pdf");

    let err = svc
        .open_document(&SelectionEvent { doc_id: DocumentId(42), extension: "pdf".into(), name: "Parecer".into() })
        .expect_err("no file for 42");
    assert!(matches!(err, ServiceError::Api(ApiError::Status { status: 404, .. })));
}

#[test]
fn clear_resets_view_and_pending_target() {
    let svc = service();
    svc.search(&SearchRequest::by_protocol(PROTOCOL)).expect("search succeeds");
    svc.set_pending_selection(DocumentId(41));
    svc.clear();
    assert_eq!(svc.view_state(), ViewState::Idle);
    assert_eq!(svc.pending_selection(), None);
}

#[test]
fn deep_link_waits_for_its_own_tree_to_be_painted() {
    let svc = service();
    let first = svc.search(&SearchRequest::by_name("memorando")).expect("search succeeds");
    let flag = MountFlag::new();
    flag.mark_mounted(first.seq());

    let selected: Arc<Mutex<Vec<SelectionEvent>>> = Arc::default();
    let sink = Arc::clone(&selected);
    let link = DeepLink::parse(&format!("?protocol={PROTOCOL}&documentId=41"));
    let opened = svc
        .open_deep_link(&link, Arc::new(flag.clone()), move |ev| sink.lock().expect("sink").push(ev))
        .expect("deep link opens");
    let handle = opened.auto_select.expect("selection scheduled");

    thread::sleep(Duration::from_millis(120));
    assert!(selected.lock().expect("selected").is_empty(), "fired against the previous tree");
    assert!(!handle.is_finished());

    flag.mark_mounted(opened.outcome.seq());
    assert!(matches!(handle.wait(), AutoSelectOutcome::Selected(ev) if ev.doc_id == DocumentId(41)));
    assert_eq!(selected.lock().expect("selected").len(), 1);
}

#[test]
fn failed_deep_link_does_not_leave_a_pending_target() {
    let svc = GedService::new(
        ServiceConfig::default(),
        Arc::new(FailingApi { info: InMemoryDocumentApi::new(Catalog::default()).info().clone() }),
    );
    let link = DeepLink::parse(&format!("?protocol={PROTOCOL}&documentId=42"));
    let err = svc.open_deep_link(&link, Arc::new(AlwaysMounted), |_| {}).expect_err("server error surfaces");
    assert!(matches!(err, ServiceError::Api(_)));
    assert_eq!(svc.pending_selection(), None);
}

#[test]
fn superseded_deep_link_does_not_leave_a_pending_target() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let api = GatedApi {
        inner: InMemoryDocumentApi::new(catalog()),
        slow_protocol: "GEN-7".into(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    };
    let svc = Arc::new(GedService::new(ServiceConfig::default(), Arc::new(api)));

    let worker = {
        let svc = Arc::clone(&svc);
        thread::spawn(move || svc.open_deep_link(&DeepLink::parse("?protocol=GEN-7&documentId=50"), Arc::new(AlwaysMounted), |_| {}))
    };
    entered_rx.recv().expect("link search reached the api");
    svc.search(&SearchRequest::by_protocol(PROTOCOL)).expect("newer search succeeds");
    release_tx.send(()).expect("link search waiting");

    let opened = worker.join().expect("worker joins").expect("link returns");
    assert!(matches!(opened.outcome, SearchOutcome::Superseded { seq: 1 }));
    assert!(opened.auto_select.is_none());
    assert_eq!(svc.pending_selection(), None);
}

#[test]
fn concurrent_searches_settle_on_the_latest() {
    let svc = Arc::new(service());
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let svc = Arc::clone(&svc);
            let req = if i % 2 == 0 { SearchRequest::by_protocol(PROTOCOL) } else { SearchRequest::by_name("memorando") };
            thread::spawn(move || svc.search(&req))
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker joins").expect("search returns");
    }
    let state = svc.view_state();
    assert_eq!(state.seq(), Some(8));
    assert!(state.tree().is_some(), "view stuck in {state:?}");
}
