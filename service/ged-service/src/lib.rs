use std::sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ged_client::api::{ApiError, ApiInfo, DocumentApi};
use ged_model::{DocumentId, Pagination, SearchRequest, SearchResultItem, SearchType, SelectionEvent, TreeNode};
use tracing::{debug, info, warn};

pub mod auto_select;
pub mod deep_link;
pub mod document_view;
pub mod projector;
pub mod session;
pub mod view_state;

pub use auto_select::{
    schedule_auto_select, schedule_auto_select_when_ready, AlwaysMounted, AutoSelectHandle, AutoSelectOptions,
    AutoSelectOutcome, MountFlag, MountProbe, PendingAutoSelection,
};
pub use deep_link::DeepLink;
pub use document_view::DocumentView;
pub use projector::{project, resolve_effective_protocol};
pub use session::{SearchSession, SearchTicket};
pub use view_state::{ViewEvent, ViewState};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("no search criterion given")]
    EmptyQuery,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Wait before a fixed-delay auto-selection fires.
    pub auto_select_delay: Duration,
    /// Ready-signal polling used for deep-link auto-selection.
    pub auto_select: AutoSelectOptions,
    /// Page size sent when a request does not set one.
    pub page_size: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            auto_select_delay: Duration::from_millis(1000),
            auto_select: AutoSelectOptions::default(),
            page_size: 50,
        }
    }
}

/// Cooperative cancellation handle shared across background work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);
impl CancelToken {
    pub fn new() -> Self { Self(Arc::new(AtomicBool::new(false))) }
    pub fn cancel(&self) { self.0.store(true, Ordering::Relaxed); }
    pub fn is_canceled(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

/// Result of one search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Loaded { seq: u64, tree: TreeNode, pagination: Option<Pagination> },
    NoResults { seq: u64, protocol_label: String },
    /// A newer search was issued while this one was in flight; nothing was applied.
    Superseded { seq: u64 },
}

impl SearchOutcome {
    pub fn seq(&self) -> u64 {
        match self {
            SearchOutcome::Loaded { seq, .. }
            | SearchOutcome::NoResults { seq, .. }
            | SearchOutcome::Superseded { seq } => *seq,
        }
    }

    pub fn tree(&self) -> Option<&TreeNode> {
        match self {
            SearchOutcome::Loaded { tree, .. } => Some(tree),
            _ => None,
        }
    }
}

/// Progress events emitted by a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchProgress {
    Started { seq: u64 },
    Finished { seq: u64, documents: usize },
    Superseded { seq: u64 },
    Failed { seq: u64, message: String },
}

/// Result of opening a deep link: the search plus the scheduled selection, if any.
#[derive(Debug)]
pub struct DeepLinkOpen {
    pub outcome: SearchOutcome,
    pub auto_select: Option<AutoSelectHandle>,
}

pub struct GedService {
    cfg: ServiceConfig,
    api: Arc<dyn DocumentApi>,
    session: SearchSession,
    view: Arc<RwLock<ViewState>>,
    pending: Mutex<PendingAutoSelection>,
    // Cancel handle of the auto-selection scheduled against the current tree
    auto_select_cancel: Mutex<Option<CancelToken>>,
}

impl GedService {
    pub fn new(cfg: ServiceConfig, api: Arc<dyn DocumentApi>) -> Self {
        info!(backend = ?api.info().backend, endpoint = %api.info().endpoint, "document service ready");
        Self {
            cfg,
            api,
            session: SearchSession::new(),
            view: Arc::new(RwLock::new(ViewState::Idle)),
            pending: Mutex::new(PendingAutoSelection::default()),
            auto_select_cancel: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    pub fn api_info(&self) -> &ApiInfo {
        self.api.info()
    }

    /// Snapshot of the current view.
    pub fn view_state(&self) -> ViewState {
        match self.view.read() {
            Ok(v) => v.clone(),
            Err(_) => ViewState::Idle,
        }
    }

    fn update_view(&self, event: ViewEvent) {
        if let Ok(mut guard) = self.view.write() {
            let current = std::mem::take(&mut *guard);
            *guard = current.apply(event);
        }
    }

    /// Takes a ticket and moves the view to `Loading` under one view lock, so
    /// concurrent searches reach the view in ticket order.
    fn begin_search(&self) -> SearchTicket {
        match self.view.write() {
            Ok(mut guard) => {
                let ticket = self.session.begin();
                let current = std::mem::take(&mut *guard);
                *guard = current.apply(ViewEvent::Started { seq: ticket.seq() });
                ticket
            }
            Err(_) => self.session.begin(),
        }
    }

    fn cancel_auto_select(&self) {
        if let Ok(mut slot) = self.auto_select_cancel.lock() {
            if let Some(token) = slot.take() {
                token.cancel();
            }
        }
    }

    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, ServiceError> {
        self.search_with_progress(request, None)
    }

    /// Runs one search and applies it to the view if it is still the latest.
    ///
    /// A failure moves the view to `Error` (the previous tree is not kept) and
    /// is returned. A response that arrives after a newer search was issued is
    /// discarded and reported as [`SearchOutcome::Superseded`].
    pub fn search_with_progress(
        &self,
        request: &SearchRequest,
        mut progress: Option<&mut (dyn FnMut(SearchProgress) + Send)>,
    ) -> Result<SearchOutcome, ServiceError> {
        if request.search_type != SearchType::Advanced && request.criterion().trim().is_empty() {
            return Err(ServiceError::EmptyQuery);
        }
        let mut request = request.clone();
        if request.page_size.is_none() {
            request.page = Some(request.page.unwrap_or(1));
            request.page_size = Some(self.cfg.page_size);
        }

        self.cancel_auto_select();
        let ticket = self.begin_search();
        let seq = ticket.seq();
        if let Some(cb) = progress.as_deref_mut() { cb(SearchProgress::Started { seq }); }
        info!(seq, search_type = ?request.search_type, criterion = %request.criterion(), "search issued");

        let result = self.api.search(&request);
        if !ticket.is_current() {
            debug!(seq, latest = self.session.latest_seq(), "discarding superseded search response");
            if let Some(cb) = progress.as_deref_mut() { cb(SearchProgress::Superseded { seq }); }
            return Ok(SearchOutcome::Superseded { seq });
        }

        match result {
            Err(err) => {
                warn!(seq, error = %err, "search failed");
                self.update_view(ViewEvent::Failed { seq, message: err.to_string() });
                if let Some(cb) = progress.as_deref_mut() { cb(SearchProgress::Failed { seq, message: err.to_string() }); }
                Err(err.into())
            }
            Ok(resp) => {
                let label = tree_label(&request, &resp.data);
                let tree = projector::project(&resp.data, &label);
                info!(seq, documents = tree.len(), protocol = %label, "search completed");
                self.update_view(ViewEvent::Succeeded { seq, tree: tree.clone() });
                if let Some(cb) = progress.as_deref_mut() { cb(SearchProgress::Finished { seq, documents: tree.len() }); }
                if tree.is_empty() {
                    Ok(SearchOutcome::NoResults { seq, protocol_label: label })
                } else {
                    Ok(SearchOutcome::Loaded { seq, tree, pagination: resp.pagination })
                }
            }
        }
    }

    /// Same as [`GedService::search_with_progress`] on a worker thread.
    pub fn search_in_background(
        self: &Arc<Self>,
        request: SearchRequest,
        mut progress: Box<dyn FnMut(SearchProgress) + Send>,
    ) -> JoinHandle<Result<SearchOutcome, ServiceError>> {
        let svc = Arc::clone(self);
        thread::spawn(move || svc.search_with_progress(&request, Some(progress.as_mut())))
    }

    pub fn set_pending_selection(&self, target: DocumentId) {
        if let Ok(mut p) = self.pending.lock() { p.set(target); }
    }

    pub fn pending_selection(&self) -> Option<DocumentId> {
        self.pending.lock().ok().and_then(|p| p.target())
    }

    /// Consumes the pending target against a freshly built tree.
    pub fn take_pending_selection(&self, tree: &TreeNode) -> Option<SelectionEvent> {
        let target = self.pending.lock().ok().and_then(|mut p| p.take())?;
        match tree.find(target) {
            Some(leaf) => Some(SelectionEvent::from(leaf)),
            None => {
                warn!(doc_id = %target, protocol = %tree.protocol, "pending selection not in tree; dropping");
                None
            }
        }
    }

    /// Schedules the pending target against `tree` (built by search `seq`),
    /// waiting until `probe` reports that tree on screen.
    pub fn schedule_pending_selection<F>(
        &self,
        tree: &TreeNode,
        seq: u64,
        probe: Arc<dyn MountProbe>,
        on_found: F,
    ) -> Option<AutoSelectHandle>
    where
        F: FnOnce(SelectionEvent) + Send + 'static,
    {
        let target = self.pending.lock().ok().and_then(|mut p| p.take())?;
        let handle = schedule_auto_select_when_ready(tree, target, seq, probe, self.cfg.auto_select, on_found, || {});
        if !handle.is_finished() {
            if let Ok(mut slot) = self.auto_select_cancel.lock() {
                *slot = Some(handle.cancel_token());
            }
        }
        Some(handle)
    }

    /// Clears the pending target if it is still `target`; a newer request may
    /// have replaced it in the meantime.
    fn drop_pending(&self, target: Option<DocumentId>, reason: &str) {
        let Some(target) = target else { return };
        if let Ok(mut p) = self.pending.lock() {
            if p.target() == Some(target) {
                p.clear();
                warn!(doc_id = %target, "{reason}; dropping pending selection");
            }
        }
    }

    /// Opens a navigation target: protocol search (or id search when only a
    /// document is given), then auto-selection of the linked document.
    pub fn open_deep_link<F>(
        &self,
        link: &DeepLink,
        probe: Arc<dyn MountProbe>,
        on_found: F,
    ) -> Result<DeepLinkOpen, ServiceError>
    where
        F: FnOnce(SelectionEvent) + Send + 'static,
    {
        let request = match (&link.protocol, link.document_id) {
            (Some(protocol), _) => SearchRequest::by_protocol(protocol.clone()),
            (None, Some(id)) => SearchRequest::by_id(id),
            (None, None) => return Err(ServiceError::EmptyQuery),
        };
        if let Ok(mut p) = self.pending.lock() {
            *p = link.pending();
        }
        let outcome = match self.search(&request) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.drop_pending(link.document_id, "deep-link search failed");
                return Err(err);
            }
        };
        let auto_select = match &outcome {
            SearchOutcome::Loaded { seq, tree, .. } => self.schedule_pending_selection(tree, *seq, probe, on_found),
            SearchOutcome::NoResults { .. } => {
                self.drop_pending(link.document_id, "search returned no documents");
                None
            }
            SearchOutcome::Superseded { .. } => {
                self.drop_pending(link.document_id, "deep-link search superseded");
                None
            }
        };
        Ok(DeepLinkOpen { outcome, auto_select })
    }

    /// Fetches the file behind a selection and classifies it.
    pub fn open_document(&self, selection: &SelectionEvent) -> Result<DocumentView, ServiceError> {
        let file = self.api.fetch_file(selection.doc_id)?;
        info!(doc_id = %selection.doc_id, content_type = %file.content_type, bytes = file.bytes.len(), "document fetched");
        Ok(DocumentView::classify(file, &selection.extension))
    }

    /// Drops the tree, any in-flight search and any pending selection.
    pub fn clear(&self) {
        self.cancel_auto_select();
        if let Ok(mut p) = self.pending.lock() { p.clear(); }
        match self.view.write() {
            Ok(mut guard) => {
                self.session.supersede_all();
                let current = std::mem::take(&mut *guard);
                *guard = current.apply(ViewEvent::Cleared);
            }
            Err(_) => self.session.supersede_all(),
        }
    }
}

fn tree_label(request: &SearchRequest, results: &[SearchResultItem]) -> String {
    if request.search_type == SearchType::Protocol {
        if let Some(p) = request.protocol.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return p.to_string();
        }
    }
    resolve_effective_protocol(results).unwrap_or_else(|| request.criterion())
}
