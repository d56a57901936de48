use std::env;
use std::fs;
use std::sync::{mpsc::{self, Receiver, Sender, TryRecvError}, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use eframe::egui::{self, Button, CentralPanel, ComboBox, DragValue, ScrollArea, SidePanel, Spinner, TextEdit, TopBottomPanel};
use eframe::{App, CreationContext, Frame, NativeOptions};
use egui_extras::{Column, TableBuilder};
use rfd::FileDialog;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use ged_client::api::{DocumentApi, HttpDocumentApi, InMemoryDocumentApi};
use ged_client::config::ClientConfig;
use ged_model::{DocumentId, IconKey, SearchRequest, SearchType, SelectionEvent, TreeNode};
use ged_service::{
    AutoSelectOutcome, DeepLink, DocumentView, GedService, MountFlag, SearchOutcome, SearchProgress, ServiceConfig,
    ServiceError, ViewState,
};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
    let options = NativeOptions::default();
    eframe::run_native(
        "GED Document Browser",
        options,
        Box::new(|cc| Box::new(AppState::new(cc))),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveTab {
    Browse,
    Config,
}

/// Messages from worker threads back to the UI thread.
enum GuiEvent {
    Search(SearchProgress),
    LinkOpened(Result<(), String>),
    AutoSelected(SelectionEvent),
    AutoSelectDone(AutoSelectOutcome),
    Document { selection: SelectionEvent, result: Result<DocumentView, String> },
}

struct OpenDocument {
    selection: SelectionEvent,
    view: DocumentView,
    opened_at: Instant,
}

struct AppState {
    svc: Option<Arc<GedService>>,
    tx: Sender<GuiEvent>,
    rx: Receiver<GuiEvent>,
    search_jobs: Vec<JoinHandle<Result<SearchOutcome, ServiceError>>>,
    link_job: Option<JoinHandle<()>>,
    mount: MountFlag,

    tab: ActiveTab,
    status: String,
    view: ViewState,

    // Browse
    search_type: SearchType,
    query: String,
    adv_type: String,
    adv_from: String,
    adv_to: String,
    link_input: String,
    selected: Option<DocumentId>,
    doc_loading: Option<DocumentId>,
    doc: Option<OpenDocument>,

    // Config
    client_cfg: ClientConfig,
    token_input: String,
    catalog_path: String,
    service_cfg: ServiceConfig,
    config_last_name: String,
}

impl AppState {
    fn new(cc: &CreationContext<'_>) -> Self {
        let client_cfg = match ClientConfig::from_env() {
            Ok(cfg) => cfg,
            Err(err) => {
                warn!(error = %err, "ignoring environment configuration");
                ClientConfig::default()
            }
        };
        let (tx, rx) = mpsc::channel();
        let mut app = Self {
            svc: None,
            tx,
            rx,
            search_jobs: Vec::new(),
            link_job: None,
            mount: MountFlag::new(),

            tab: ActiveTab::Browse,
            status: String::new(),
            view: ViewState::Idle,

            search_type: SearchType::Protocol,
            query: String::new(),
            adv_type: String::new(),
            adv_from: String::new(),
            adv_to: String::new(),
            link_input: String::new(),
            selected: None,
            doc_loading: None,
            doc: None,

            token_input: client_cfg.auth_token.clone().unwrap_or_default(),
            client_cfg,
            catalog_path: String::new(),
            service_cfg: ServiceConfig::default(),
            config_last_name: String::from("ged-client.json"),
        };
        app.apply_config();

        // A link passed on the command line opens right away
        if let Some(arg) = env::args().nth(1) {
            app.link_input = arg;
            app.open_link(&cc.egui_ctx);
        }
        app
    }

    fn busy(&self) -> bool {
        !self.search_jobs.is_empty() || self.link_job.is_some() || self.doc_loading.is_some()
    }

    fn apply_config(&mut self) {
        let token = self.token_input.trim();
        self.client_cfg.auth_token = if token.is_empty() { None } else { Some(token.to_string()) };
        let catalog = self.catalog_path.trim();
        let api: Result<Arc<dyn DocumentApi>, String> = if catalog.is_empty() {
            HttpDocumentApi::new(self.client_cfg.clone())
                .map(|api| Arc::new(api) as Arc<dyn DocumentApi>)
                .map_err(|e| e.to_string())
        } else {
            InMemoryDocumentApi::load(catalog)
                .map(|api| Arc::new(api) as Arc<dyn DocumentApi>)
                .map_err(|e| e.to_string())
        };
        match api {
            Ok(api) => {
                let svc = GedService::new(self.service_cfg.clone(), api);
                self.status = format!("Connected to {}", svc.api_info().endpoint);
                self.svc = Some(Arc::new(svc));
                self.view = ViewState::Idle;
                self.doc = None;
                self.selected = None;
            }
            Err(err) => {
                self.status = format!("Configuration rejected: {err}");
                self.svc = None;
            }
        }
    }

    fn build_request(&self) -> Result<SearchRequest, String> {
        let q = self.query.trim();
        match self.search_type {
            SearchType::Protocol if q.is_empty() => Err("Enter a protocol number".into()),
            SearchType::Protocol => Ok(SearchRequest::by_protocol(q)),
            SearchType::Name if q.is_empty() => Err("Enter part of a document name".into()),
            SearchType::Name => Ok(SearchRequest::by_name(q)),
            SearchType::Id => DocumentId::parse(q).map(SearchRequest::by_id).map_err(|e| e.to_string()),
            SearchType::Advanced => {
                let from = parse_date(&self.adv_from)?;
                let to = parse_date(&self.adv_to)?;
                let mut req = SearchRequest::advanced().with_date_range(from, to);
                if !q.is_empty() { req = req.with_text(q); }
                if !self.adv_type.trim().is_empty() { req = req.with_document_type(self.adv_type.trim()); }
                Ok(req)
            }
        }
    }

    fn do_search_now(&mut self, ctx: &egui::Context) {
        let Some(svc) = self.svc.clone() else {
            self.status = "No service; check the Config tab".into();
            return;
        };
        let req = match self.build_request() {
            Ok(req) => req,
            Err(msg) => { self.status = msg; return; }
        };
        self.selected = None;
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        let job = svc.search_in_background(
            req,
            Box::new(move |ev: SearchProgress| {
                let _ = tx.send(GuiEvent::Search(ev));
                ctx.request_repaint();
            }),
        );
        self.search_jobs.push(job);
    }

    fn open_link(&mut self, ctx: &egui::Context) {
        let Some(svc) = self.svc.clone() else {
            self.status = "No service; check the Config tab".into();
            return;
        };
        let link = DeepLink::parse(&self.link_input);
        if link.is_empty() {
            self.status = "Link carries neither protocol nor documentId".into();
            return;
        }
        info!(protocol = ?link.protocol, doc_id = ?link.document_id, "opening link");
        self.selected = None;
        let probe = Arc::new(self.mount.clone());
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        self.link_job = Some(thread::spawn(move || {
            let found_tx = tx.clone();
            let found_ctx = ctx.clone();
            let on_found = move |ev: SelectionEvent| {
                let _ = found_tx.send(GuiEvent::AutoSelected(ev));
                found_ctx.request_repaint();
            };
            match svc.open_deep_link(&link, probe, on_found) {
                Ok(opened) => {
                    let _ = tx.send(GuiEvent::LinkOpened(Ok(())));
                    ctx.request_repaint();
                    if let Some(handle) = opened.auto_select {
                        let _ = tx.send(GuiEvent::AutoSelectDone(handle.wait()));
                    }
                }
                Err(err) => {
                    let _ = tx.send(GuiEvent::LinkOpened(Err(err.to_string())));
                }
            }
            ctx.request_repaint();
        }));
    }

    fn open_selection(&mut self, selection: SelectionEvent, ctx: &egui::Context) {
        let Some(svc) = self.svc.clone() else { return };
        self.selected = Some(selection.doc_id);
        self.doc_loading = Some(selection.doc_id);
        let tx = self.tx.clone();
        let ctx = ctx.clone();
        thread::spawn(move || {
            let result = svc.open_document(&selection).map_err(|e| e.to_string());
            let _ = tx.send(GuiEvent::Document { selection, result });
            ctx.request_repaint();
        });
    }

    fn poll_events(&mut self, ctx: &egui::Context) {
        loop {
            match self.rx.try_recv() {
                Ok(GuiEvent::Search(ev)) => match ev {
                    SearchProgress::Started { seq } => self.status = format!("Searching (#{seq})…"),
                    SearchProgress::Finished { documents, .. } => self.status = format!("{documents} document(s)"),
                    SearchProgress::Superseded { seq } => info!(seq, "search superseded"),
                    SearchProgress::Failed { message, .. } => self.status = format!("Search failed: {message}"),
                },
                Ok(GuiEvent::LinkOpened(Ok(()))) => {}
                Ok(GuiEvent::LinkOpened(Err(msg))) => self.status = format!("Link failed: {msg}"),
                Ok(GuiEvent::AutoSelected(selection)) => self.open_selection(selection, ctx),
                Ok(GuiEvent::AutoSelectDone(outcome)) => {
                    if !matches!(outcome, AutoSelectOutcome::Selected(_)) {
                        self.status = format!("Linked document not opened ({outcome:?})");
                    }
                    self.link_job = None;
                }
                Ok(GuiEvent::Document { selection, result }) => {
                    if self.doc_loading == Some(selection.doc_id) {
                        self.doc_loading = None;
                    }
                    match result {
                        Ok(view) => {
                            self.status = format!("Opened {} ({}, {} bytes)", selection.name, view.kind(), view.len());
                            self.doc = Some(OpenDocument { selection, view, opened_at: Instant::now() });
                        }
                        Err(msg) => self.status = format!("Open failed: {msg}"),
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let (done, running): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.search_jobs).into_iter().partition(|h| h.is_finished());
        self.search_jobs = running;
        for job in done {
            match job.join() {
                Ok(Err(ServiceError::EmptyQuery)) => self.status = "Enter a search criterion".into(),
                Ok(_) => {}
                Err(_) => self.status = "Search worker panicked".into(),
            }
        }
        if self.link_job.as_ref().is_some_and(|h| h.is_finished()) {
            self.link_job = None;
        }

        if let Some(svc) = &self.svc {
            self.view = svc.view_state();
        }
    }

    fn ui_browse(&mut self, ctx: &egui::Context) {
        let mut clicked: Option<SelectionEvent> = None;
        SidePanel::left("tree_panel").resizable(true).default_width(380.0).show(ctx, |ui| {
            self.ui_search_bar(ui, ctx);
            ui.separator();
            ScrollArea::vertical().auto_shrink([false, false]).id_source("tree_scroll").show(ui, |ui| {
                clicked = self.ui_tree(ui);
            });
        });
        if let Some(selection) = clicked {
            self.open_selection(selection, ctx);
        }
        CentralPanel::default().show(ctx, |ui| self.ui_document(ui));
    }

    fn ui_search_bar(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.horizontal(|ui| {
            ComboBox::from_id_source("search_type")
                .selected_text(search_type_label(self.search_type))
                .show_ui(ui, |ui| {
                    for kind in [SearchType::Protocol, SearchType::Name, SearchType::Id, SearchType::Advanced] {
                        ui.selectable_value(&mut self.search_type, kind, search_type_label(kind));
                    }
                });
            let hint = match self.search_type {
                SearchType::Protocol => "protocol number",
                SearchType::Name => "document name",
                SearchType::Id => "document id",
                SearchType::Advanced => "name contains",
            };
            let resp = ui.add(TextEdit::singleline(&mut self.query).hint_text(hint).desired_width(200.0));
            let enter = resp.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.add(Button::new("Search")).clicked() || enter {
                self.do_search_now(ctx);
            }
        });
        if self.search_type == SearchType::Advanced {
            ui.horizontal(|ui| {
                ui.label("Type");
                ui.add(TextEdit::singleline(&mut self.adv_type).desired_width(80.0));
                ui.label("From");
                ui.add(TextEdit::singleline(&mut self.adv_from).hint_text("YYYY-MM-DD").desired_width(90.0));
                ui.label("To");
                ui.add(TextEdit::singleline(&mut self.adv_to).hint_text("YYYY-MM-DD").desired_width(90.0));
            });
        }
        ui.horizontal(|ui| {
            ui.add(TextEdit::singleline(&mut self.link_input).hint_text("?protocol=…&documentId=…").desired_width(260.0));
            if ui.button("Open link").clicked() {
                self.open_link(ctx);
            }
        });
    }

    /// Draws the tree and marks its search seq mounted once the tree is on screen.
    fn ui_tree(&mut self, ui: &mut egui::Ui) -> Option<SelectionEvent> {
        let mut clicked = None;
        match &self.view {
            ViewState::Idle => { ui.label("Search by protocol, name or id."); }
            ViewState::Loading { .. } => {
                ui.horizontal(|ui| {
                    ui.add(Spinner::new());
                    ui.label("Loading documents…");
                });
            }
            ViewState::NoResults { .. } | ViewState::Error { .. } => {
                let color = if matches!(self.view, ViewState::Error { .. }) {
                    ui.visuals().error_fg_color
                } else {
                    ui.visuals().warn_fg_color
                };
                ui.label(egui::RichText::new(self.view.banner().unwrap_or_default()).color(color));
            }
            ViewState::Loaded { seq, tree } => {
                clicked = tree_widget(ui, *seq, tree, self.selected);
                self.mount.mark_mounted(*seq);
            }
        }
        clicked
    }

    fn ui_document(&mut self, ui: &mut egui::Ui) {
        if let Some(id) = self.doc_loading {
            ui.horizontal(|ui| {
                ui.add(Spinner::new());
                ui.label(format!("Fetching document {id}…"));
            });
            return;
        }
        let Some(doc) = &self.doc else {
            ui.label("Select a document in the tree.");
            return;
        };

        let rows = [
            ("Document", doc.selection.doc_id.to_string()),
            ("Name", doc.selection.name.clone()),
            ("Extension", doc.selection.extension.clone()),
            ("Kind", doc.view.kind().to_string()),
            ("Size", format!("{} bytes", doc.view.len())),
            ("Fetched", format!("{:.0}s ago", doc.opened_at.elapsed().as_secs_f32())),
        ];
        ui.push_id("doc_details", |ui| {
            TableBuilder::new(ui)
                .striped(true)
                .vscroll(false)
                .column(Column::initial(90.0))
                .column(Column::remainder())
                .body(|mut body| {
                    for (key, value) in rows {
                        body.row(18.0, |mut row| {
                            row.col(|ui| { ui.strong(key); });
                            row.col(|ui| { ui.label(value); });
                        });
                    }
                });
        });
        ui.separator();

        let mut save = false;
        match &doc.view {
            DocumentView::Html(text) => {
                if ui.button("Save As…").clicked() { save = true; }
                ScrollArea::vertical().auto_shrink([false, false]).id_source("html_scroll").show(ui, |ui| {
                    ui.monospace(text);
                });
            }
            DocumentView::Pdf(_) | DocumentView::Other { .. } => {
                ui.label("This document is shown by an external viewer.");
                if ui.button("Save As…").clicked() { save = true; }
            }
        }
        if save {
            self.save_document();
        }
    }

    fn save_document(&mut self) {
        let Some(doc) = &self.doc else { return };
        let suggested = doc.view.file_name(&doc.selection.name, &doc.selection.extension);
        if let Some(path) = FileDialog::new().set_file_name(&suggested).save_file() {
            match fs::write(&path, doc.view.as_bytes()) {
                Ok(_) => self.status = format!("Saved {}", path.display()),
                Err(e) => self.status = format!("Save failed: {e}"),
            }
        }
    }

    fn ui_config(&mut self, ui: &mut egui::Ui) {
        ui.heading("Connection");
        egui::Grid::new("config_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
            ui.label("API base URL");
            ui.add(TextEdit::singleline(&mut self.client_cfg.base_url).desired_width(360.0));
            ui.end_row();
            ui.label("Bearer token");
            ui.add(TextEdit::singleline(&mut self.token_input).password(true).desired_width(360.0));
            ui.end_row();
            ui.label("Timeout (s)");
            ui.add(DragValue::new(&mut self.client_cfg.timeout_secs).clamp_range(1..=600));
            ui.end_row();
            ui.label("Retries");
            ui.add(DragValue::new(&mut self.client_cfg.max_retries).clamp_range(0..=10));
            ui.end_row();
            ui.label("Offline catalog");
            ui.horizontal(|ui| {
                ui.add(TextEdit::singleline(&mut self.catalog_path).hint_text("empty: use the API").desired_width(280.0));
                if ui.button("Browse…").clicked() {
                    if let Some(path) = FileDialog::new().add_filter("JSON", &["json"]).pick_file() {
                        self.catalog_path = path.display().to_string();
                    }
                }
            });
            ui.end_row();
            ui.label("Page size");
            ui.add(DragValue::new(&mut self.service_cfg.page_size).clamp_range(1..=500));
            ui.end_row();
            ui.label("Ready timeout (ms)");
            let mut ms = self.service_cfg.auto_select.timeout.as_millis() as u64;
            if ui.add(DragValue::new(&mut ms).clamp_range(100..=60_000)).changed() {
                self.service_cfg.auto_select.timeout = Duration::from_millis(ms);
            }
            ui.end_row();
        });
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.button("Apply").clicked() { self.apply_config(); }
            if ui.button("Load…").clicked() { self.load_config_via_dialog(); }
            if ui.button("Save…").clicked() { self.save_config_via_dialog(); }
        });
    }

    fn load_config_via_dialog(&mut self) {
        if let Some(path) = FileDialog::new().add_filter("JSON", &["json"]).pick_file() {
            match ClientConfig::load_json(&path) {
                Ok(cfg) => {
                    self.token_input = cfg.auth_token.clone().unwrap_or_default();
                    self.client_cfg = cfg;
                    self.status = format!("Loaded config from {}", path.display());
                    if let Some(name) = path.file_name().and_then(|s| s.to_str()) { self.config_last_name = name.to_string(); }
                }
                Err(e) => self.status = format!("Load config failed: {e}"),
            }
        }
    }

    fn save_config_via_dialog(&mut self) {
        let path = FileDialog::new().add_filter("JSON", &["json"]).set_file_name(&self.config_last_name).save_file();
        if let Some(path) = path {
            let mut cfg = self.client_cfg.clone();
            let token = self.token_input.trim();
            cfg.auth_token = if token.is_empty() { None } else { Some(token.to_string()) };
            match cfg.save_json(&path) {
                Ok(()) => {
                    self.status = format!("Saved config to {}", path.display());
                    if let Some(name) = path.file_name().and_then(|s| s.to_str()) { self.config_last_name = name.to_string(); }
                }
                Err(e) => self.status = format!("Save config failed: {e}"),
            }
        }
    }
}

impl App for AppState {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_events(ctx);
        TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.tab, ActiveTab::Browse, "Browse");
                ui.selectable_value(&mut self.tab, ActiveTab::Config, "Config");
                ui.separator();
                let backend = self.svc.as_ref().map(|s| s.api_info().endpoint.clone()).unwrap_or_else(|| "not connected".into());
                ui.label(backend);
                if self.busy() { ui.add(Spinner::new()); }
            });
        });
        TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(&self.status);
        });
        match self.tab {
            ActiveTab::Browse => self.ui_browse(ctx),
            ActiveTab::Config => { CentralPanel::default().show(ctx, |ui| self.ui_config(ui)); }
        }
        if self.busy() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

fn tree_widget(ui: &mut egui::Ui, seq: u64, tree: &TreeNode, selected: Option<DocumentId>) -> Option<SelectionEvent> {
    let mut clicked = None;
    egui::CollapsingHeader::new(&tree.label)
        .id_source(("tree", seq))
        .default_open(true)
        .show(ui, |ui| {
            for leaf in &tree.children {
                let text = format!("{} {}", icon_glyph(leaf.icon), leaf.label);
                if ui.selectable_label(selected == Some(leaf.id), text).clicked() {
                    clicked = Some(SelectionEvent::from(leaf));
                }
            }
        });
    clicked
}

fn icon_glyph(icon: IconKey) -> &'static str {
    match icon {
        IconKey::Pdf => "📕",
        IconKey::Html => "🌐",
        IconKey::Word => "📝",
        IconKey::Spreadsheet => "📊",
        IconKey::Image => "🖼",
        IconKey::Text => "📄",
        IconKey::Generic => "📁",
    }
}

fn search_type_label(kind: SearchType) -> &'static str {
    match kind {
        SearchType::Protocol => "Protocol",
        SearchType::Name => "Name",
        SearchType::Id => "Id",
        SearchType::Advanced => "Advanced",
    }
}

fn parse_date(raw: &str) -> Result<Option<NaiveDate>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|e| format!("invalid date `{raw}`: {e}"))
}
