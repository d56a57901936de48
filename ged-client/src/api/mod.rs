use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use ged_model::{
    DocumentFile, DocumentId, Pagination, SearchRequest, SearchResponse, SearchResultItem, SearchType,
    SortDirection,
};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ClientConfig, MAX_RETRY_BACKOFF_MS};

/// Identifies the backing implementation of a [`DocumentApi`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Http,
    InMemory,
}

/// Static metadata describing a particular API instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiInfo {
    pub backend: BackendKind,
    pub endpoint: String,
}

/// Errors that can be produced by API operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("invalid client configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("transport failure: {message}")]
    Transport { message: String },
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    #[error("search rejected: {message}")]
    Rejected { message: String },
    #[error("could not decode response: {message}")]
    Decode { message: String },
}

impl ApiError {
    fn retryable(&self) -> bool {
        match self {
            ApiError::Transport { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Boundary to the remote GED backend.
pub trait DocumentApi: Send + Sync {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError>;
    fn fetch_file(&self, id: DocumentId) -> Result<DocumentFile, ApiError>;
    fn info(&self) -> &ApiInfo;
}

/// Blocking HTTP implementation against the GED REST API.
#[derive(Debug)]
pub struct HttpDocumentApi {
    info: ApiInfo,
    client: Client,
    config: ClientConfig,
}

impl HttpDocumentApi {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        config
            .validate()
            .map_err(|e| ApiError::InvalidConfiguration { message: e.to_string() })?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ApiError::InvalidConfiguration { message: format!("build HTTP client: {e}") })?;
        let info = ApiInfo { backend: BackendKind::Http, endpoint: config.base_url.clone() };
        Ok(Self { info, client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends the request built by `make`, retrying transient failures with linear backoff.
    fn send_with_retry<F>(&self, what: &str, make: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut last_err = ApiError::Transport { message: format!("{what}: no attempt made") };
        for attempt in 1..=attempts {
            let result = self
                .authorize(make())
                .send()
                .map_err(|e| ApiError::Transport { message: format!("{what}: {e}") })
                .and_then(check_status);
            match result {
                Ok(resp) => return Ok(resp),
                Err(err) if err.retryable() && attempt < attempts => {
                    warn!(attempt, max = attempts, error = %err, "retrying {what}");
                    thread::sleep(backoff_before(self.config.retry_backoff(), attempt));
                    last_err = err;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err)
    }
}

/// Linear backoff, saturating at `attempt` times the largest accepted step.
pub fn backoff_before(step: Duration, attempt: u32) -> Duration {
    let ceiling = Duration::from_millis(MAX_RETRY_BACKOFF_MS).saturating_mul(attempt);
    step.checked_mul(attempt).map_or(ceiling, |wait| wait.min(ceiling))
}

fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(ApiError::Status { status: status.as_u16(), message: truncate_chars(body.trim(), 200) })
}

impl DocumentApi for HttpDocumentApi {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        let url = self.config.search_url();
        debug!(%url, search_type = ?request.search_type, "search request");
        let resp = self.send_with_retry("search", || self.client.post(&url).json(request))?;
        let bytes = resp
            .bytes()
            .map_err(|e| ApiError::Transport { message: format!("read search body: {e}") })?;
        let parsed = SearchResponse::from_slice(&bytes).map_err(|e| ApiError::Decode { message: e.to_string() })?;
        ensure_success(parsed)
    }

    fn fetch_file(&self, id: DocumentId) -> Result<DocumentFile, ApiError> {
        let url = self.config.file_url(id);
        debug!(%url, "file request");
        let resp = self.send_with_retry("fetch file", || self.client.get(&url))?;
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp
            .bytes()
            .map_err(|e| ApiError::Transport { message: format!("read file body: {e}") })?;
        Ok(DocumentFile::new(content_type, bytes.to_vec()))
    }

    fn info(&self) -> &ApiInfo {
        &self.info
    }
}

/// Turns a `success: false` envelope into an error.
pub fn ensure_success(resp: SearchResponse) -> Result<SearchResponse, ApiError> {
    if resp.success {
        Ok(resp)
    } else {
        Err(ApiError::Rejected {
            message: resp.message.unwrap_or_else(|| "search was not successful".into()),
        })
    }
}

/// File entry of an offline catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFile {
    pub id: DocumentId,
    pub content_type: String,
    pub body: String,
}

/// Offline catalog: the documents a search can return and the files behind them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub documents: Vec<SearchResultItem>,
    #[serde(default)]
    pub files: Vec<CatalogFile>,
}

/// Deterministic in-process backend answering from a [`Catalog`].
#[derive(Debug, Clone)]
pub struct InMemoryDocumentApi {
    info: ApiInfo,
    documents: Vec<SearchResultItem>,
    files: BTreeMap<DocumentId, DocumentFile>,
}

impl InMemoryDocumentApi {
    pub fn new(catalog: Catalog) -> Self {
        let files = catalog
            .files
            .into_iter()
            .map(|f| (f.id, DocumentFile::new(f.content_type, f.body.into_bytes())))
            .collect();
        Self {
            info: ApiInfo { backend: BackendKind::InMemory, endpoint: "memory://catalog".into() },
            documents: catalog.documents,
            files,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ApiError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ApiError::InvalidConfiguration {
            message: format!("catalog `{}` could not be read: {e}", path.display()),
        })?;
        let catalog: Catalog = serde_json::from_str(&text).map_err(|e| ApiError::Decode { message: e.to_string() })?;
        let mut api = Self::new(catalog);
        api.info.endpoint = format!("file://{}", path.display());
        Ok(api)
    }

    pub fn insert_file(&mut self, id: DocumentId, file: DocumentFile) {
        self.files.insert(id, file);
    }

    fn matches(item: &SearchResultItem, req: &SearchRequest) -> bool {
        if let Some(p) = req.protocol.as_deref() {
            let p = p.trim();
            let hit = item.protocol_number.as_deref().map(str::trim) == Some(p)
                || item.generated_protocol.as_deref().map(str::trim) == Some(p);
            if !hit {
                return false;
            }
        }
        if let Some(text) = req.text.as_deref() {
            let needle = text.trim().to_lowercase();
            if !needle.is_empty() && !item.name.to_lowercase().contains(&needle) {
                return false;
            }
        }
        if let Some(id) = req.document_id {
            if item.id != id {
                return false;
            }
        }
        if let Some(kind) = req.document_type.as_deref() {
            if !item.document_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case(kind)) {
                return false;
            }
        }
        if req.date_from.is_some() || req.date_to.is_some() {
            let Some(created) = item.created_at.map(|ts| ts.date_naive()) else { return false };
            if req.date_from.is_some_and(|from| created < from) || req.date_to.is_some_and(|to| created > to) {
                return false;
            }
        }
        true
    }
}

impl DocumentApi for InMemoryDocumentApi {
    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ApiError> {
        let criteria_missing = match request.search_type {
            SearchType::Protocol => request.protocol.as_deref().map_or(true, |p| p.trim().is_empty()),
            SearchType::Name => request.text.as_deref().map_or(true, |t| t.trim().is_empty()),
            SearchType::Id => request.document_id.is_none(),
            SearchType::Advanced => false,
        };
        if criteria_missing {
            return Ok(SearchResponse {
                success: false,
                data: Vec::new(),
                pagination: None,
                message: Some(format!("missing criterion for {:?} search", request.search_type)),
            });
        }

        let mut hits: Vec<SearchResultItem> =
            self.documents.iter().filter(|item| Self::matches(item, request)).cloned().collect();
        if let Some(field) = request.sort_by.as_deref() {
            match field {
                "name" => hits.sort_by(|a, b| a.name.cmp(&b.name)),
                "createdAt" => hits.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
                _ => hits.sort_by_key(|item| item.id),
            }
            if request.sort_direction == Some(SortDirection::Desc) {
                hits.reverse();
            }
        }

        let total = hits.len();
        let page_size = request.page_size.unwrap_or(0) as usize;
        let page = request.page.unwrap_or(1).max(1) as usize;
        let data = if page_size == 0 {
            hits
        } else {
            hits.into_iter().skip((page - 1) * page_size).take(page_size).collect()
        };
        let total_pages = if page_size == 0 { 1 } else { total.div_ceil(page_size).max(1) };
        Ok(SearchResponse {
            success: true,
            data,
            pagination: Some(Pagination {
                page: Some(page as u32),
                page_size: request.page_size,
                total: Some(total as u64),
                total_pages: Some(total_pages as u32),
            }),
            message: None,
        })
    }

    fn fetch_file(&self, id: DocumentId) -> Result<DocumentFile, ApiError> {
        self.files
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::Status { status: 404, message: format!("document {id} has no file") })
    }

    fn info(&self) -> &ApiInfo {
        &self.info
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    let mut it = s.chars();
    let truncated: String = it.by_ref().take(max_chars).collect();
    if it.next().is_some() { format!("{}…", truncated) } else { truncated }
}
