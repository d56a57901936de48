use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use ged_client::api::{ApiError, DocumentApi, HttpDocumentApi, InMemoryDocumentApi};
use ged_client::config::{ClientConfig, ConfigError};
use ged_model::{DocumentId, Pagination, SearchRequest, SelectionEvent, SortDirection, TreeNode};
use ged_service::{
    AlwaysMounted, AutoSelectOutcome, DeepLink, DocumentView, GedService, SearchOutcome, ServiceConfig, ServiceError,
};
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Api(#[from] ApiError),
    #[error("{0}")]
    Service(#[from] ServiceError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Parser)]
#[command(name = "ged-browser", version, about = "Search GED documents and browse them by protocol")]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct BackendArgs {
    /// Answer from a JSON catalog instead of the HTTP API
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,
    /// Client configuration JSON; GED_* environment variables otherwise
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
    #[arg(long, global = true)]
    retries: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a search and print the protocol tree
    Search(SearchArgs),
    /// Open a navigation link (`?protocol=..&documentId=..` or a full URL)
    Link {
        url: String,
        /// Directory the auto-selected document is saved into
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Fetch one document file
    Open {
        #[arg(long)]
        id: i64,
        /// Extension used when the server sends a generic content type
        #[arg(long, default_value = "")]
        ext: String,
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Print the effective client configuration, optionally saving it
    Config {
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct SearchArgs {
    #[arg(long)]
    protocol: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    id: Option<i64>,
    #[arg(long = "type")]
    doc_type: Option<String>,
    /// Creation date lower bound (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    page_size: Option<u32>,
    /// name | createdAt | id
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long)]
    desc: bool,
    /// Select this document once the tree is built
    #[arg(long)]
    open: Option<i64>,
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,
    /// Print the tree as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let client_cfg = client_config(&cli.backend)?;
    if let Command::Config { write } = &cli.command {
        println!("{}", serde_json::to_string_pretty(&client_cfg).map_err(|e| CliError::Usage(e.to_string()))?);
        if let Some(path) = write {
            client_cfg.save_json(path)?;
            info!(path = %path.display(), "configuration saved");
        }
        return Ok(());
    }

    let api: Arc<dyn DocumentApi> = match &cli.backend.catalog {
        Some(path) => Arc::new(InMemoryDocumentApi::load(path)?),
        None => Arc::new(HttpDocumentApi::new(client_cfg)?),
    };
    let svc = GedService::new(ServiceConfig::default(), api);

    match cli.command {
        Command::Search(args) => do_search(&svc, args),
        Command::Link { url, out } => do_link(&svc, &url, out.as_deref()),
        Command::Open { id, ext, out } => {
            let selection = SelectionEvent { doc_id: DocumentId(id), extension: ext, name: format!("document-{id}") };
            open_selection(&svc, &selection, out.as_deref())
        }
        Command::Config { .. } => Ok(()),
    }
}

fn client_config(args: &BackendArgs) -> Result<ClientConfig, CliError> {
    let mut cfg = match &args.config {
        Some(path) => ClientConfig::load_json(path)?,
        None => ClientConfig::from_env()?,
    };
    if let Some(url) = &args.base_url { cfg.base_url = url.clone(); }
    if let Some(token) = &args.token { cfg.auth_token = Some(token.clone()); }
    if let Some(secs) = args.timeout_secs { cfg.timeout_secs = secs; }
    if let Some(n) = args.retries { cfg.max_retries = n; }
    Ok(cfg)
}

fn build_request(args: &SearchArgs) -> Result<SearchRequest, CliError> {
    let filtered = args.doc_type.is_some() || args.from.is_some() || args.to.is_some();
    let criteria = [args.protocol.is_some(), args.name.is_some(), args.id.is_some()]
        .iter()
        .filter(|set| **set)
        .count();

    let mut req = if criteria == 1 && !filtered {
        match (&args.protocol, &args.name, args.id) {
            (Some(p), _, _) => SearchRequest::by_protocol(p.clone()),
            (_, Some(n), _) => SearchRequest::by_name(n.clone()),
            (_, _, Some(id)) => SearchRequest::by_id(DocumentId(id)),
            _ => return Err(CliError::Usage("no criterion".into())),
        }
    } else if criteria == 0 && !filtered {
        return Err(CliError::Usage("give --protocol, --name, --id or an advanced filter".into()));
    } else {
        let mut req = SearchRequest::advanced().with_date_range(args.from, args.to);
        req.protocol = args.protocol.clone();
        req.document_id = args.id.map(DocumentId);
        if let Some(name) = &args.name { req = req.with_text(name.clone()); }
        if let Some(kind) = &args.doc_type { req = req.with_document_type(kind.clone()); }
        req
    };

    if args.page.is_some() || args.page_size.is_some() {
        req = req.with_page(args.page.unwrap_or(1), args.page_size.unwrap_or(ServiceConfig::default().page_size));
    }
    if let Some(field) = &args.sort_by {
        let dir = if args.desc { SortDirection::Desc } else { SortDirection::Asc };
        req = req.sorted_by(field.clone(), dir);
    }
    Ok(req)
}

fn do_search(svc: &GedService, args: SearchArgs) -> Result<(), CliError> {
    let req = build_request(&args)?;
    if let Some(id) = args.open {
        svc.set_pending_selection(DocumentId(id));
    }
    let outcome = svc.search(&req)?;
    let (tree, pagination) = match &outcome {
        SearchOutcome::Loaded { tree, pagination, .. } => (tree, pagination),
        SearchOutcome::NoResults { .. } => {
            println!("{}", svc.view_state().banner().unwrap_or_default());
            return Ok(());
        }
        SearchOutcome::Superseded { .. } => return Ok(()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(tree).map_err(|e| CliError::Usage(e.to_string()))?);
    } else {
        print_tree(tree, pagination.as_ref());
    }

    if let Some(selection) = svc.take_pending_selection(tree) {
        open_selection(svc, &selection, args.out.as_deref())?;
    } else if let Some(id) = args.open {
        warn!(doc_id = id, "requested document is not part of this result");
    }
    Ok(())
}

fn do_link(svc: &GedService, url: &str, out: Option<&Path>) -> Result<(), CliError> {
    let link = DeepLink::parse(url);
    if link.is_empty() {
        return Err(CliError::Usage(format!("`{url}` carries neither protocol nor documentId")));
    }
    let opened = svc.open_deep_link(&link, Arc::new(AlwaysMounted), |_| {})?;
    match &opened.outcome {
        SearchOutcome::Loaded { tree, pagination, .. } => print_tree(tree, pagination.as_ref()),
        _ => println!("{}", svc.view_state().banner().unwrap_or_default()),
    }
    if let Some(handle) = opened.auto_select {
        match handle.wait() {
            AutoSelectOutcome::Selected(selection) => open_selection(svc, &selection, out)?,
            other => println!("Linked document was not opened ({other:?})."),
        }
    }
    Ok(())
}

fn open_selection(svc: &GedService, selection: &SelectionEvent, out: Option<&Path>) -> Result<(), CliError> {
    let view = svc.open_document(selection)?;
    println!("Opened document {} as {} ({} bytes)", selection.doc_id, view.kind(), view.len());
    match (&view, out) {
        (_, Some(dir)) => {
            fs::create_dir_all(dir)?;
            let path = dir.join(view.file_name(&selection.name, &selection.extension));
            fs::write(&path, view.as_bytes())?;
            println!("Saved {}", path.display());
        }
        (DocumentView::Html(text), None) => println!("{}", truncate_chars(text, 400)),
        _ => println!("Use --out DIR to save the file."),
    }
    Ok(())
}

fn print_tree(tree: &TreeNode, pagination: Option<&Pagination>) {
    println!("{}", tree.label);
    let last = tree.children.len().saturating_sub(1);
    for (i, leaf) in tree.children.iter().enumerate() {
        let branch = if i == last { "└─" } else { "├─" };
        println!("{branch} [{:<11}] {}  #{}", leaf.icon.as_str(), leaf.label, leaf.id);
    }
    if let Some(p) = pagination {
        if let (Some(page), Some(pages), Some(total)) = (p.page, p.total_pages, p.total) {
            println!("page {page}/{pages}, {total} documents");
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    let mut it = s.chars();
    let truncated: String = it.by_ref().take(max_chars).collect();
    if it.next().is_some() { format!("{}…", truncated) } else { truncated }
}
