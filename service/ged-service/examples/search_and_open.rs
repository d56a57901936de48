use std::sync::Arc;

use ged_client::api::{Catalog, CatalogFile, InMemoryDocumentApi};
use ged_model::{DocumentId, SearchRequest, SearchResultItem};
use ged_service::{AlwaysMounted, DeepLink, GedService, ServiceConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let link = args.get(1).map(String::as_str).unwrap_or("?protocol=P-100&documentId=2");

    let catalog = Catalog {
        documents: vec![
            SearchResultItem::new(1, "Petição inicial", 0).with_protocol("P-100").with_extension("pdf"),
            SearchResultItem::new(2, "Despacho", 1).with_protocol("P-100").with_extension("html"),
        ],
        files: vec![CatalogFile {
            id: DocumentId(2),
            content_type: "text/html; charset=utf-8".into(),
            body: "<h1>Despacho</h1>".into(),
        }],
    };
    let svc = GedService::new(ServiceConfig::default(), Arc::new(InMemoryDocumentApi::new(catalog)));

    let opened = svc.open_deep_link(&DeepLink::parse(link), Arc::new(AlwaysMounted), |ev| {
        println!("auto-selected {} ({})", ev.doc_id, ev.name);
    })?;
    if let Some(tree) = opened.outcome.tree() {
        println!("{}", tree.label);
        for leaf in &tree.children {
            println!("  [{}] {} #{}", leaf.icon.as_str(), leaf.label, leaf.id);
        }
    }
    if let Some(handle) = opened.auto_select {
        println!("auto-select: {:?}", handle.wait());
    }

    let again = svc.search(&SearchRequest::by_name("despacho"))?;
    println!("name search -> {:?}", again.tree().map(|t| t.len()));
    Ok(())
}
