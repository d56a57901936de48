//! Flat search results -> protocol tree.

use ged_model::{IconKey, SearchResultItem, TreeLeaf, TreeNode};

/// Builds the display tree for one search response.
///
/// Children are ordered by ascending `tree_order`; entries sharing an order keep
/// their response order. An empty input yields a root without children, which
/// callers render as "no documents".
pub fn project(results: &[SearchResultItem], protocol_label: &str) -> TreeNode {
    let mut tree = TreeNode::empty(protocol_label);
    let mut ordered: Vec<&SearchResultItem> = results.iter().collect();
    // stable
    ordered.sort_by_key(|item| item.tree_order);
    tree.children = ordered.into_iter().map(leaf_for).collect();
    tree
}

fn leaf_for(item: &SearchResultItem) -> TreeLeaf {
    let label = if item.name.trim().is_empty() {
        format!("Document {}", item.id)
    } else {
        item.name.clone()
    };
    TreeLeaf {
        id: item.id,
        name: item.name.clone(),
        icon: IconKey::from_extension(&item.extension),
        extension: item.extension.clone(),
        label,
    }
}

/// Protocol to show for a search whose protocol was not known up front.
///
/// Only the first result is consulted: its `protocol_number`, else its
/// `generated_protocol`. Blank values count as absent.
pub fn resolve_effective_protocol(results: &[SearchResultItem]) -> Option<String> {
    let first = results.first()?;
    non_blank(first.protocol_number.as_deref()).or_else(|| non_blank(first.generated_protocol.as_deref()))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
