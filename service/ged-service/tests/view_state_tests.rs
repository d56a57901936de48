use ged_model::{SearchResultItem, TreeNode};
use ged_service::view_state::NO_RESULTS_MESSAGE;
use ged_service::{project, ViewEvent, ViewState};

fn tree_with_one() -> TreeNode {
    project(&[SearchResultItem::new(1, "a", 0)], "P")
}

#[test]
fn search_lifecycle_reaches_loaded() {
    let state = ViewState::Idle.apply(ViewEvent::Started { seq: 1 });
    assert_eq!(state, ViewState::Loading { seq: 1 });
    let state = state.apply(ViewEvent::Succeeded { seq: 1, tree: tree_with_one() });
    assert_eq!(state.tree().map(TreeNode::len), Some(1));
    assert_eq!(state.seq(), Some(1));
    assert!(state.banner().is_none());
}

#[test]
fn empty_tree_becomes_no_results() {
    let state = ViewState::Loading { seq: 4 }.apply(ViewEvent::Succeeded { seq: 4, tree: TreeNode::empty("P") });
    assert_eq!(state, ViewState::NoResults { seq: 4, message: NO_RESULTS_MESSAGE.into() });
    assert!(state.tree().is_none());
    assert_eq!(state.banner().as_deref(), Some(NO_RESULTS_MESSAGE));
}

#[test]
fn failure_drops_the_tree_and_suggests_retry() {
    let loaded = ViewState::Loaded { seq: 1, tree: tree_with_one() };
    let state = loaded
        .apply(ViewEvent::Started { seq: 2 })
        .apply(ViewEvent::Failed { seq: 2, message: "server answered 503".into() });
    assert!(state.tree().is_none());
    let banner = state.banner().expect("error banner");
    assert!(banner.starts_with("server answered 503"));
    assert!(banner.contains("try again"));
}

#[test]
fn stale_completions_are_ignored() {
    let state = ViewState::Loading { seq: 3 };
    let after_stale = state.clone().apply(ViewEvent::Succeeded { seq: 2, tree: tree_with_one() });
    assert_eq!(after_stale, state);
    let after_stale_failure = state.clone().apply(ViewEvent::Failed { seq: 1, message: "late".into() });
    assert_eq!(after_stale_failure, state);

    let loaded = ViewState::Loaded { seq: 3, tree: tree_with_one() };
    assert_eq!(loaded.clone().apply(ViewEvent::Failed { seq: 3, message: "dup".into() }), loaded);
}

#[test]
fn clear_returns_to_idle() {
    let state = ViewState::Loaded { seq: 1, tree: tree_with_one() }.apply(ViewEvent::Cleared);
    assert_eq!(state, ViewState::Idle);
    assert_eq!(state.seq(), None);
}

#[test]
fn out_of_order_start_does_not_regress_the_view() {
    // search 2 starts before search 1 gets to announce itself
    let state = ViewState::Idle
        .apply(ViewEvent::Started { seq: 2 })
        .apply(ViewEvent::Started { seq: 1 });
    assert_eq!(state, ViewState::Loading { seq: 2 });

    let state = state.apply(ViewEvent::Succeeded { seq: 2, tree: tree_with_one() });
    assert_eq!(state.seq(), Some(2));
    assert!(state.tree().is_some(), "latest search must land");

    let loaded = ViewState::Loaded { seq: 5, tree: tree_with_one() };
    assert_eq!(loaded.clone().apply(ViewEvent::Started { seq: 4 }), loaded);
}
