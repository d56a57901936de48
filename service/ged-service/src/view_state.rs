//! Document-browser view as an explicit state machine.

use ged_model::TreeNode;

pub const NO_RESULTS_MESSAGE: &str = "No documents were found for this search.";
const RETRY_HINT: &str = "Please check your connection and try again.";

/// Everything the browser view can be showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    Loading { seq: u64 },
    Loaded { seq: u64, tree: TreeNode },
    NoResults { seq: u64, message: String },
    Error { seq: u64, message: String },
}

/// Inputs to [`ViewState::apply`]. `seq` identifies the search that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Started { seq: u64 },
    Succeeded { seq: u64, tree: TreeNode },
    Failed { seq: u64, message: String },
    Cleared,
}

impl ViewState {
    /// Pure transition. A start older than the search already on display and
    /// completions for any search other than the one being loaded leave the
    /// state untouched.
    pub fn apply(self, event: ViewEvent) -> ViewState {
        match event {
            ViewEvent::Started { seq } => {
                if self.seq().is_some_and(|current| seq < current) {
                    return self;
                }
                ViewState::Loading { seq }
            }
            ViewEvent::Cleared => ViewState::Idle,
            ViewEvent::Succeeded { seq, tree } => {
                if !self.is_loading(seq) {
                    return self;
                }
                if tree.is_empty() {
                    ViewState::NoResults { seq, message: NO_RESULTS_MESSAGE.into() }
                } else {
                    ViewState::Loaded { seq, tree }
                }
            }
            ViewEvent::Failed { seq, message } => {
                if !self.is_loading(seq) {
                    return self;
                }
                ViewState::Error { seq, message }
            }
        }
    }

    pub fn is_loading(&self, seq: u64) -> bool {
        matches!(self, ViewState::Loading { seq: s } if *s == seq)
    }

    pub fn seq(&self) -> Option<u64> {
        match self {
            ViewState::Idle => None,
            ViewState::Loading { seq }
            | ViewState::Loaded { seq, .. }
            | ViewState::NoResults { seq, .. }
            | ViewState::Error { seq, .. } => Some(*seq),
        }
    }

    /// The tree on display; only `Loaded` ever has one.
    pub fn tree(&self) -> Option<&TreeNode> {
        match self {
            ViewState::Loaded { tree, .. } => Some(tree),
            _ => None,
        }
    }

    /// User-facing message for the informational and error states.
    pub fn banner(&self) -> Option<String> {
        match self {
            ViewState::NoResults { message, .. } => Some(message.clone()),
            ViewState::Error { message, .. } => Some(format!("{message}. {RETRY_HINT}")),
            _ => None,
        }
    }
}
