use std::fmt;

use crate::applier::NodeError;
use crate::composer::ComposerId;
use crate::recomposer::RecomposerState;
use crate::ScopeId;

/// Recoverable failures of a composition or recomposition pass.
///
/// Structural misuse inside a body (ending a group that was never started,
/// reading past the end of a group) is a programming error and panics
/// instead; the panic poisons the composer, which then reports
/// [`ComposeError::Poisoned`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// `compose` or `recompose` was entered while another pass was running.
    Reentrant { state: RecomposerState },
    /// A scope kept invalidating itself and was not allowed to settle.
    SelfInvalidatingScope { scope: ScopeId, executions: usize },
    /// A body returned with groups or nodes still open.
    Unbalanced { open_groups: usize, open_nodes: usize },
    Poisoned { composer: ComposerId },
    Disposed { composer: ComposerId },
    Node(NodeError),
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::Reentrant { state } => {
                write!(f, "composition re-entered while {state:?}")
            }
            ComposeError::SelfInvalidatingScope { scope, executions } => write!(
                f,
                "scope {scope} invalidated itself after {executions} executions in one recomposition"
            ),
            ComposeError::Unbalanced {
                open_groups,
                open_nodes,
            } => write!(
                f,
                "body returned with {open_groups} open group(s) and {open_nodes} open node(s)"
            ),
            ComposeError::Poisoned { composer } => {
                write!(f, "composer {composer} was poisoned by an aborted pass")
            }
            ComposeError::Disposed { composer } => write!(f, "composer {composer} was disposed"),
            ComposeError::Node(err) => write!(f, "applier rejected a change: {err}"),
        }
    }
}

impl std::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposeError::Node(err) => Some(err),
            _ => None,
        }
    }
}

impl From<NodeError> for ComposeError {
    fn from(err: NodeError) -> Self {
        ComposeError::Node(err)
    }
}
