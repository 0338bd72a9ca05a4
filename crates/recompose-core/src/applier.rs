//! Host-facing node tree mutations.
//!
//! The composer never touches host nodes directly. While a pass runs it
//! queues [`Command`]s; once the pass has completed the recomposer replays
//! them against the composer's [`ApplierHost`], in emission order.

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::fmt;

use crate::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Missing { id: NodeId },
    Duplicate { id: NodeId },
    MissingContext { id: NodeId, reason: &'static str },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Missing { id } => write!(f, "node {id} missing"),
            NodeError::Duplicate { id } => write!(f, "node {id} inserted twice"),
            NodeError::MissingContext { id, reason } => {
                write!(f, "missing context for node {id}: {reason}")
            }
        }
    }
}

impl std::error::Error for NodeError {}

/// Mirrors the composition's node groups into a host tree.
///
/// `parent == None` addresses the composition root.
pub trait Applier: Any {
    fn insert_node(&mut self, parent: Option<NodeId>, node: NodeId) -> Result<(), NodeError>;

    /// Removes `node` and everything the host parented under it.
    fn remove_node(&mut self, node: NodeId) -> Result<(), NodeError>;

    /// Replaces the child order of `parent`.
    fn set_children(&mut self, parent: Option<NodeId>, children: &[NodeId])
        -> Result<(), NodeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Insert {
        parent: Option<NodeId>,
        node: NodeId,
    },
    Remove {
        node: NodeId,
    },
    SetChildren {
        parent: Option<NodeId>,
        children: Vec<NodeId>,
    },
}

impl Command {
    pub(crate) fn apply(&self, applier: &mut dyn Applier) -> Result<(), NodeError> {
        match self {
            Command::Insert { parent, node } => applier.insert_node(*parent, *node),
            Command::Remove { node } => applier.remove_node(*node),
            Command::SetChildren { parent, children } => applier.set_children(*parent, children),
        }
    }
}

pub trait ApplierHost {
    fn borrow_dyn(&self) -> RefMut<'_, dyn Applier>;
}

pub struct ConcreteApplierHost<A: Applier + 'static> {
    inner: RefCell<A>,
}

impl<A: Applier + 'static> ConcreteApplierHost<A> {
    pub fn new(applier: A) -> Self {
        Self {
            inner: RefCell::new(applier),
        }
    }

    pub fn borrow_typed(&self) -> RefMut<'_, A> {
        self.inner.borrow_mut()
    }

    pub fn into_inner(self) -> A {
        self.inner.into_inner()
    }
}

impl<A: Applier + 'static> ApplierHost for ConcreteApplierHost<A> {
    fn borrow_dyn(&self) -> RefMut<'_, dyn Applier> {
        RefMut::map(self.inner.borrow_mut(), |applier| applier as &mut dyn Applier)
    }
}
