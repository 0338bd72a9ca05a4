use std::collections::HashMap;
use std::fmt::Write;

use recompose_core::{Applier, NodeError, NodeId};

/// One call the runtime made into a [`RecordingApplier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplierEvent {
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

#[derive(Debug, Default)]
struct NodeRecord {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// In-memory host tree that logs every mutation it receives.
///
/// Rejects inconsistent commands the way a real host would: inserting an id
/// twice, or addressing a node it never saw.
#[derive(Debug, Default)]
pub struct RecordingApplier {
    nodes: HashMap<NodeId, NodeRecord>,
    roots: Vec<NodeId>,
    events: Vec<ApplierEvent>,
}

impl RecordingApplier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Children of `parent` in host order; `None` lists top-level nodes.
    pub fn children_of(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            None => self.roots.clone(),
            Some(id) => self
                .nodes
                .get(&id)
                .map(|record| record.children.clone())
                .unwrap_or_default(),
        }
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|record| record.parent)
    }

    pub fn events(&self) -> &[ApplierEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<ApplierEvent> {
        std::mem::take(&mut self.events)
    }

    /// The host tree as indented text, one node per line.
    pub fn dump_tree(&self) -> String {
        let mut out = String::new();
        for root in &self.roots {
            self.dump_node(*root, 0, &mut out);
        }
        out
    }

    fn dump_node(&self, node: NodeId, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{}#{node}", "  ".repeat(depth));
        if let Some(record) = self.nodes.get(&node) {
            for child in &record.children {
                self.dump_node(*child, depth + 1, out);
            }
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Vec<NodeId>, NodeError> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => self
                .nodes
                .get_mut(&id)
                .map(|record| &mut record.children)
                .ok_or(NodeError::Missing { id }),
        }
    }

    fn forget(&mut self, node: NodeId) {
        if let Some(record) = self.nodes.remove(&node) {
            for child in record.children {
                self.forget(child);
            }
        }
    }
}

impl Applier for RecordingApplier {
    fn insert_node(&mut self, parent: Option<NodeId>, node: NodeId) -> Result<(), NodeError> {
        if self.nodes.contains_key(&node) {
            return Err(NodeError::Duplicate { id: node });
        }
        self.siblings_mut(parent)?.push(node);
        self.nodes.insert(
            node,
            NodeRecord {
                parent,
                children: Vec::new(),
            },
        );
        self.events.push(ApplierEvent::Insert { parent, node });
        Ok(())
    }

    fn remove_node(&mut self, node: NodeId) -> Result<(), NodeError> {
        let parent = self
            .nodes
            .get(&node)
            .map(|record| record.parent)
            .ok_or(NodeError::Missing { id: node })?;
        if let Ok(siblings) = self.siblings_mut(parent) {
            siblings.retain(|sibling| *sibling != node);
        }
        self.forget(node);
        self.events.push(ApplierEvent::Remove { node });
        Ok(())
    }

    fn set_children(
        &mut self,
        parent: Option<NodeId>,
        children: &[NodeId],
    ) -> Result<(), NodeError> {
        if let Some(missing) = children.iter().find(|child| !self.nodes.contains_key(*child)) {
            return Err(NodeError::Missing { id: *missing });
        }
        *self.siblings_mut(parent)? = children.to_vec();
        for child in children {
            if let Some(record) = self.nodes.get_mut(child) {
                record.parent = parent;
            }
        }
        self.events.push(ApplierEvent::SetChildren {
            parent,
            children: children.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
