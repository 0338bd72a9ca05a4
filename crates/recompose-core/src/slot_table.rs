//! Flat, gap-free storage for the positional memory of a composition.
//!
//! Groups are stored in pre-order: a header slot followed by the group's
//! content, where `len` counts the header itself. While a pass runs, a stack
//! of [`GroupFrame`]s tracks the open groups; inserting or removing slots
//! shifts the recorded end of every open frame so the layout stays
//! contiguous without a gap buffer.
//!
//! Content of a group that the pass did not reach again is trimmed when the
//! group ends, and handed back to the caller as removed [`Slot`]s so the
//! composer can dispose the scopes and nodes they held.

use std::fmt;

use crate::slot_value::SlotValue;
use crate::{Key, NodeId, ScopeId};

pub(crate) const UNASSIGNED_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupHeader {
    pub(crate) key: Key,
    pub(crate) len: usize,
    pub(crate) scope: ScopeId,
    pub(crate) node: Option<NodeId>,
}

#[derive(Debug)]
pub(crate) enum Slot {
    Group(GroupHeader),
    Value(SlotValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Whole table during a pass.
    Root,
    /// Group opened by the runtime itself; bodies may not close it.
    Boundary,
    /// Group opened by a body.
    Group,
    /// Ancestor of the group being recomposed.
    Anchor,
}

#[derive(Debug)]
struct GroupFrame {
    kind: FrameKind,
    header: Option<usize>,
    end: usize,
    inserting: bool,
    /// One past the furthest slot the pass visited inside this group.
    touched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupStart {
    pub(crate) index: usize,
    pub(crate) scope: Option<ScopeId>,
    pub(crate) node: Option<NodeId>,
    pub(crate) inserted: bool,
    pub(crate) moved: bool,
}

#[derive(Default)]
pub(crate) struct SlotTable {
    slots: Vec<Slot>,
    frames: Vec<GroupFrame>,
    cursor: usize,
}

/// Scopes and nodes held by a removed slot range, in slot order.
#[derive(Debug, Default)]
pub(crate) struct Removed {
    pub(crate) scopes: Vec<ScopeId>,
    pub(crate) nodes: Vec<NodeId>,
    /// Nodes not nested inside another removed node.
    pub(crate) detached: Vec<NodeId>,
    pub(crate) slots: Vec<Slot>,
}

impl Removed {
    fn from_slots(slots: Vec<Slot>) -> Self {
        let mut scopes = Vec::new();
        let mut nodes = Vec::new();
        let mut detached = Vec::new();
        let mut covered_until = 0;
        for (index, slot) in slots.iter().enumerate() {
            if let Slot::Group(header) = slot {
                if header.scope != UNASSIGNED_SCOPE {
                    scopes.push(header.scope);
                }
                if let Some(node) = header.node {
                    nodes.push(node);
                    if index >= covered_until {
                        detached.push(node);
                        covered_until = index + header.len;
                    }
                }
            }
        }
        Self {
            scopes,
            nodes,
            detached,
            slots,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SlotTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Group(_)))
            .count()
    }

    pub(crate) fn in_pass(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of groups opened by bodies that are still open.
    pub(crate) fn open_groups(&self) -> usize {
        self.frames
            .iter()
            .filter(|frame| frame.kind == FrameKind::Group)
            .count()
    }

    pub(crate) fn inserting(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.inserting)
    }

    fn frame(&self) -> &GroupFrame {
        match self.frames.last() {
            Some(frame) => frame,
            None => panic!("slot table accessed outside of a composition pass"),
        }
    }

    fn frame_mut(&mut self) -> &mut GroupFrame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => panic!("slot table accessed outside of a composition pass"),
        }
    }

    fn touch(&mut self, to: usize) {
        let frame = self.frame_mut();
        frame.touched = frame.touched.max(to);
    }

    fn insert_slot(&mut self, at: usize, slot: Slot) {
        self.slots.insert(at, slot);
        for frame in &mut self.frames {
            frame.end += 1;
            if frame.touched > at {
                frame.touched += 1;
            }
        }
    }

    fn remove_range(&mut self, from: usize, to: usize) -> Removed {
        if from >= to {
            return Removed::default();
        }
        let count = to - from;
        let drained: Vec<Slot> = self.slots.drain(from..to).collect();
        for frame in &mut self.frames {
            frame.end -= count;
            if frame.touched >= to {
                frame.touched -= count;
            } else if frame.touched > from {
                frame.touched = from;
            }
        }
        Removed::from_slots(drained)
    }

    fn header_mut(&mut self, index: usize) -> &mut GroupHeader {
        match self.slots.get_mut(index) {
            Some(Slot::Group(header)) => header,
            _ => panic!("slot {index} is not a group header"),
        }
    }

    pub(crate) fn header(&self, index: usize) -> &GroupHeader {
        match self.slots.get(index) {
            Some(Slot::Group(header)) => header,
            _ => panic!("slot {index} is not a group header"),
        }
    }

    pub(crate) fn set_group_scope(&mut self, index: usize, scope: ScopeId) {
        self.header_mut(index).scope = scope;
    }

    pub(crate) fn set_group_node(&mut self, index: usize, node: NodeId) {
        self.header_mut(index).node = Some(node);
    }

    /// Header index of the innermost open group, if any.
    pub(crate) fn current_group(&self) -> Option<usize> {
        self.frames.last().and_then(|frame| frame.header)
    }

    pub(crate) fn begin_pass(&mut self) {
        assert!(
            self.frames.is_empty(),
            "a composition pass is already running on this slot table"
        );
        self.cursor = 0;
        self.frames.push(GroupFrame {
            kind: FrameKind::Root,
            header: None,
            end: self.slots.len(),
            inserting: self.slots.is_empty(),
            touched: 0,
        });
    }

    /// Closes the pass, trimming root-level content that was not reached.
    ///
    /// Fails with the number of body-opened groups when the pass is not back
    /// at the root.
    pub(crate) fn end_pass(&mut self) -> Result<Removed, usize> {
        match self.frames.last() {
            Some(frame) if frame.kind == FrameKind::Root => {}
            Some(_) => return Err(self.open_groups().max(1)),
            None => panic!("end_pass called without begin_pass"),
        }
        let frame = self.frame();
        let keep_to = self.cursor.max(frame.touched);
        let end = frame.end;
        let removed = self.remove_range(keep_to, end);
        self.frames.clear();
        self.cursor = 0;
        Ok(removed)
    }

    /// Drops all pass state after a failed pass. The slots keep whatever
    /// shape the pass left them in.
    pub(crate) fn abandon_pass(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    pub(crate) fn begin_group(&mut self, key: Key) -> GroupStart {
        self.open_group(key, FrameKind::Group)
    }

    pub(crate) fn begin_boundary(&mut self, key: Key) -> GroupStart {
        self.open_group(key, FrameKind::Boundary)
    }

    fn open_group(&mut self, key: Key, kind: FrameKind) -> GroupStart {
        let frame = self.frame();
        let (parent_end, inserting) = (frame.end, frame.inserting);
        let cursor = self.cursor;

        if !inserting && cursor < parent_end {
            let mut moved = false;
            let found = match &self.slots[cursor] {
                Slot::Group(header) if header.key == key => Some(cursor),
                _ => self.find_sibling(cursor, parent_end, key),
            };
            if let Some(found) = found {
                if found != cursor {
                    let len = self.header(found).len;
                    self.slots[cursor..found + len].rotate_right(len);
                    moved = true;
                }
                let header = self.header(cursor);
                let start = GroupStart {
                    index: cursor,
                    scope: Some(header.scope).filter(|scope| *scope != UNASSIGNED_SCOPE),
                    node: header.node,
                    inserted: false,
                    moved,
                };
                let end = cursor + header.len;
                self.frames.push(GroupFrame {
                    kind,
                    header: Some(cursor),
                    end,
                    inserting: false,
                    touched: cursor + 1,
                });
                self.cursor = cursor + 1;
                return start;
            }
        }

        self.insert_slot(
            cursor,
            Slot::Group(GroupHeader {
                key,
                len: 1,
                scope: UNASSIGNED_SCOPE,
                node: None,
            }),
        );
        self.touch(cursor + 1);
        self.frames.push(GroupFrame {
            kind,
            header: Some(cursor),
            end: cursor + 1,
            inserting: true,
            touched: cursor + 1,
        });
        self.cursor = cursor + 1;
        GroupStart {
            index: cursor,
            scope: None,
            node: None,
            inserted: true,
            moved: false,
        }
    }

    fn find_sibling(&self, from: usize, end: usize, key: Key) -> Option<usize> {
        let mut index = from;
        while index < end {
            match &self.slots[index] {
                Slot::Group(header) => {
                    if header.key == key {
                        return Some(index);
                    }
                    index += header.len;
                }
                Slot::Value(_) => index += 1,
            }
        }
        None
    }

    pub(crate) fn end_group(&mut self) -> Removed {
        match self.frames.last() {
            Some(frame) if frame.kind == FrameKind::Group => {}
            _ => panic!("end_group called without a matching start_group"),
        }
        self.close_group()
    }

    pub(crate) fn end_boundary(&mut self) -> Removed {
        match self.frames.last() {
            Some(frame) if frame.kind == FrameKind::Boundary => {}
            _ => panic!("runtime group closed while body groups are still open"),
        }
        self.close_group()
    }

    fn close_group(&mut self) -> Removed {
        let Some(frame) = self.frames.pop() else {
            panic!("end_group called outside of a composition pass");
        };
        let Some(header) = frame.header else {
            panic!("the root frame cannot be closed as a group");
        };
        let keep_to = self.cursor.max(frame.touched);
        let removed = self.remove_range(keep_to, frame.end);
        self.header_mut(header).len = keep_to - header;
        self.cursor = keep_to;
        self.touch(keep_to);
        removed
    }

    /// Moves the cursor past the current group's remaining content, keeping
    /// all of it.
    pub(crate) fn skip_to_group_end(&mut self) {
        let frame = self.frame_mut();
        let end = frame.end;
        frame.touched = end;
        self.cursor = end;
    }

    fn stale_access(&self, op: &str) -> ! {
        let frame = self.frame();
        panic!(
            "stale slot access: {op} at {} past the end ({}) of a group that is not inserting",
            self.cursor, frame.end
        );
    }

    pub(crate) fn get(&mut self) -> SlotValue {
        let frame = self.frame();
        let cursor = self.cursor;
        if cursor < frame.end {
            let value = match &self.slots[cursor] {
                Slot::Value(value) => value.clone(),
                Slot::Group(header) => SlotValue::Scope(header.scope),
            };
            self.touch(cursor + 1);
            value
        } else if frame.inserting {
            SlotValue::Empty
        } else {
            self.stale_access("get_slot")
        }
    }

    /// Writes the slot under the cursor without advancing. Returns the value
    /// it replaced.
    pub(crate) fn set(&mut self, value: SlotValue) -> Option<SlotValue> {
        let frame = self.frame();
        let cursor = self.cursor;
        let previous = if cursor < frame.end {
            match &mut self.slots[cursor] {
                Slot::Value(current) => Some(std::mem::replace(current, value)),
                Slot::Group(_) => panic!("set_slot would overwrite the group header at {cursor}"),
            }
        } else if frame.inserting {
            self.insert_slot(cursor, Slot::Value(value));
            None
        } else {
            self.stale_access("set_slot")
        };
        self.touch(cursor + 1);
        previous
    }

    /// Advances past the slot under the cursor, or past a whole group when
    /// the cursor is on its header.
    pub(crate) fn next_slot(&mut self) {
        let frame = self.frame();
        let cursor = self.cursor;
        let next = if cursor < frame.end {
            match &self.slots[cursor] {
                Slot::Group(header) => cursor + header.len,
                Slot::Value(_) => cursor + 1,
            }
        } else if frame.inserting {
            self.insert_slot(cursor, Slot::Value(SlotValue::Empty));
            cursor + 1
        } else {
            self.stale_access("next_slot")
        };
        self.cursor = next;
        self.touch(next);
    }

    /// Compares `value` with the slot under the cursor and stores it if it
    /// differs. Does not advance.
    pub(crate) fn changed(&mut self, value: SlotValue) -> (bool, Option<SlotValue>) {
        let frame = self.frame();
        let cursor = self.cursor;
        if cursor < frame.end {
            let result = match &mut self.slots[cursor] {
                Slot::Value(current) if *current == value => (false, None),
                Slot::Value(current) => (true, Some(std::mem::replace(current, value))),
                Slot::Group(_) => panic!("input compared against the group header at {cursor}"),
            };
            self.touch(cursor + 1);
            result
        } else if frame.inserting {
            self.insert_slot(cursor, Slot::Value(value));
            self.touch(cursor + 1);
            (true, None)
        } else {
            self.stale_access("changed")
        }
    }

    /// Reopens the group whose scope is `scope` for recomposition.
    ///
    /// Its ancestors are pushed as anchors so slot insertions and removals
    /// inside the group keep their lengths up to date.
    pub(crate) fn begin_recompose(&mut self, scope: ScopeId) -> Option<usize> {
        assert!(
            self.frames.is_empty(),
            "cannot recompose a scope while a pass is running"
        );
        let target = self.find_scope(scope)?;
        self.frames.push(GroupFrame {
            kind: FrameKind::Root,
            header: None,
            end: self.slots.len(),
            inserting: false,
            touched: self.slots.len(),
        });
        let mut index = 0;
        let mut end = self.slots.len();
        'descend: while index < end {
            match &self.slots[index] {
                Slot::Group(header) => {
                    let group_end = index + header.len;
                    if index == target {
                        self.frames.push(GroupFrame {
                            kind: FrameKind::Boundary,
                            header: Some(index),
                            end: group_end,
                            inserting: false,
                            touched: index + 1,
                        });
                        self.cursor = index + 1;
                        return Some(index);
                    }
                    if target > index && target < group_end {
                        self.frames.push(GroupFrame {
                            kind: FrameKind::Anchor,
                            header: Some(index),
                            end: group_end,
                            inserting: false,
                            touched: group_end,
                        });
                        index += 1;
                        end = group_end;
                        continue 'descend;
                    }
                    index = group_end;
                }
                Slot::Value(_) => index += 1,
            }
        }
        self.frames.clear();
        None
    }

    /// Closes a recomposition started by [`SlotTable::begin_recompose`].
    pub(crate) fn end_recompose(&mut self) -> Removed {
        let removed = self.end_boundary();
        while let Some(frame) = self.frames.pop() {
            match frame.kind {
                FrameKind::Anchor => {
                    if let Some(header) = frame.header {
                        self.header_mut(header).len = frame.end - header;
                    }
                }
                FrameKind::Root => {}
                FrameKind::Group | FrameKind::Boundary => {
                    panic!("recomposition ended with groups still open")
                }
            }
        }
        self.cursor = 0;
        removed
    }

    fn find_scope(&self, scope: ScopeId) -> Option<usize> {
        self.slots.iter().position(|slot| match slot {
            Slot::Group(header) => header.scope == scope,
            Slot::Value(_) => false,
        })
    }

    /// Header index of the nearest node group strictly enclosing `index`.
    pub(crate) fn enclosing_node(&self, index: usize) -> Option<usize> {
        let mut found = None;
        let mut cursor = 0;
        let mut end = self.slots.len();
        while cursor < end && cursor != index {
            match &self.slots[cursor] {
                Slot::Group(header) => {
                    let group_end = cursor + header.len;
                    if index > cursor && index < group_end {
                        if header.node.is_some() {
                            found = Some(cursor);
                        }
                        end = group_end;
                        cursor += 1;
                    } else {
                        cursor = group_end;
                    }
                }
                Slot::Value(_) => cursor += 1,
            }
        }
        found
    }

    /// Direct child nodes of the group at `header`, or of the whole table
    /// for `None`. Plain groups are transparent.
    pub(crate) fn child_nodes(&self, header: Option<usize>) -> Vec<NodeId> {
        let (mut index, end) = match header {
            Some(header) => (header + 1, header + self.header(header).len),
            None => (0, self.slots.len()),
        };
        let mut children = Vec::new();
        while index < end {
            match &self.slots[index] {
                Slot::Group(group) => match group.node {
                    Some(node) => {
                        children.push(node);
                        index += group.len;
                    }
                    None => index += 1,
                },
                Slot::Value(_) => index += 1,
            }
        }
        children
    }

    /// Removes every slot. Must not be called during a pass.
    pub(crate) fn clear(&mut self) -> Removed {
        assert!(self.frames.is_empty(), "cannot clear a slot table mid-pass");
        Removed::from_slots(std::mem::take(&mut self.slots))
    }

    pub(crate) fn debug_dump(&self) -> Vec<(usize, String)> {
        let mut lines = Vec::with_capacity(self.slots.len());
        let mut ends: Vec<usize> = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            while ends.last().is_some_and(|end| index >= *end) {
                ends.pop();
            }
            let indent = "  ".repeat(ends.len());
            let line = match slot {
                Slot::Group(header) => {
                    ends.push(index + header.len);
                    format!("{indent}{header}")
                }
                Slot::Value(value) => format!("{indent}{value:?}"),
            };
            lines.push((index, line));
        }
        lines
    }
}

impl fmt::Display for GroupHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "group key={:#x} len={} scope={}",
            self.key, self.len, self.scope
        )?;
        if let Some(node) = self.node {
            write!(f, " node={node}")?;
        }
        Ok(())
    }
}
