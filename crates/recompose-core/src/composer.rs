use std::any::type_name;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::applier::{ApplierHost, Command};
use crate::error::ComposeError;
use crate::hash::map::HashMap;
use crate::hash_key;
use crate::invalidation::InvalidationQueue;
use crate::remember::{Owned, RememberedHandle};
use crate::scope::{RecomposeBody, RecomposeScope};
use crate::slot_table::{GroupStart, Removed, SlotTable};
use crate::slot_value::SlotValue;
use crate::state::{MutableState, StateObject};
use crate::{Key, NodeId, ScopeId};

pub type ComposerId = usize;

static NEXT_COMPOSER_ID: AtomicUsize = AtomicUsize::new(1);

const ROOT_KEY: Key = 0x7265_636f_6d70_6f73;
const NODE_KEY: Key = 0x6e6f_6465_6772_6f75;

struct ComposerCore {
    id: ComposerId,
    slots: RefCell<SlotTable>,
    scopes: RefCell<HashMap<ScopeId, RecomposeScope>>,
    scope_stack: RefCell<Vec<RecomposeScope>>,
    node_stack: RefCell<Vec<NodeId>>,
    /// Entries of `node_stack` pushed by the runtime rather than by a body.
    node_base: Cell<usize>,
    children: RefCell<HashMap<Option<NodeId>, Vec<NodeId>>>,
    next_node: Cell<NodeId>,
    commands: RefCell<Vec<Command>>,
    side_effects: RefCell<Vec<Box<dyn FnOnce()>>>,
    applier: Option<Rc<dyn ApplierHost>>,
    queue: Arc<InvalidationQueue>,
    poisoned: Cell<bool>,
    disposed: Cell<bool>,
    _not_send: PhantomData<*const ()>,
}

/// Cursor over one composition's slot table.
///
/// A composer is created by a [`Recomposer`](crate::Recomposer) and handed to
/// composable bodies, which call its group, slot and node operations in the
/// same order on every execution. Cloning is cheap and shares the same
/// composition.
#[derive(Clone)]
pub struct Composer {
    core: Rc<ComposerCore>,
}

impl PartialEq for Composer {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl Composer {
    pub(crate) fn new(queue: Arc<InvalidationQueue>, applier: Option<Rc<dyn ApplierHost>>) -> Self {
        Self {
            core: Rc::new(ComposerCore {
                id: NEXT_COMPOSER_ID.fetch_add(1, Ordering::Relaxed),
                slots: RefCell::new(SlotTable::new()),
                scopes: RefCell::new(HashMap::default()),
                scope_stack: RefCell::new(Vec::new()),
                node_stack: RefCell::new(Vec::new()),
                node_base: Cell::new(0),
                children: RefCell::new(HashMap::default()),
                next_node: Cell::new(1),
                commands: RefCell::new(Vec::new()),
                side_effects: RefCell::new(Vec::new()),
                applier,
                queue,
                poisoned: Cell::new(false),
                disposed: Cell::new(false),
                _not_send: PhantomData,
            }),
        }
    }

    fn slots(&self) -> Ref<'_, SlotTable> {
        self.core.slots.borrow()
    }

    fn slots_mut(&self) -> RefMut<'_, SlotTable> {
        self.core.slots.borrow_mut()
    }

    pub fn id(&self) -> ComposerId {
        self.core.id
    }

    /// True while the current group is being created rather than revisited.
    pub fn inserting(&self) -> bool {
        self.slots().inserting()
    }

    pub fn is_poisoned(&self) -> bool {
        self.core.poisoned.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.disposed.get()
    }

    pub fn slot_count(&self) -> usize {
        self.slots().len()
    }

    pub fn group_count(&self) -> usize {
        self.slots().group_count()
    }

    /// Number of live scopes owned by this composition.
    pub fn scope_count(&self) -> usize {
        self.core.scopes.borrow().len()
    }

    /// The innermost open group's scope.
    pub fn current_scope(&self) -> Option<RecomposeScope> {
        self.core.scope_stack.borrow().last().cloned()
    }

    /// One line per slot, indented by group nesting.
    pub fn debug_dump_slots(&self) -> Vec<(usize, String)> {
        self.slots().debug_dump()
    }

    pub fn start_group(&self, key: Key) {
        self.enter_group(key);
    }

    pub fn end_group(&self) {
        self.exit_group();
    }

    pub fn with_group<R>(&self, key: Key, f: impl FnOnce(&Composer) -> R) -> R {
        self.start_group(key);
        let result = f(self);
        self.end_group();
        result
    }

    /// Opens a group keyed by any hashable value, e.g. an item id in a list.
    pub fn with_key<K: Hash + ?Sized, R>(&self, key: &K, f: impl FnOnce(&Composer) -> R) -> R {
        self.with_group(hash_key(key), f)
    }

    /// Opens a group whose body is stored in its scope so the recomposer can
    /// re-run it on its own when a state it read changes.
    pub fn restart_group(&self, key: Key, body: impl FnMut(&Composer) + 'static) {
        let (scope, _) = self.enter_group(key);
        let body: RecomposeBody = Rc::new(RefCell::new(body));
        scope.set_body(Rc::clone(&body));
        self.execute_scope(&scope, |composer| {
            let mut body = body.borrow_mut();
            (&mut *body)(composer)
        });
        self.exit_group();
    }

    /// Whether the current restart group may reuse its previous output.
    pub fn skipping(&self) -> bool {
        if self.inserting() {
            return false;
        }
        self.read_scope()
            .is_some_and(|scope| !scope.invalid_on_entry())
    }

    /// Keeps the rest of the current group exactly as the previous execution
    /// left it.
    pub fn skip_to_group_end(&self) {
        self.slots_mut().skip_to_group_end();
        if let Some(scope) = self.read_scope() {
            scope.mark_skipped();
        }
    }

    pub fn get_slot(&self) -> SlotValue {
        self.slots_mut().get()
    }

    pub fn set_slot(&self, value: impl Into<SlotValue>) {
        let previous = self.slots_mut().set(value.into());
        drop(previous);
    }

    pub fn next_slot(&self) {
        self.slots_mut().next_slot();
    }

    /// Stores `value` in the slot under the cursor and reports whether it
    /// differs from what the previous execution stored there.
    pub fn changed(&self, value: impl Into<SlotValue>) -> bool {
        let (changed, previous) = self.slots_mut().changed(value.into());
        drop(previous);
        changed
    }

    /// [`Composer::changed`] followed by [`Composer::next_slot`].
    pub fn record_input(&self, value: impl Into<SlotValue>) -> bool {
        let changed = self.changed(value);
        self.next_slot();
        changed
    }

    /// Returns the value remembered at this position, creating it with
    /// `init` the first time.
    pub fn remember<T: 'static>(&self, init: impl FnOnce() -> T) -> Owned<T> {
        let current = self.get_slot();
        if let SlotValue::Remembered(handle) = &current {
            if let Some(owned) = handle.downcast::<T>() {
                self.next_slot();
                return owned;
            }
            log::debug!(
                "remembered {} replaced by {}",
                handle.type_name(),
                type_name::<T>()
            );
        }
        let owned = Owned::new(init());
        let previous = {
            let mut slots = self.slots_mut();
            let previous = slots.set(SlotValue::Remembered(RememberedHandle::new(owned.clone())));
            slots.next_slot();
            previous
        };
        drop(previous);
        drop(current);
        owned
    }

    pub fn use_state<T: 'static>(&self, init: impl FnOnce() -> T) -> MutableState<T> {
        self.remember(|| MutableState::new(init())).get()
    }

    /// Looks up a value stored on the current scope under `key`.
    pub fn remembered_value<K: Hash + ?Sized>(&self, key: &K) -> Option<SlotValue> {
        self.current_scope()
            .and_then(|scope| scope.remembered_value(hash_key(key)))
    }

    pub fn update_remembered_value<K: Hash + ?Sized>(
        &self,
        key: &K,
        value: impl Into<SlotValue>,
    ) -> Option<SlotValue> {
        match self.current_scope() {
            Some(scope) => scope.update_remembered_value(hash_key(key), value.into()),
            None => panic!("update_remembered_value called outside of a composition pass"),
        }
    }

    /// Runs `cleanup` when the current group is removed from the composition.
    ///
    /// Every execution of the enclosing scope appends another cleanup. Guard
    /// the call with [`Composer::inserting`], or use
    /// [`Composer::disposable_effect`], to register once per group lifetime.
    pub fn register_disposable(&self, cleanup: impl FnOnce() + 'static) {
        match self.current_scope() {
            Some(scope) => scope.register_disposable(Box::new(cleanup)),
            None => panic!("register_disposable called outside of a composition pass"),
        }
    }

    /// Runs `effect` once the current pass has been applied.
    pub fn side_effect(&self, effect: impl FnOnce() + 'static) {
        self.core.side_effects.borrow_mut().push(Box::new(effect));
    }

    /// Opens a node group and returns its stable id. The host is told about
    /// a new node when the group is created, not on later passes.
    pub fn start_node(&self) -> NodeId {
        let (_, start) = self.enter_group(NODE_KEY);
        let id = match start.node {
            Some(id) => id,
            None => {
                let id = self.core.next_node.get();
                self.core.next_node.set(id + 1);
                self.slots_mut().set_group_node(start.index, id);
                let parent = self.core.node_stack.borrow().last().copied();
                log::trace!("node {id} inserted under {parent:?}");
                self.core
                    .commands
                    .borrow_mut()
                    .push(Command::Insert { parent, node: id });
                id
            }
        };
        self.core.node_stack.borrow_mut().push(id);
        id
    }

    pub fn end_node(&self) {
        let base = self.core.node_base.get();
        let node = {
            let mut stack = self.core.node_stack.borrow_mut();
            if stack.len() <= base {
                panic!("end_node called without a matching start_node");
            }
            stack.pop()
        };
        let header = self.slots().current_group();
        let closes_node = header.is_some_and(|index| self.slots().header(index).node == node);
        if !closes_node {
            panic!("end_node does not close the innermost start_node");
        }
        self.exit_group();
        self.sync_children(node, header);
    }

    fn enter_group(&self, key: Key) -> (RecomposeScope, GroupStart) {
        let (start, depth) = {
            let mut slots = self.slots_mut();
            let start = slots.begin_group(key);
            (start, slots.depth())
        };
        let scope = self.attach_scope(&start, key, depth);
        (scope, start)
    }

    fn attach_scope(&self, start: &GroupStart, key: Key, depth: usize) -> RecomposeScope {
        let existing = start
            .scope
            .and_then(|id| self.core.scopes.borrow().get(&id).cloned());
        let scope = match existing {
            Some(scope) => scope,
            None => {
                let scope = RecomposeScope::new(key, self.core.id, depth);
                self.slots_mut().set_group_scope(start.index, scope.id());
                self.core
                    .scopes
                    .borrow_mut()
                    .insert(scope.id(), scope.clone());
                scope
            }
        };
        if start.moved {
            log::trace!("group {key:#x} moved to slot {}", start.index);
        }
        scope.set_depth(depth);
        self.core.scope_stack.borrow_mut().push(scope.clone());
        scope
    }

    fn exit_group(&self) {
        let removed = self.slots_mut().end_group();
        self.core.scope_stack.borrow_mut().pop();
        self.discard(removed);
    }

    /// Innermost scope that reads subscribe to.
    fn read_scope(&self) -> Option<RecomposeScope> {
        self.core
            .scope_stack
            .borrow()
            .iter()
            .rev()
            .find(|scope| scope.is_restartable())
            .cloned()
    }

    pub(crate) fn record_read<S: StateObject + 'static>(&self, cell: &Arc<S>) {
        let Some(scope) = self.read_scope() else {
            return;
        };
        let weak: Weak<S> = Arc::downgrade(cell);
        let weak: Weak<dyn StateObject> = weak;
        scope.record_read(cell.state_id(), weak);
        cell.subscribe(scope.id(), &self.core.queue);
    }

    fn execute_scope<R>(&self, scope: &RecomposeScope, run: impl FnOnce(&Composer) -> R) -> R {
        let stamp = self.core.queue.stamp_of(scope.id());
        scope.begin_execution(stamp.is_some());
        let result = run(self);
        scope.finish_execution();
        if let Some(stamp) = stamp {
            if !self.core.queue.settle(scope.id(), stamp) {
                log::trace!("scope {} invalidated itself while running", scope.id());
            }
        }
        result
    }

    /// Disposes what a trimmed slot range held: scopes in reverse slot order,
    /// then host removals for the outermost nodes.
    fn discard(&self, removed: Removed) {
        if removed.is_empty() {
            return;
        }
        let Removed {
            scopes,
            nodes,
            detached,
            slots,
        } = removed;
        for id in scopes.iter().rev() {
            let scope = self.core.scopes.borrow_mut().remove(id);
            self.core.queue.remove(*id);
            match scope {
                Some(scope) => scope.dispose(),
                None => log::warn!("removed group referenced unknown scope {id}"),
            }
        }
        if !nodes.is_empty() {
            let mut children = self.core.children.borrow_mut();
            for node in &nodes {
                children.remove(&Some(*node));
            }
            let mut commands = self.core.commands.borrow_mut();
            for node in detached.iter().rev() {
                commands.push(Command::Remove { node: *node });
            }
        }
        log::trace!(
            "discarded {} slot(s), {} scope(s), {} node(s)",
            slots.len(),
            scopes.len(),
            nodes.len()
        );
        drop(slots);
    }

    /// Re-reads the child order of `parent` from the table and queues a
    /// reorder when it changed since the last pass.
    fn sync_children(&self, parent: Option<NodeId>, header: Option<usize>) {
        let children = self.slots().child_nodes(header);
        let mut known = self.core.children.borrow_mut();
        match known.get_mut(&parent) {
            Some(previous) if *previous == children => {}
            Some(previous) => {
                previous.clone_from(&children);
                self.core
                    .commands
                    .borrow_mut()
                    .push(Command::SetChildren { parent, children });
            }
            None => {
                known.insert(parent, children);
            }
        }
    }

    fn check_usable(&self) -> Result<(), ComposeError> {
        if self.core.disposed.get() {
            return Err(ComposeError::Disposed {
                composer: self.core.id,
            });
        }
        if self.core.poisoned.get() {
            return Err(ComposeError::Poisoned {
                composer: self.core.id,
            });
        }
        Ok(())
    }

    fn check_balanced(&self) -> Result<(), ComposeError> {
        let open_groups = self.slots().open_groups();
        let open_nodes = self.core.node_stack.borrow().len() - self.core.node_base.get();
        if open_groups == 0 && open_nodes == 0 {
            return Ok(());
        }
        log::warn!(
            "composer {}: body returned with {open_groups} open group(s), {open_nodes} open node(s)",
            self.core.id
        );
        Err(ComposeError::Unbalanced {
            open_groups,
            open_nodes,
        })
    }

    /// Runs a full pass over the whole composition with `body` as its root.
    pub(crate) fn compose_root<T, F>(&self, body: F) -> Result<T, ComposeError>
    where
        F: FnMut(&Composer) -> T + 'static,
    {
        self.check_usable()?;
        let mut guard = PassGuard::new(self);
        let (start, depth) = {
            let mut slots = self.slots_mut();
            slots.begin_pass();
            let start = slots.begin_boundary(ROOT_KEY);
            (start, slots.depth())
        };
        let scope = self.attach_scope(&start, ROOT_KEY, depth);
        let body = Rc::new(RefCell::new(body));
        let stored: RecomposeBody = {
            let body = Rc::clone(&body);
            Rc::new(RefCell::new(move |composer: &Composer| {
                let mut body = body.borrow_mut();
                let _ = (&mut *body)(composer);
            }))
        };
        scope.set_body(stored);
        let result = self.execute_scope(&scope, |composer| {
            let mut body = body.borrow_mut();
            (&mut *body)(composer)
        });
        self.check_balanced()?;
        self.core.scope_stack.borrow_mut().pop();
        let removed = self.slots_mut().end_boundary();
        self.discard(removed);
        let removed = self
            .slots_mut()
            .end_pass()
            .map_err(|open_groups| ComposeError::Unbalanced {
                open_groups,
                open_nodes: 0,
            })?;
        self.discard(removed);
        self.sync_children(None, None);
        guard.complete();
        log::debug!(
            "composer {} composed: {} slot(s), {} scope(s)",
            self.core.id,
            self.slot_count(),
            self.scope_count()
        );
        Ok(result)
    }

    pub(crate) fn scope(&self, id: ScopeId) -> Option<RecomposeScope> {
        self.core.scopes.borrow().get(&id).cloned()
    }

    /// Re-runs one restartable scope in place. Returns `false` when the scope
    /// no longer has anything to run.
    pub(crate) fn recompose_scope(&self, scope: &RecomposeScope) -> Result<bool, ComposeError> {
        self.check_usable()?;
        let Some(body) = scope.body() else {
            self.core.queue.remove(scope.id());
            return Ok(false);
        };
        let mut guard = PassGuard::new(self);
        let index = self.slots_mut().begin_recompose(scope.id());
        let Some(index) = index else {
            log::debug!("scope {} is no longer in the slot table", scope.id());
            self.core.queue.remove(scope.id());
            guard.complete();
            return Ok(false);
        };
        let parent_header = self.slots().enclosing_node(index);
        let parent = parent_header.and_then(|header| self.slots().header(header).node);
        if let Some(parent) = parent {
            self.core.node_stack.borrow_mut().push(parent);
            self.core.node_base.set(1);
        }
        self.core.scope_stack.borrow_mut().push(scope.clone());
        self.execute_scope(scope, |composer| {
            let mut body = body.borrow_mut();
            (&mut *body)(composer)
        });
        self.check_balanced()?;
        self.core.scope_stack.borrow_mut().pop();
        self.core.node_stack.borrow_mut().clear();
        self.core.node_base.set(0);
        let removed = self.slots_mut().end_recompose();
        self.discard(removed);
        self.sync_children(parent, parent_header);
        guard.complete();
        Ok(true)
    }

    /// Hands queued node commands to the applier, then runs side effects.
    /// A rejected command poisons the composer and drops the rest of the
    /// batch, effects included.
    pub(crate) fn apply_changes(&self) -> Result<(), ComposeError> {
        let commands = std::mem::take(&mut *self.core.commands.borrow_mut());
        let effects = std::mem::take(&mut *self.core.side_effects.borrow_mut());
        if let Some(host) = &self.core.applier {
            if !commands.is_empty() {
                let mut applier = host.borrow_dyn();
                for command in &commands {
                    if let Err(err) = command.apply(&mut *applier) {
                        self.core.poisoned.set(true);
                        log::warn!(
                            "composer {} poisoned: applier rejected {command:?}: {err}",
                            self.core.id
                        );
                        return Err(err.into());
                    }
                }
            }
        }
        for effect in effects {
            effect();
        }
        Ok(())
    }

    /// Removes the whole composition: every scope is disposed and the host
    /// is told to drop every top-level node once changes are applied.
    pub fn dispose(&self) {
        if self.slots().in_pass() {
            panic!("composer {} disposed during a pass", self.core.id);
        }
        if self.core.disposed.replace(true) {
            return;
        }
        let removed = self.slots_mut().clear();
        self.discard(removed);
        let leftover: Vec<RecomposeScope> = self
            .core
            .scopes
            .borrow_mut()
            .drain()
            .map(|(_, scope)| scope)
            .collect();
        for scope in leftover {
            self.core.queue.remove(scope.id());
            scope.dispose();
        }
        self.core.children.borrow_mut().clear();
        log::debug!("composer {} disposed", self.core.id);
    }

    fn abort_pass(&self) {
        self.core.poisoned.set(true);
        if let Ok(mut slots) = self.core.slots.try_borrow_mut() {
            slots.abandon_pass();
        }
        if let Ok(mut stack) = self.core.scope_stack.try_borrow_mut() {
            stack.clear();
        }
        if let Ok(mut stack) = self.core.node_stack.try_borrow_mut() {
            stack.clear();
        }
        self.core.node_base.set(0);
        if let Ok(mut commands) = self.core.commands.try_borrow_mut() {
            commands.clear();
        }
        if let Ok(mut effects) = self.core.side_effects.try_borrow_mut() {
            effects.clear();
        }
        log::warn!("composer {} poisoned by an aborted pass", self.core.id);
    }
}

/// Poisons the composer unless the pass it guards completes.
struct PassGuard<'a> {
    composer: &'a Composer,
    completed: bool,
}

impl<'a> PassGuard<'a> {
    fn new(composer: &'a Composer) -> Self {
        Self {
            composer,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.composer.abort_pass();
        }
    }
}
