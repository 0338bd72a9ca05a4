use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;

use smallvec::SmallVec;

use crate::composer::{Composer, ComposerId};
use crate::hash::map::HashMap;
use crate::slot_value::SlotValue;
use crate::state::StateObject;
use crate::{Key, ScopeId, StateId};

static NEXT_SCOPE_ID: AtomicUsize = AtomicUsize::new(1);

pub(crate) type RecomposeBody = Rc<RefCell<dyn FnMut(&Composer)>>;

type ReadSet = HashMap<StateId, Weak<dyn StateObject>>;

struct RecomposeScopeInner {
    id: ScopeId,
    key: Key,
    composer: ComposerId,
    depth: Cell<usize>,
    body: RefCell<Option<RecomposeBody>>,
    reads: RefCell<ReadSet>,
    previous_reads: RefCell<Option<ReadSet>>,
    disposables: RefCell<SmallVec<[Box<dyn FnOnce()>; 2]>>,
    remembered: RefCell<HashMap<Key, SlotValue>>,
    invalid_on_entry: Cell<bool>,
    skipped: Cell<bool>,
    disposed: Cell<bool>,
}

/// The unit of re-execution.
///
/// Every group owns a scope. Scopes opened with `restart_group` also own the
/// body that re-runs them and are the ones state reads subscribe.
#[derive(Clone)]
pub struct RecomposeScope {
    inner: Rc<RecomposeScopeInner>,
}

impl PartialEq for RecomposeScope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for RecomposeScope {}

impl RecomposeScope {
    pub(crate) fn new(key: Key, composer: ComposerId, depth: usize) -> Self {
        Self {
            inner: Rc::new(RecomposeScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                key,
                composer,
                depth: Cell::new(depth),
                body: RefCell::new(None),
                reads: RefCell::new(HashMap::default()),
                previous_reads: RefCell::new(None),
                disposables: RefCell::new(SmallVec::new()),
                remembered: RefCell::new(HashMap::default()),
                invalid_on_entry: Cell::new(false),
                skipped: Cell::new(false),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn key(&self) -> Key {
        self.inner.key
    }

    pub fn composer_id(&self) -> ComposerId {
        self.inner.composer
    }

    /// Nesting depth in the slot table; ancestors have smaller depths.
    pub fn depth(&self) -> usize {
        self.inner.depth.get()
    }

    pub fn is_restartable(&self) -> bool {
        self.inner.body.borrow().is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Number of cells this scope is subscribed to.
    pub fn read_count(&self) -> usize {
        self.inner.reads.borrow().len()
    }

    pub(crate) fn set_depth(&self, depth: usize) {
        self.inner.depth.set(depth);
    }

    pub(crate) fn set_body(&self, body: RecomposeBody) {
        *self.inner.body.borrow_mut() = Some(body);
    }

    pub(crate) fn body(&self) -> Option<RecomposeBody> {
        self.inner.body.borrow().clone()
    }

    pub(crate) fn invalid_on_entry(&self) -> bool {
        self.inner.invalid_on_entry.get()
    }

    pub(crate) fn mark_skipped(&self) {
        self.inner.skipped.set(true);
    }

    pub(crate) fn begin_execution(&self, invalid: bool) {
        self.inner.invalid_on_entry.set(invalid);
        self.inner.skipped.set(false);
        let previous = std::mem::take(&mut *self.inner.reads.borrow_mut());
        *self.inner.previous_reads.borrow_mut() = Some(previous);
    }

    /// Settles subscriptions after the body returned.
    ///
    /// A body that skipped part of its content keeps every earlier read;
    /// otherwise cells that were not read again are unsubscribed.
    pub(crate) fn finish_execution(&self) {
        self.inner.invalid_on_entry.set(false);
        let Some(previous) = self.inner.previous_reads.borrow_mut().take() else {
            return;
        };
        let mut reads = self.inner.reads.borrow_mut();
        if self.inner.skipped.replace(false) {
            for (id, cell) in previous {
                reads.entry(id).or_insert(cell);
            }
            return;
        }
        let stale: SmallVec<[Weak<dyn StateObject>; 4]> = previous
            .into_iter()
            .filter(|(id, _)| !reads.contains_key(id))
            .map(|(_, cell)| cell)
            .collect();
        drop(reads);
        for cell in stale {
            if let Some(cell) = cell.upgrade() {
                cell.unsubscribe(self.inner.id);
            }
        }
    }

    pub(crate) fn record_read(&self, id: StateId, cell: Weak<dyn StateObject>) {
        self.inner.reads.borrow_mut().entry(id).or_insert(cell);
    }

    pub(crate) fn register_disposable(&self, cleanup: Box<dyn FnOnce()>) {
        self.inner.disposables.borrow_mut().push(cleanup);
    }

    pub(crate) fn remembered_value(&self, key: Key) -> Option<SlotValue> {
        self.inner.remembered.borrow().get(&key).cloned()
    }

    pub(crate) fn update_remembered_value(&self, key: Key, value: SlotValue) -> Option<SlotValue> {
        self.inner.remembered.borrow_mut().insert(key, value)
    }

    /// Tears the scope down: cleanups run once in reverse registration order,
    /// then every subscription and remembered value is released.
    pub(crate) fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        let cleanups = std::mem::take(&mut *self.inner.disposables.borrow_mut());
        let count = cleanups.len();
        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        let mut reads = std::mem::take(&mut *self.inner.reads.borrow_mut());
        if let Some(previous) = self.inner.previous_reads.borrow_mut().take() {
            reads.extend(previous);
        }
        for cell in reads.into_values() {
            if let Some(cell) = cell.upgrade() {
                cell.unsubscribe(self.inner.id);
            }
        }
        let remembered = std::mem::take(&mut *self.inner.remembered.borrow_mut());
        let body = self.inner.body.borrow_mut().take();
        drop(remembered);
        drop(body);
        log::trace!("scope {} disposed, {count} cleanup(s) run", self.inner.id);
    }
}

impl fmt::Debug for RecomposeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecomposeScope")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("depth", &self.inner.depth.get())
            .field("restartable", &self.is_restartable())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}
