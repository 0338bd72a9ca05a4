//! Observable state cells.
//!
//! A cell remembers which scopes read it during composition and, when a write
//! changes its value, marks those scopes pending on the queue of the runtime
//! they belong to. Writes may come from any thread; reads that should be
//! tracked go through a [`Composer`].

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, Weak};

use smallvec::SmallVec;

use crate::composer::Composer;
use crate::invalidation::InvalidationQueue;
use crate::{ScopeId, StateId};

static NEXT_STATE_ID: AtomicUsize = AtomicUsize::new(1);

/// Type-erased view of a cell used by scopes to drop their subscriptions.
pub(crate) trait StateObject {
    fn state_id(&self) -> StateId;
    fn subscribe(&self, scope: ScopeId, queue: &Arc<InvalidationQueue>);
    fn unsubscribe(&self, scope: ScopeId);
}

struct Subscriber {
    scope: ScopeId,
    queue: Weak<InvalidationQueue>,
}

pub(crate) struct StateCell<T> {
    id: StateId,
    value: RwLock<T>,
    version: AtomicU64,
    subscribers: Mutex<SmallVec<[Subscriber; 4]>>,
}

impl<T> StateCell<T> {
    fn new(value: T) -> Self {
        Self {
            id: NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed),
            value: RwLock::new(value),
            version: AtomicU64::new(0),
            subscribers: Mutex::new(SmallVec::new()),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, SmallVec<[Subscriber; 4]>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, T> {
        self.value.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
        let targets: SmallVec<[(ScopeId, Arc<InvalidationQueue>); 4]> = {
            let mut subscribers = self.subscribers();
            subscribers.retain(|subscriber| subscriber.queue.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(|subscriber| {
                    subscriber
                        .queue
                        .upgrade()
                        .map(|queue| (subscriber.scope, queue))
                })
                .collect()
        };
        log::trace!("state {} changed, {} subscriber(s)", self.id, targets.len());
        for (scope, queue) in targets {
            queue.invalidate(scope);
        }
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }
}

impl<T> StateObject for StateCell<T> {
    fn state_id(&self) -> StateId {
        self.id
    }

    fn subscribe(&self, scope: ScopeId, queue: &Arc<InvalidationQueue>) {
        let mut subscribers = self.subscribers();
        let known = subscribers.iter().any(|subscriber| {
            subscriber.scope == scope
                && std::ptr::eq(subscriber.queue.as_ptr(), Arc::as_ptr(queue))
        });
        if !known {
            subscribers.push(Subscriber {
                scope,
                queue: Arc::downgrade(queue),
            });
        }
    }

    fn unsubscribe(&self, scope: ScopeId) {
        self.subscribers()
            .retain(|subscriber| subscriber.scope != scope);
    }
}

/// A readable and writable observable value.
///
/// Clones share the same cell.
pub struct MutableState<T> {
    cell: Arc<StateCell<T>>,
}

impl<T> Clone for MutableState<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: 'static> MutableState<T> {
    pub fn new(value: T) -> Self {
        Self {
            cell: Arc::new(StateCell::new(value)),
        }
    }

    pub fn id(&self) -> StateId {
        self.cell.id
    }

    /// Number of writes that changed the value.
    pub fn version(&self) -> u64 {
        self.cell.version.load(Ordering::Acquire)
    }

    /// Reads the value and subscribes the composer's current scope to it.
    ///
    /// `f` runs under the cell's read lock; writing the same cell from
    /// inside it deadlocks.
    pub fn with<R>(&self, composer: &Composer, f: impl FnOnce(&T) -> R) -> R {
        composer.record_read(&self.cell);
        self.with_untracked(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.read())
    }

    pub fn as_state(&self) -> State<T> {
        State {
            cell: Arc::clone(&self.cell),
        }
    }

    /// Number of scopes currently subscribed to this cell.
    pub fn subscriber_count(&self) -> usize {
        self.cell.subscriber_count()
    }
}

impl<T: Clone + 'static> MutableState<T> {
    pub fn read(&self, composer: &Composer) -> T {
        self.with(composer, T::clone)
    }

    /// Reads without subscribing anything.
    pub fn value(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: PartialEq + 'static> MutableState<T> {
    /// Stores `value`. Returns `false`, and notifies nobody, when it equals
    /// the current value.
    pub fn set(&self, value: T) -> bool {
        {
            let mut current = self.cell.value.write().unwrap_or_else(PoisonError::into_inner);
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.cell.notify();
        true
    }
}

impl<T: Clone + PartialEq + 'static> MutableState<T> {
    /// Applies `f` to a copy of the value under the write lock and stores the
    /// result if it differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        {
            let mut current = self.cell.value.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = current.clone();
            f(&mut next);
            if *current == next {
                return false;
            }
            *current = next;
        }
        self.cell.notify();
        true
    }
}

impl<T: fmt::Debug> fmt::Debug for MutableState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableState")
            .field("id", &self.cell.id)
            .field("value", &*self.cell.read())
            .finish()
    }
}

/// Read-only view of a [`MutableState`].
pub struct State<T> {
    cell: Arc<StateCell<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: 'static> State<T> {
    pub fn id(&self) -> StateId {
        self.cell.id
    }

    pub fn version(&self) -> u64 {
        self.cell.version.load(Ordering::Acquire)
    }

    pub fn with<R>(&self, composer: &Composer, f: impl FnOnce(&T) -> R) -> R {
        composer.record_read(&self.cell);
        f(&self.cell.read())
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.read())
    }
}

impl<T: Clone + 'static> State<T> {
    pub fn read(&self, composer: &Composer) -> T {
        self.with(composer, T::clone)
    }

    pub fn value(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.cell.id)
            .field("value", &*self.cell.read())
            .finish()
    }
}
