use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::hash::map::{HashMap, HashSet};
use crate::platform::RecomposeScheduler;
use crate::ScopeId;

/// Thread-safe set of scopes waiting to be recomposed.
///
/// Each entry carries the stamp of the last invalidation that touched it. A
/// scope is only cleared after running when its stamp did not move while the
/// body executed; otherwise it invalidated itself and stays pending.
pub(crate) struct InvalidationQueue {
    pending: Mutex<HashMap<ScopeId, u64>>,
    next_stamp: AtomicU64,
    scheduler: Arc<dyn RecomposeScheduler>,
}

impl InvalidationQueue {
    pub(crate) fn new(scheduler: Arc<dyn RecomposeScheduler>) -> Self {
        Self {
            pending: Mutex::new(HashMap::default()),
            next_stamp: AtomicU64::new(1),
            scheduler,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScopeId, u64>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `scope` pending. Only the first invalidation of a scope that is
    /// not already pending asks the scheduler for a recomposition.
    pub(crate) fn invalidate(&self, scope: ScopeId) {
        let stamp = self.next_stamp.fetch_add(1, Ordering::Relaxed);
        let newly_pending = self.lock().insert(scope, stamp).is_none();
        if newly_pending {
            log::trace!("scope {scope} invalidated");
            self.scheduler.request_recompose();
        }
    }

    pub(crate) fn stamp_of(&self, scope: ScopeId) -> Option<u64> {
        self.lock().get(&scope).copied()
    }

    /// Clears `scope` unless it was invalidated again after `stamp` was read.
    pub(crate) fn settle(&self, scope: ScopeId, stamp: u64) -> bool {
        let mut pending = self.lock();
        if pending.get(&scope) == Some(&stamp) {
            pending.remove(&scope);
            true
        } else {
            false
        }
    }

    pub(crate) fn remove(&self, scope: ScopeId) -> bool {
        self.lock().remove(&scope).is_some()
    }

    pub(crate) fn contains(&self, scope: ScopeId) -> bool {
        self.lock().contains_key(&scope)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn snapshot(&self) -> HashSet<ScopeId> {
        self.lock().keys().copied().collect()
    }

    pub(crate) fn scheduler(&self) -> &Arc<dyn RecomposeScheduler> {
        &self.scheduler
    }
}
