use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::task::Waker;

use futures_task::ArcWake;

use crate::applier::ApplierHost;
use crate::composer::Composer;
use crate::error::ComposeError;
use crate::hash::map::{HashMap, HashSet};
use crate::invalidation::InvalidationQueue;
use crate::platform::{DefaultScheduler, RecomposeScheduler};
use crate::scope::RecomposeScope;
use crate::ScopeId;

/// Executions of a single scope allowed within one `recompose()` call before
/// it is treated as invalidating itself forever.
pub const MAX_PASS_EXECUTIONS: usize = 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecomposerState {
    Idle,
    Composing,
    Recomposing,
}

struct RecomposerInner {
    queue: Arc<InvalidationQueue>,
    composers: RefCell<Vec<Composer>>,
    state: Cell<RecomposerState>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RecomposerInner {
    fn drop(&mut self) {
        for composer in self.composers.get_mut().drain(..) {
            composer.dispose();
            if let Err(err) = composer.apply_changes() {
                log::warn!("dropping composer {}: {err}", composer.id());
            }
        }
    }
}

/// Owns compositions and re-runs the scopes whose state changed.
///
/// The recomposer lives on the thread that composes. State writes from other
/// threads only touch its [`RecomposerHandle`]'s queue and ask the scheduler
/// for a frame; the host then calls [`Recomposer::recompose`] on this thread.
#[derive(Clone)]
pub struct Recomposer {
    inner: Rc<RecomposerInner>,
}

impl Default for Recomposer {
    fn default() -> Self {
        Self::new()
    }
}

struct StateGuard<'a> {
    state: &'a Cell<RecomposerState>,
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.set(RecomposerState::Idle);
    }
}

impl Recomposer {
    pub fn new() -> Self {
        Self::with_scheduler(Arc::new(DefaultScheduler))
    }

    pub fn with_scheduler(scheduler: Arc<dyn RecomposeScheduler>) -> Self {
        Self {
            inner: Rc::new(RecomposerInner {
                queue: Arc::new(InvalidationQueue::new(scheduler)),
                composers: RefCell::new(Vec::new()),
                state: Cell::new(RecomposerState::Idle),
                _not_send: PhantomData,
            }),
        }
    }

    pub fn state(&self) -> RecomposerState {
        self.inner.state.get()
    }

    fn enter(&self, next: RecomposerState) -> Result<StateGuard<'_>, ComposeError> {
        let state = self.inner.state.get();
        if state != RecomposerState::Idle {
            return Err(ComposeError::Reentrant { state });
        }
        self.inner.state.set(next);
        Ok(StateGuard {
            state: &self.inner.state,
        })
    }

    /// Creates a composition whose node changes are discarded.
    pub fn create_composer(&self) -> Composer {
        self.register(Composer::new(Arc::clone(&self.inner.queue), None))
    }

    pub fn create_composer_with_applier(&self, applier: Rc<dyn ApplierHost>) -> Composer {
        self.register(Composer::new(Arc::clone(&self.inner.queue), Some(applier)))
    }

    fn register(&self, composer: Composer) -> Composer {
        log::debug!("composer {} created", composer.id());
        self.inner.composers.borrow_mut().push(composer.clone());
        composer
    }

    /// Composes `body` into the first composition, creating it if needed.
    pub fn compose<T, F>(&self, body: F) -> Result<T, ComposeError>
    where
        F: FnMut(&Composer) -> T + 'static,
    {
        let primary = self.inner.composers.borrow().first().cloned();
        let composer = match primary {
            Some(composer) => composer,
            None => self.create_composer(),
        };
        self.compose_with(&composer, body)
    }

    /// Runs `body` as the root of `composer`'s composition and applies the
    /// resulting changes. Composing again replaces the root body and diffs
    /// against the previous pass.
    pub fn compose_with<T, F>(&self, composer: &Composer, body: F) -> Result<T, ComposeError>
    where
        F: FnMut(&Composer) -> T + 'static,
    {
        let _guard = self.enter(RecomposerState::Composing)?;
        let result = composer.compose_root(body)?;
        composer.apply_changes()?;
        Ok(result)
    }

    pub fn has_pending_recompositions(&self) -> bool {
        !self.inner.queue.is_empty()
    }

    pub fn get_pending_recompositions(&self) -> HashSet<ScopeId> {
        self.inner.queue.snapshot()
    }

    /// Re-runs pending scopes until none are left, ancestors before
    /// descendants. Returns the number of scope executions.
    pub fn recompose(&self) -> Result<usize, ComposeError> {
        let _guard = self.enter(RecomposerState::Recomposing)?;
        if self.inner.queue.is_empty() {
            return Ok(0);
        }
        let mut executions: HashMap<ScopeId, usize> = HashMap::default();
        let mut total = 0;
        loop {
            let work = self.collect_pending()?;
            if work.is_empty() {
                break;
            }
            let mut touched: Vec<Composer> = Vec::new();
            for (_, composer, scope) in work {
                if scope.is_disposed() || !self.inner.queue.contains(scope.id()) {
                    continue;
                }
                let count = executions.entry(scope.id()).or_insert(0);
                if *count >= MAX_PASS_EXECUTIONS {
                    log::warn!(
                        "scope {} still invalid after {} executions",
                        scope.id(),
                        *count
                    );
                    return Err(ComposeError::SelfInvalidatingScope {
                        scope: scope.id(),
                        executions: *count,
                    });
                }
                *count += 1;
                if composer.recompose_scope(&scope)? {
                    total += 1;
                }
                if !touched.contains(&composer) {
                    touched.push(composer);
                }
            }
            for composer in touched {
                composer.apply_changes()?;
            }
        }
        log::debug!("recomposition finished after {total} execution(s)");
        Ok(total)
    }

    /// Resolves pending ids to scopes, sorted by composer creation order and
    /// nesting depth. Ids whose scope is gone are dropped from the queue.
    fn collect_pending(
        &self,
    ) -> Result<Vec<((usize, usize, ScopeId), Composer, RecomposeScope)>, ComposeError> {
        let pending = self.inner.queue.snapshot();
        let composers = self.inner.composers.borrow();
        let mut work = Vec::with_capacity(pending.len());
        let mut poisoned = None;
        for id in pending {
            let found = composers
                .iter()
                .enumerate()
                .find_map(|(order, composer)| composer.scope(id).map(|scope| (order, composer, scope)));
            match found {
                Some((_, composer, _)) if composer.is_poisoned() => {
                    self.inner.queue.remove(id);
                    poisoned.get_or_insert(composer.id());
                }
                Some((order, composer, scope)) => {
                    work.push(((order, scope.depth(), id), composer.clone(), scope));
                }
                None => {
                    self.inner.queue.remove(id);
                }
            }
        }
        if let Some(composer) = poisoned {
            return Err(ComposeError::Poisoned { composer });
        }
        work.sort_by_key(|(order, _, _)| *order);
        Ok(work)
    }

    /// A thread-safe view of this recomposer's pending work.
    pub fn handle(&self) -> RecomposerHandle {
        RecomposerHandle {
            queue: Arc::clone(&self.inner.queue),
        }
    }

    /// Disposes `composer`'s composition and forgets it.
    pub fn dispose_composer(&self, composer: &Composer) -> Result<(), ComposeError> {
        let _guard = self.enter(RecomposerState::Composing)?;
        self.inner
            .composers
            .borrow_mut()
            .retain(|candidate| candidate != composer);
        composer.dispose();
        composer.apply_changes()
    }

    /// Disposes every composition. The recomposer stays usable.
    pub fn shutdown(&self) -> Result<(), ComposeError> {
        let _guard = self.enter(RecomposerState::Composing)?;
        let composers = std::mem::take(&mut *self.inner.composers.borrow_mut());
        let mut result = Ok(());
        for composer in composers {
            composer.dispose();
            if let Err(err) = composer.apply_changes() {
                result = result.and(Err(err));
            }
        }
        result
    }

    pub fn composer_count(&self) -> usize {
        self.inner.composers.borrow().len()
    }
}

/// `Send + Sync` access to a recomposer's pending set from any thread.
#[derive(Clone)]
pub struct RecomposerHandle {
    queue: Arc<InvalidationQueue>,
}

impl RecomposerHandle {
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// A waker that asks the scheduler for a recomposition when woken.
    pub fn waker(&self) -> Waker {
        futures_task::waker(Arc::new(SchedulerWaker {
            scheduler: Arc::clone(self.queue.scheduler()),
        }))
    }
}

struct SchedulerWaker {
    scheduler: Arc<dyn RecomposeScheduler>,
}

impl ArcWake for SchedulerWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.scheduler.request_recompose();
    }
}
