//! Standard runtime services backed by Rust's `std` library.
//!
//! [`StdScheduler`] records recomposition requests in an atomic flag and
//! optionally pokes a host-supplied waker, so a frame loop on the composing
//! thread can sleep until some state it rendered changes. [`StdRuntime`]
//! bundles it with a [`Recomposer`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use recompose_core::{ComposeError, RecomposeScheduler, Recomposer, RecomposerHandle};

type FrameWaker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Recomposition requests from any thread, observed by the composing one.
///
/// Requests coalesce: however many arrive between two
/// [`take_frame_request`](Self::take_frame_request) calls, the frame loop
/// sees one.
pub struct StdScheduler {
    requested: AtomicBool,
    on_request: RwLock<Option<FrameWaker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            on_request: RwLock::new(None),
        }
    }

    /// Consumes the pending request, if any.
    pub fn take_frame_request(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    /// `waker` runs on the requesting thread, once per request.
    pub fn set_frame_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.replace_waker(Some(Arc::new(waker)));
    }

    pub fn clear_frame_waker(&self) {
        self.replace_waker(None);
    }

    fn replace_waker(&self, waker: Option<FrameWaker>) {
        let mut slot = self
            .on_request
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = waker;
    }

    fn current_waker(&self) -> Option<FrameWaker> {
        self.on_request
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field("requested", &self.requested.load(Ordering::SeqCst))
            .field("has_waker", &self.current_waker().is_some())
            .finish()
    }
}

impl RecomposeScheduler for StdScheduler {
    fn request_recompose(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // The read lock is released before the waker runs.
        if let Some(waker) = self.current_waker() {
            waker();
        }
    }
}

/// A [`Recomposer`] wired to a [`StdScheduler`].
///
/// Not `Send`: create it on the thread that composes and hand
/// [`StdRuntime::handle`] or the scheduler to other threads.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    recomposer: Recomposer,
}

impl StdRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let recomposer = Recomposer::with_scheduler(scheduler.clone());
        Self {
            scheduler,
            recomposer,
        }
    }

    pub fn recomposer(&self) -> Recomposer {
        self.recomposer.clone()
    }

    pub fn handle(&self) -> RecomposerHandle {
        self.recomposer.handle()
    }

    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn take_frame_request(&self) -> bool {
        self.scheduler.take_frame_request()
    }

    pub fn set_frame_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_frame_waker(waker);
    }

    pub fn clear_frame_waker(&self) {
        self.scheduler.clear_frame_waker();
    }

    /// Consumes the pending frame request, if any, and recomposes.
    ///
    /// Returns the number of scope executions; `Ok(0)` when nothing was
    /// pending.
    pub fn run_frame(&self) -> Result<usize, ComposeError> {
        if !self.take_frame_request() && !self.recomposer.has_pending_recompositions() {
            return Ok(0);
        }
        let executions = self.recomposer.recompose()?;
        log::trace!("frame recomposed {executions} scope(s)");
        Ok(executions)
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("composers", &self.recomposer.composer_count())
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
