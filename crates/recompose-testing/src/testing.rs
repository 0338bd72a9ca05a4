use std::cell::RefMut;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use recompose_core::{ComposeError, Composer, ConcreteApplierHost, RecomposeScheduler, Recomposer};

use crate::applier::RecordingApplier;

const MAX_PUMP_ROUNDS: usize = 100;

#[derive(Debug, Default)]
struct CountingScheduler {
    requests: AtomicUsize,
}

impl RecomposeScheduler for CountingScheduler {
    fn request_recompose(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Headless harness owning one composition backed by a [`RecordingApplier`].
pub struct ComposeTestRule {
    recomposer: Recomposer,
    scheduler: Arc<CountingScheduler>,
    applier: Rc<ConcreteApplierHost<RecordingApplier>>,
    composer: Composer,
}

impl ComposeTestRule {
    pub fn new() -> Self {
        let scheduler = Arc::new(CountingScheduler::default());
        let recomposer = Recomposer::with_scheduler(scheduler.clone());
        let applier = Rc::new(ConcreteApplierHost::new(RecordingApplier::new()));
        let composer = recomposer.create_composer_with_applier(applier.clone());
        Self {
            recomposer,
            scheduler,
            applier,
            composer,
        }
    }

    /// Composes `content` as the root, replacing whatever was set before.
    pub fn set_content(
        &mut self,
        content: impl FnMut(&Composer) + 'static,
    ) -> Result<(), ComposeError> {
        self.recomposer.compose_with(&self.composer, content)
    }

    pub fn recompose(&mut self) -> Result<usize, ComposeError> {
        self.recomposer.recompose()
    }

    /// Recomposes until no scope is pending.
    pub fn pump_until_idle(&mut self) -> Result<(), ComposeError> {
        let mut rounds = 0;
        while self.recomposer.has_pending_recompositions() {
            rounds += 1;
            if rounds > MAX_PUMP_ROUNDS {
                panic!("pump_until_idle looped too many times");
            }
            self.recomposer.recompose()?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.recomposer.get_pending_recompositions().len()
    }

    /// Number of times the runtime asked for a recomposition.
    pub fn frame_requests(&self) -> usize {
        self.scheduler.requests.load(Ordering::SeqCst)
    }

    pub fn applier_mut(&self) -> RefMut<'_, RecordingApplier> {
        self.applier.borrow_typed()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn recomposer(&self) -> &Recomposer {
        &self.recomposer
    }
}

impl Default for ComposeTestRule {
    fn default() -> Self {
        Self::new()
    }
}

pub fn run_test_composition<R>(f: impl FnOnce(&mut ComposeTestRule) -> R) -> R {
    let mut rule = ComposeTestRule::new();
    f(&mut rule)
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;
