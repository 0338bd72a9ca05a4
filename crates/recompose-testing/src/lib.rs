//! Headless helpers for exercising compositions in tests.

mod applier;
mod testing;

pub use applier::{ApplierEvent, RecordingApplier};
pub use testing::{run_test_composition, ComposeTestRule};
