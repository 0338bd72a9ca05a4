//! Hooks through which the runtime asks its host for a recomposition.

/// Wakes the host's recomposition loop.
///
/// Called from whichever thread wrote a state cell, so implementations must
/// be cheap and thread-safe. Requests are coalesced by the runtime: the
/// scheduler is asked at most once per newly pending scope.
pub trait RecomposeScheduler: Send + Sync {
    fn request_recompose(&self);
}

/// Scheduler for hosts that drive `Recomposer::recompose` themselves.
#[derive(Debug, Default)]
pub struct DefaultScheduler;

impl RecomposeScheduler for DefaultScheduler {
    fn request_recompose(&self) {}
}
