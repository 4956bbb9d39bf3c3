//! Live progress reporting.

use crate::result::ProbeResult;

/// One completed probe within a session.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    /// Probes finished so far, including this one
    pub completed: usize,
    /// Probes scheduled in the session
    pub total: usize,
    /// The result that just arrived
    pub result: &'a ProbeResult,
}

impl ProgressEvent<'_> {
    /// Completion as a whole percentage.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        u8::try_from(self.completed.saturating_mul(100) / self.total).unwrap_or(100)
    }
}

/// Receives progress after every probe resolution.
///
/// Events arrive in order from the session's driving task; `completed`
/// increases by one per event and reaches `total` exactly once.
pub trait ProgressObserver: Send + Sync {
    /// Called once per resolved probe.
    fn on_progress(&self, event: ProgressEvent<'_>);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _event: ProgressEvent<'_>) {}
}

impl<F> ProgressObserver for F
where
    F: Fn(ProgressEvent<'_>) + Send + Sync,
{
    fn on_progress(&self, event: ProgressEvent<'_>) {
        self(event);
    }
}
