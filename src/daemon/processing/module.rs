use anyhow::Result;

use crate::daemon::tracking::event::TrackerEvent;

/// Represents an event processor. The processing loop owns exactly one of these and feeds it
/// events strictly one at a time.
pub trait EventProcessor {
    /// Runs once before the first event.
    fn initialize(&mut self) -> impl std::future::Future<Output = Result<()>>;

    fn process_next(&mut self, event: TrackerEvent) -> impl std::future::Future<Output = Result<()>>;

    /// Runs once after the last event.
    fn finalize(&mut self) -> impl std::future::Future<Output = Result<()>>;
}
