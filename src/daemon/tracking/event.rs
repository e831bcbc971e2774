use chrono::{DateTime, Utc};

use crate::daemon::intake::messages::BrowserMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Browser(BrowserMessage),
    /// Periodic flush request.
    Tick,
}

/// Represents something the tracker has to react to, stamped with the moment it was observed.
/// The tracker treats `timestamp` as "now", so an event that waited in the queue behind a slow
/// upload still carries its real timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl TrackerEvent {
    pub fn browser(message: BrowserMessage, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Browser(message),
            timestamp,
        }
    }

    pub fn tick(timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::Tick,
            timestamp,
        }
    }
}
