use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::daemon::intake::messages::TabId;

/// A host that is being tracked right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedHost {
    pub tab_id: TabId,
    pub host: Arc<str>,
    pub started_at: DateTime<Utc>,
}

/// The open half of tracking. A host and its start time only ever exist together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActiveSession {
    #[default]
    Idle,
    Tracking(TrackedHost),
}

impl ActiveSession {
    pub fn start(tab_id: TabId, host: impl Into<Arc<str>>, now: DateTime<Utc>) -> Self {
        Self::Tracking(TrackedHost {
            tab_id,
            host: host.into(),
            started_at: now,
        })
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            ActiveSession::Idle => None,
            ActiveSession::Tracking(tracked) => Some(&tracked.host),
        }
    }

    pub fn tracked(&self) -> Option<&TrackedHost> {
        match self {
            ActiveSession::Idle => None,
            ActiveSession::Tracking(tracked) => Some(tracked),
        }
    }

    /// Moves the start of the current session to `now` without changing what is tracked. Used
    /// after the elapsed time was already folded into the accumulator.
    pub fn restart_clock(&mut self, now: DateTime<Utc>) {
        if let ActiveSession::Tracking(tracked) = self {
            tracked.started_at = now;
        }
    }
}
