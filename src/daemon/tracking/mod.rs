//! The session-accumulation state machine and the types it works with.

pub mod event;
pub mod host;
pub mod session;
pub mod tracker;
