//! Tracks how long the browser spends on each domain and uploads the totals to a backend.
//! The browser extension only forwards tab and window events; the native messaging host in
//! [daemon] owns all of the state and survives restarts through a small on-disk store.
//!

pub mod cli;
pub mod daemon;
pub mod utils;
