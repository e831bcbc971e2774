//! Everything that turns browser activity into [TrackerEvent](super::tracking::event::TrackerEvent)s.
//! The extension forwards its tab and window events over the native messaging pipe,
//! [native::NativeIntake] decodes them.

pub mod messages;
pub mod native;
