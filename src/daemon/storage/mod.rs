//!  Storage is organized through [kv::KeyValueStore].
//!  The basic idea is:
//!   - The tracker only needs a tiny key-value blob, the same thing a browser extension would
//!     keep in its local storage.
//!   - [json_file::JsonFileStore] keeps that blob in a single JSON file in the application
//!     directory.
//!   - [accumulator::AccumulatorStore] gives the blob its meaning: per-host durations and the
//!     start of the current period.

pub mod accumulator;
pub mod entities;
pub mod json_file;
pub mod kv;
