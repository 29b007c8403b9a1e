//! The `persistence` module stores the telemetry received by the hub
//! simulator so it can be inspected after a run.
//!
//! It uses `sled` as an embedded key-value store.

pub mod sled_store;

pub use sled_store::{EventStore, StoredEvent};
