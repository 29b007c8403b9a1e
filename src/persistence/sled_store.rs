//! Event store backed by `sled`
//!
//! Stores the telemetry the hub simulator receives, one `sled` tree per
//! device. Each key is the receive timestamp followed by a monotonic id from
//! the database, so iteration yields events in arrival order even within one
//! millisecond, and TTL cleanup can work off the key alone.
//!
//! Retention options:
//! - `ttl_seconds`: events older than this are removed when a device's
//!   events are loaded
//! - `max_events_per_device`: when exceeded, the oldest events are removed

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use tracing::warn;

use crate::client::message::{EventEnvelope, TrackingId};
use crate::utils::error::PersistenceError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub device_id: String,
    pub tracking_id: TrackingId,
    pub envelope: EventEnvelope,
    pub received_at: i64,
}

#[derive(Clone)]
pub struct EventStore {
    db: Db,
    ttl_seconds: Option<i64>,
    max_events_per_device: Option<usize>,
}

impl EventStore {
    /// Open or create a sled database at `path` with the given policy.
    pub fn new(
        path: &str,
        ttl_seconds: Option<i64>,
        max_events_per_device: Option<usize>,
    ) -> Result<Self, PersistenceError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            ttl_seconds,
            max_events_per_device,
        })
    }

    pub fn store_event(
        &self,
        device_id: &str,
        tracking_id: TrackingId,
        envelope: &EventEnvelope,
    ) -> Result<StoredEvent, PersistenceError> {
        let event = StoredEvent {
            device_id: device_id.to_string(),
            tracking_id,
            envelope: envelope.clone(),
            received_at: Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_vec(&event)?;
        let tree = self.db.open_tree(device_id)?;

        let key = format!("{:020}_{:020}", event.received_at, self.db.generate_id()?);
        tree.insert(key.as_bytes(), serialized)?;

        if let Some(max) = self.max_events_per_device {
            let total = tree.len();
            if total > max {
                let excess: Vec<_> = tree
                    .iter()
                    .take(total - max)
                    .filter_map(|entry| entry.ok().map(|(k, _)| k))
                    .collect();
                for key in excess {
                    tree.remove(key)?;
                }
            }
        }

        Ok(event)
    }

    /// Load a device's events in arrival order, honoring the TTL.
    pub fn load_events(&self, device_id: &str) -> Result<Vec<StoredEvent>, PersistenceError> {
        self.cleanup_expired(device_id)?;
        let tree = self.db.open_tree(device_id)?;

        let mut events = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry?;
            match serde_json::from_slice(&value) {
                Ok(event) => events.push(event),
                Err(e) => warn!(%device_id, "skipping unreadable stored event: {e}"),
            }
        }
        Ok(events)
    }

    /// Devices that have at least one stored event tree.
    pub fn devices(&self) -> Vec<String> {
        self.db
            .tree_names()
            .into_iter()
            .filter_map(|name| String::from_utf8(name.to_vec()).ok())
            .filter(|name| name != "__sled__default")
            .collect()
    }

    fn cleanup_expired(&self, device_id: &str) -> Result<(), PersistenceError> {
        let Some(ttl) = self.ttl_seconds else {
            return Ok(());
        };
        let expiry = Utc::now().timestamp_millis() - ttl * 1000;
        let tree = self.db.open_tree(device_id)?;

        let expired: Vec<_> = tree
            .iter()
            .filter_map(|res| res.ok())
            .filter_map(|(key, _)| {
                let key_str = std::str::from_utf8(&key).ok()?;
                let (ts, _) = key_str.split_once('_')?;
                let ts: i64 = ts.parse().ok()?;
                (ts < expiry).then_some(key)
            })
            .collect();

        for key in expired {
            tree.remove(key)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("db", &"sled::Db")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_events_per_device", &self.max_events_per_device)
            .finish()
    }
}
