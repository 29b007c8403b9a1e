use tracing::{error, info, warn};

use crate::client::message::{ConfirmationResult, EventEnvelope, TrackingId};
use crate::config::SimulatorSettings;
use crate::persistence::{EventStore, StoredEvent};
use crate::provisioning::DeviceAssignment;
use crate::transport::message::FailureCode;
use crate::utils::error::PersistenceError;

/// Why the simulator refused a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    pub code: FailureCode,
    pub reason: String,
}

/// The service side of the simulator: stores telemetry and hands out hub
/// assignments to registering devices.
///
/// Access is synchronous and meant to sit behind a lock shared by the
/// connection tasks; callers should not hold that lock across network I/O.
#[derive(Debug)]
pub struct Hub {
    store: EventStore,
    assigned_hub: String,
    id_scope: String,
}

impl Hub {
    pub fn new(store: EventStore, assigned_hub: &str, id_scope: &str) -> Self {
        Self {
            store,
            assigned_hub: assigned_hub.to_string(),
            id_scope: id_scope.to_string(),
        }
    }

    pub fn from_settings(store: EventStore, settings: &SimulatorSettings) -> Self {
        Self::new(store, &settings.assigned_hub, &settings.id_scope)
    }

    /// Store an event and decide how it is confirmed.
    pub fn accept_event(
        &self,
        device_id: &str,
        tracking_id: TrackingId,
        envelope: &EventEnvelope,
    ) -> ConfirmationResult {
        match self.store.store_event(device_id, tracking_id, envelope) {
            Ok(_) => {
                info!(%device_id, tracking_id, bytes = envelope.payload.len(), "event received");
                ConfirmationResult::Ok
            }
            Err(e) => {
                error!(%device_id, tracking_id, "failed to store event: {e}");
                ConfirmationResult::Error
            }
        }
    }

    /// Assign a hub to a device registering in the simulator's ID scope.
    /// The device id is the registration id.
    pub fn register(&self, id_scope: &str, registration_id: &str) -> Result<DeviceAssignment, Refusal> {
        if id_scope != self.id_scope {
            warn!(%id_scope, %registration_id, "registration for an unknown id scope");
            return Err(Refusal {
                code: FailureCode::Unauthorized,
                reason: format!("unknown id scope '{id_scope}'"),
            });
        }
        if registration_id.trim().is_empty() || registration_id.contains(char::is_whitespace) {
            return Err(Refusal {
                code: FailureCode::Rejected,
                reason: format!("invalid registration id '{registration_id}'"),
            });
        }
        if self.assigned_hub.trim().is_empty() {
            return Err(Refusal {
                code: FailureCode::HubNotSpecified,
                reason: "no hub configured for assignment".to_string(),
            });
        }

        info!(%registration_id, hub = %self.assigned_hub, "device assigned");
        DeviceAssignment::new(self.assigned_hub.clone(), registration_id).map_err(|e| Refusal {
            code: FailureCode::Rejected,
            reason: e.to_string(),
        })
    }

    pub fn events(&self, device_id: &str) -> Result<Vec<StoredEvent>, PersistenceError> {
        self.store.load_events(device_id)
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }
}
