//! The `provisioning` module runs the bootstrap exchange that gives a device
//! its hub endpoint and identity before it opens a device session.
//!
//! A [`ProvisioningClient`] performs exactly one registration attempt. The
//! attempt runs on its own task; progress arrives on a status channel and the
//! final outcome is delivered once, through a oneshot, to the
//! [`RegistrationHandle`].

pub mod client;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::options::HttpProxy;
use crate::utils::error::ProvisioningError;

pub use client::{ProvisioningClient, ProvisioningOption, RegistrationHandle};

pub const DEFAULT_GLOBAL_ENDPOINT: &str = "global.azure-devices-provisioning.net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Connected,
    Registering,
    Assigning,
    Assigned,
    Error,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connected => "connected",
            Self::Registering => "registering",
            Self::Assigning => "assigning",
            Self::Assigned => "assigned",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Everything a provisioning transport needs to register a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub global_endpoint: String,
    pub id_scope: String,
    pub registration_id: String,
    pub trace: bool,
    pub http_proxy: Option<HttpProxy>,
}

/// The hub and identity a successful registration assigned to the device.
/// Both fields are guaranteed non-empty, including when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AssignmentFields")]
pub struct DeviceAssignment {
    assigned_hub: String,
    device_id: String,
}

#[derive(Deserialize)]
struct AssignmentFields {
    assigned_hub: String,
    device_id: String,
}

impl TryFrom<AssignmentFields> for DeviceAssignment {
    type Error = ProvisioningError;

    fn try_from(fields: AssignmentFields) -> Result<Self, Self::Error> {
        Self::new(fields.assigned_hub, fields.device_id)
    }
}

impl DeviceAssignment {
    pub fn new(
        assigned_hub: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Result<Self, ProvisioningError> {
        let assigned_hub = assigned_hub.into();
        let device_id = device_id.into();
        if assigned_hub.trim().is_empty() {
            return Err(ProvisioningError::Parsing(
                "assigned hub is empty".to_string(),
            ));
        }
        if device_id.trim().is_empty() {
            return Err(ProvisioningError::Parsing("device id is empty".to_string()));
        }
        Ok(Self {
            assigned_hub,
            device_id,
        })
    }

    pub fn assigned_hub(&self) -> &str {
        &self.assigned_hub
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

#[cfg(test)]
mod tests;
