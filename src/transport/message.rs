use serde::{Deserialize, Serialize};

use crate::client::message::{ConfirmationResult, EventEnvelope, TrackingId};
use crate::provisioning::RegistrationStatus;
use crate::utils::error::ProvisioningError;

/// Frames sent by a device or a provisioning client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum DeviceFrame {
    #[serde(rename = "hello")]
    Hello {
        device_id: String,
        module_id: Option<String>,
        auth: String,
        protocol: String,
    },
    #[serde(rename = "event")]
    Event {
        tracking_id: TrackingId,
        envelope: EventEnvelope,
    },
    #[serde(rename = "register")]
    Register {
        id_scope: String,
        registration_id: String,
    },
}

/// Frames sent by the hub or the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ServiceFrame {
    #[serde(rename = "ack")]
    Ack {
        tracking_id: TrackingId,
        result: ConfirmationResult,
    },
    #[serde(rename = "status")]
    Status { status: RegistrationStatus },
    #[serde(rename = "assigned")]
    Assigned {
        assigned_hub: String,
        device_id: String,
    },
    #[serde(rename = "failed")]
    Failed { code: FailureCode, reason: String },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Why the provisioning service refused a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    Unauthorized,
    Disabled,
    HubNotSpecified,
    Rejected,
}

impl FailureCode {
    pub fn into_error(self, reason: String) -> ProvisioningError {
        match self {
            Self::Unauthorized => ProvisioningError::Unauthorized(reason),
            Self::Disabled => ProvisioningError::Disabled(reason),
            Self::HubNotSpecified => ProvisioningError::HubNotSpecified,
            Self::Rejected => ProvisioningError::Rejected(reason),
        }
    }
}
