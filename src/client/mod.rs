//! The `client` module holds everything a device needs to talk to its hub.
//!
//! It provides the connection descriptor and its connection-string parser,
//! the typed client options, the outbound message type, the `DeviceClient`
//! session handle and the telemetry loop that drives it.

pub mod connection;
pub mod device_client;
pub mod message;
pub mod options;
pub mod telemetry;

pub use connection::{AuthMode, ConnectionDescriptor};
pub use device_client::DeviceClient;
pub use message::{
    Confirmation, ConfirmationResult, EventEnvelope, Message, MessageProperties,
    PendingConfirmation, TrackingId,
};
pub use options::{ClientOption, ClientOptions, HttpProxy, PrivateKey, X509Credential};
pub use telemetry::{LoopState, TelemetryLoop, TelemetryReport};
