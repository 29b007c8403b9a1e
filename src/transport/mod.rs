//! The `transport` module is responsible for moving frames between a client
//! and the service.
//!
//! It defines the transport traits the device and provisioning clients drive,
//! the runtime [`TransportProvider`] selector, and the factory that turns a
//! selector into a concrete transport. Two implementations ship with the
//! crate: a websocket bridge speaking JSON frames, and an in-memory loopback
//! used by tests and dry runs.

pub mod loopback;
pub mod message;
pub mod websocket;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use crate::client::connection::ConnectionDescriptor;
use crate::client::message::{Confirmation, EventEnvelope, TrackingId};
use crate::client::options::ClientOptions;
use crate::provisioning::{DeviceAssignment, RegistrationRequest, RegistrationStatus};
use crate::utils::error::{ProvisioningError, TransportError, TransportResult};

pub use loopback::{
    DeliveredEvent, LoopbackConfig, LoopbackFactory, LoopbackInbox, LoopbackProvisioning,
    LoopbackTransport, ProvisioningScript,
};
pub use websocket::{WebSocketProvisioning, WebSocketTransport};

/// Selects the wire protocol a client uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProvider {
    Mqtt,
    MqttWebSockets,
    Amqp,
    AmqpWebSockets,
    Http,
}

impl TransportProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::MqttWebSockets => "mqtt-ws",
            Self::Amqp => "amqp",
            Self::AmqpWebSockets => "amqp-ws",
            Self::Http => "http",
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::MqttWebSockets | Self::AmqpWebSockets)
    }
}

impl fmt::Display for TransportProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportProvider {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "mqtt-ws" | "mqtt-websockets" => Ok(Self::MqttWebSockets),
            "amqp" => Ok(Self::Amqp),
            "amqp-ws" | "amqp-websockets" => Ok(Self::AmqpWebSockets),
            "http" => Ok(Self::Http),
            _ => Err(TransportError::Unsupported(s.to_string())),
        }
    }
}

/// Transport used by a device session.
///
/// Implementations never block waiting for the service: `poll` returns
/// whatever confirmations are ready right now, possibly none.
#[async_trait]
pub trait Transport: Send {
    async fn open(
        &mut self,
        descriptor: &ConnectionDescriptor,
        options: &ClientOptions,
    ) -> TransportResult<()>;

    async fn submit(&mut self, tracking_id: TrackingId, envelope: &EventEnvelope)
    -> TransportResult<()>;

    async fn poll(&mut self) -> TransportResult<Vec<Confirmation>>;

    async fn close(&mut self) -> TransportResult<()>;
}

/// Transport used by the provisioning exchange.
///
/// `register` reports progress on `status` and resolves with the final
/// outcome. The terminal `Assigned` and `Error` statuses are reported by the
/// provisioning client, not by the transport.
#[async_trait]
pub trait ProvisioningTransport: Send {
    async fn register(
        &mut self,
        request: &RegistrationRequest,
        status: &UnboundedSender<RegistrationStatus>,
    ) -> Result<DeviceAssignment, ProvisioningError>;

    async fn close(&mut self) -> TransportResult<()>;
}

/// Builds transports for a selected provider.
pub trait TransportFactory: Send + Sync {
    fn device_transport(&self, provider: TransportProvider) -> TransportResult<Box<dyn Transport>>;

    fn provisioning_transport(
        &self,
        provider: TransportProvider,
    ) -> TransportResult<Box<dyn ProvisioningTransport>>;
}

/// Default factory: websocket providers go over the JSON websocket bridge.
/// Native MQTT, AMQP and HTTP framing is not provided.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeFactory;

impl TransportFactory for BridgeFactory {
    fn device_transport(&self, provider: TransportProvider) -> TransportResult<Box<dyn Transport>> {
        if provider.is_websocket() {
            Ok(Box::new(WebSocketTransport::new(provider)))
        } else {
            Err(TransportError::Unsupported(provider.to_string()))
        }
    }

    fn provisioning_transport(
        &self,
        provider: TransportProvider,
    ) -> TransportResult<Box<dyn ProvisioningTransport>> {
        if provider.is_websocket() {
            Ok(Box::new(WebSocketProvisioning::new(provider)))
        } else {
            Err(TransportError::Unsupported(provider.to_string()))
        }
    }
}

#[cfg(test)]
mod tests;
