//! # devicelink
//!
//! `devicelink` is a small device-to-cloud client library. A device opens a
//! session against its hub, sends telemetry messages, and drives the session
//! with an explicit work pump until every message has been confirmed. A device
//! that does not know its hub yet can first run a provisioning exchange that
//! assigns it a hub endpoint and a device identity.
//!
//! ## Core Modules
//!
//! - `platform`: process-level init/deinit that brackets every client handle.
//! - `client`: connection descriptors, typed options, messages, the device
//!   client and the completion-driven telemetry loop.
//! - `provisioning`: registration against a provisioning endpoint.
//! - `transport`: the transport traits, the runtime transport selector, a
//!   websocket bridge and an in-memory loopback used for tests and dry runs.
//! - `hub`: a local hub and provisioning simulator that receives and stores
//!   telemetry for inspection.
//! - `persistence`: the `sled` event store used by the simulator.
//! - `config`: settings loading from file and environment.
//! - `utils`: error types and logging setup.

pub mod client;
pub mod config;
pub mod hub;
pub mod persistence;
pub mod platform;
pub mod provisioning;
pub mod transport;
pub mod utils;

pub use client::{DeviceClient, Message, TelemetryLoop};
pub use platform::Platform;
pub use provisioning::{DeviceAssignment, ProvisioningClient};
pub use transport::TransportProvider;

#[cfg(test)]
mod tests;
