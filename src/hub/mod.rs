//! Local hub and provisioning simulator.
//!
//! The simulator is the receiving side for local runs: it acknowledges and
//! stores device telemetry and assigns hubs to registering devices, using the
//! same JSON frames as the websocket bridge transport.

pub mod engine;
pub mod server;

pub use engine::{Hub, Refusal};
pub use server::{serve, start_hub_server};
