//! The `error` module defines the error types used across `devicelink`.
//!
//! Each layer gets its own enum so callers can match on what actually went
//! wrong: option validation, transport I/O, the provisioning exchange, or the
//! local simulator's event store. `ClientError` is the type most application
//! code sees; it wraps the lower layers through `#[from]` conversions.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating client or provisioning options.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("invalid trusted certificate: {0}")]
    InvalidTrustedCertificate(&'static str),

    #[error("invalid x509 certificate: {0}")]
    InvalidCertificate(&'static str),

    #[error("invalid x509 private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid http proxy: {0}")]
    InvalidProxy(String),

    #[error("authentication mismatch: {0}")]
    AuthMismatch(String),

    #[error("invalid registration id: {0}")]
    InvalidRegistrationId(String),

    /// Options can no longer change once the transport has been opened.
    #[error("options are locked once the connection is open")]
    Locked,
}

/// Errors raised by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport {0} is not supported")]
    Unsupported(String),

    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport is not open")]
    NotOpen,

    #[error("connection closed by peer")]
    Closed,

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}

/// Errors surfaced by [`crate::client::DeviceClient`] and the telemetry loop.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error(transparent)]
    InvalidOption(#[from] OptionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("timed out after {elapsed:?} ({sent} sent, {confirmed} confirmed)")]
    Timeout {
        elapsed: Duration,
        sent: usize,
        confirmed: usize,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors produced by the provisioning phase.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    InvalidOption(#[from] OptionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("registration unauthorized: {0}")]
    Unauthorized(String),

    #[error("registration disabled: {0}")]
    Disabled(String),

    #[error("service did not assign a hub")]
    HubNotSpecified,

    #[error("malformed registration result: {0}")]
    Parsing(String),

    #[error("registration rejected: {0}")]
    Rejected(String),

    #[error("registration timed out after {0:?}")]
    Timeout(Duration),

    #[error("registration cancelled")]
    Cancelled,
}

/// Errors raised when tearing down the platform.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{live} client handle(s) still alive")]
    Busy { live: usize },
}

/// Errors raised by the simulator's event store.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
pub type TransportResult<T> = Result<T, TransportError>;
