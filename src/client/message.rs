use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::utils::error::ClientError;

/// Identifies a message from the moment it is queued until its confirmation.
pub type TrackingId = u64;

/// System and application properties carried alongside a payload.
///
/// Values are transported verbatim; nothing is encoded or decoded on the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

/// An outbound device-to-cloud message.
///
/// Sending a message only borrows it: the client keeps its own copy, so the
/// caller is free to drop or reuse the message right after the send call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
    properties: MessageProperties,
}

impl Message {
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: bytes.into(),
            properties: MessageProperties::default(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn properties(&self) -> &MessageProperties {
        &self.properties
    }

    pub fn set_message_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.properties.message_id = Some(id.into());
        self
    }

    pub fn set_correlation_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.properties.correlation_id = Some(id.into());
        self
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.properties.content_type = Some(content_type.into());
        self
    }

    pub fn set_content_encoding(&mut self, encoding: impl Into<String>) -> &mut Self {
        self.properties.content_encoding = Some(encoding.into());
        self
    }

    /// Add an application property. Setting an existing key replaces its value.
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<&mut Self, ClientError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ClientError::InvalidMessage(
                "property key must not be empty".to_string(),
            ));
        }
        self.properties.custom.insert(key, value.into());
        Ok(self)
    }

    pub(crate) fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            payload: self.payload.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// The client-owned copy of a message as it travels to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub payload: Vec<u8>,
    #[serde(default)]
    pub properties: MessageProperties,
}

impl EventEnvelope {
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Outcome reported for a sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationResult {
    Ok,
    /// The client was destroyed before the message was confirmed.
    BecauseDestroy,
    MessageTimeout,
    Error,
}

impl ConfirmationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for ConfirmationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::BecauseDestroy => "because_destroy",
            Self::MessageTimeout => "message_timeout",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub tracking_id: TrackingId,
    pub result: ConfirmationResult,
}

/// Resolves once the message it was returned for has been confirmed.
///
/// Resolution happens inside [`crate::client::DeviceClient::do_work`] or
/// [`crate::client::DeviceClient::destroy`]. If the client is dropped without
/// being destroyed the future resolves to [`ConfirmationResult::BecauseDestroy`].
#[derive(Debug)]
pub struct PendingConfirmation {
    tracking_id: TrackingId,
    rx: oneshot::Receiver<ConfirmationResult>,
}

impl PendingConfirmation {
    pub(crate) fn new(tracking_id: TrackingId, rx: oneshot::Receiver<ConfirmationResult>) -> Self {
        Self { tracking_id, rx }
    }

    pub fn tracking_id(&self) -> TrackingId {
        self.tracking_id
    }

    /// Non-blocking check for the result.
    pub fn try_result(&mut self) -> Option<ConfirmationResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(ConfirmationResult::BecauseDestroy),
        }
    }
}

impl Future for PendingConfirmation {
    type Output = ConfirmationResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(ConfirmationResult::BecauseDestroy))
    }
}
