//! Device client
//!
//! A `DeviceClient` owns one device session. It does no I/O on its own:
//! the caller drives it by calling [`DeviceClient::do_work`] repeatedly, which
//! opens the transport on first use, flushes queued events and resolves the
//! confirmations that have arrived since the previous call.
//!
//! Lifecycle notes:
//! - Options are validated against the auth mode when the client is built
//!   and can only be changed until the transport has been opened.
//! - [`DeviceClient::destroy`] consumes the client, so nothing can reference
//!   it afterwards. Every confirmation still pending at that point resolves to
//!   `BecauseDestroy`.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::client::connection::ConnectionDescriptor;
use crate::client::message::{
    Confirmation, ConfirmationResult, EventEnvelope, Message, PendingConfirmation, TrackingId,
};
use crate::client::options::{ClientOption, ClientOptions};
use crate::platform::{Platform, PlatformLease};
use crate::provisioning::DeviceAssignment;
use crate::transport::{Transport, TransportProvider};
use crate::utils::error::{ClientResult, OptionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Open,
}

pub struct DeviceClient {
    descriptor: ConnectionDescriptor,
    provider: Option<TransportProvider>,
    options: ClientOptions,
    transport: Box<dyn Transport>,
    state: SessionState,
    outbox: VecDeque<(TrackingId, EventEnvelope)>,
    pending: HashMap<TrackingId, oneshot::Sender<ConfirmationResult>>,
    next_tracking_id: TrackingId,
    _lease: PlatformLease,
}

impl DeviceClient {
    /// Create a client from a connection string such as
    /// `HostName=<host>;DeviceId=<id>;x509=true`.
    pub fn from_connection_string(
        platform: &Platform,
        connection_string: &str,
        provider: TransportProvider,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        let descriptor: ConnectionDescriptor = connection_string.parse()?;
        Self::create(platform, descriptor, provider, options)
    }

    /// Create a client for the hub and identity assigned by provisioning.
    pub fn from_device_auth(
        platform: &Platform,
        assignment: &DeviceAssignment,
        provider: TransportProvider,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        Self::create(
            platform,
            ConnectionDescriptor::from_assignment(assignment),
            provider,
            options,
        )
    }

    pub fn create(
        platform: &Platform,
        descriptor: ConnectionDescriptor,
        provider: TransportProvider,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        options.validate_for(&descriptor.auth)?;
        let transport = platform.factory().device_transport(provider)?;
        let mut client = Self::with_transport(platform, descriptor, options, transport)?;
        client.provider = Some(provider);
        Ok(client)
    }

    /// Create a client around an already built transport.
    pub fn with_transport(
        platform: &Platform,
        descriptor: ConnectionDescriptor,
        options: ClientOptions,
        transport: Box<dyn Transport>,
    ) -> ClientResult<Self> {
        options.validate_for(&descriptor.auth)?;
        info!(
            host = %descriptor.host,
            device_id = %descriptor.device_id,
            auth = descriptor.auth.as_str(),
            "device client created"
        );
        Ok(Self {
            descriptor,
            provider: None,
            options,
            transport,
            state: SessionState::Idle,
            outbox: VecDeque::new(),
            pending: HashMap::new(),
            next_tracking_id: 1,
            _lease: platform.lease(),
        })
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// The selected transport, or `None` for an injected transport.
    pub fn provider(&self) -> Option<TransportProvider> {
        self.provider
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Number of sent messages still waiting for a confirmation.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Apply a single option. The update is validated together with the
    /// existing options and rejected as a whole if it does not fit.
    pub fn set_option(&mut self, option: ClientOption) -> ClientResult<()> {
        if self.state != SessionState::Idle {
            return Err(OptionError::Locked.into());
        }
        let mut updated = self.options.clone();
        updated.apply(option);
        updated.validate_for(&self.descriptor.auth)?;
        self.options = updated;
        Ok(())
    }

    /// Queue a copy of `message` for delivery. The message itself stays with
    /// the caller.
    pub fn send_event_async(&mut self, message: &Message) -> ClientResult<PendingConfirmation> {
        let tracking_id = self.next_tracking_id;
        self.next_tracking_id += 1;

        let (tx, rx) = oneshot::channel();
        self.outbox.push_back((tracking_id, message.to_envelope()));
        self.pending.insert(tracking_id, tx);
        debug!(tracking_id, queued = self.outbox.len(), "event queued");

        Ok(PendingConfirmation::new(tracking_id, rx))
    }

    /// Drive the session once: open the transport if needed, flush queued
    /// events, and resolve every confirmation that is ready.
    ///
    /// Returns the confirmations resolved by this call.
    pub async fn do_work(&mut self) -> ClientResult<Vec<Confirmation>> {
        if self.state == SessionState::Idle {
            self.transport.open(&self.descriptor, &self.options).await?;
            self.state = SessionState::Open;
            info!(device_id = %self.descriptor.device_id, "session open");
        }

        while let Some((tracking_id, envelope)) = self.outbox.front() {
            if self.options.trace {
                trace!(
                    tracking_id = *tracking_id,
                    bytes = envelope.payload.len(),
                    properties = ?envelope.properties,
                    "submitting event"
                );
            }
            self.transport.submit(*tracking_id, envelope).await?;
            self.outbox.pop_front();
        }

        let mut resolved = Vec::new();
        for confirmation in self.transport.poll().await? {
            match self.pending.remove(&confirmation.tracking_id) {
                Some(tx) => {
                    // The caller may have dropped its PendingConfirmation.
                    let _ = tx.send(confirmation.result);
                    resolved.push(confirmation);
                }
                None => warn!(
                    tracking_id = confirmation.tracking_id,
                    "confirmation for an unknown message"
                ),
            }
        }
        Ok(resolved)
    }

    /// Close the session. Every confirmation still pending resolves to
    /// `BecauseDestroy` and is returned, ordered by tracking id.
    pub async fn destroy(mut self) -> ClientResult<Vec<Confirmation>> {
        let closed = if self.state == SessionState::Open {
            self.transport.close().await
        } else {
            Ok(())
        };

        let mut abandoned: Vec<Confirmation> = self
            .pending
            .drain()
            .map(|(tracking_id, tx)| {
                let _ = tx.send(ConfirmationResult::BecauseDestroy);
                Confirmation {
                    tracking_id,
                    result: ConfirmationResult::BecauseDestroy,
                }
            })
            .collect();
        abandoned.sort_by_key(|c| c.tracking_id);
        self.outbox.clear();

        if !abandoned.is_empty() {
            warn!(
                device_id = %self.descriptor.device_id,
                abandoned = abandoned.len(),
                "client destroyed with unconfirmed messages"
            );
        }
        debug!(device_id = %self.descriptor.device_id, "device client destroyed");

        closed?;
        Ok(abandoned)
    }
}

impl fmt::Debug for DeviceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceClient")
            .field("descriptor", &self.descriptor)
            .field("provider", &self.provider)
            .field("state", &self.state)
            .field("queued", &self.outbox.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}
