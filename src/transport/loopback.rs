//! In-memory loopback transport.
//!
//! Every submitted event lands in a shared [`LoopbackInbox`] that tests (and
//! the `--dry-run` CLI mode) can inspect, and is confirmed after a
//! configurable number of polls with a configurable result. Provisioning is
//! answered from a scripted outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use crate::client::connection::ConnectionDescriptor;
use crate::client::message::{Confirmation, ConfirmationResult, EventEnvelope, TrackingId};
use crate::client::options::ClientOptions;
use crate::provisioning::{DeviceAssignment, RegistrationRequest, RegistrationStatus};
use crate::transport::message::FailureCode;
use crate::transport::{ProvisioningTransport, Transport, TransportFactory, TransportProvider};
use crate::utils::error::{ProvisioningError, TransportError, TransportResult};

/// An event as it arrived on the loopback "service" side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredEvent {
    pub device_id: String,
    pub tracking_id: TrackingId,
    pub envelope: EventEnvelope,
}

/// Shared view of everything delivered through loopback transports.
#[derive(Debug, Clone, Default)]
pub struct LoopbackInbox {
    events: Arc<Mutex<Vec<DeliveredEvent>>>,
}

impl LoopbackInbox {
    pub fn events(&self) -> Vec<DeliveredEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, event: DeliveredEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Polls an event waits before it is confirmed. Zero and one both confirm
    /// on the first poll after submission.
    pub confirm_after_polls: u32,
    pub result: ConfirmationResult,
    /// Never confirm anything, as a hub that stopped answering would.
    pub withhold_confirmations: bool,
    pub fail_open: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            confirm_after_polls: 1,
            result: ConfirmationResult::Ok,
            withhold_confirmations: false,
            fail_open: false,
        }
    }
}

#[derive(Debug)]
pub struct LoopbackTransport {
    config: LoopbackConfig,
    inbox: LoopbackInbox,
    device_id: Option<String>,
    in_flight: Vec<(TrackingId, u32)>,
    trace: bool,
}

impl LoopbackTransport {
    pub fn new(config: LoopbackConfig, inbox: LoopbackInbox) -> Self {
        Self {
            config,
            inbox,
            device_id: None,
            in_flight: Vec::new(),
            trace: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.device_id.is_some()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(
        &mut self,
        descriptor: &ConnectionDescriptor,
        options: &ClientOptions,
    ) -> TransportResult<()> {
        if self.config.fail_open {
            return Err(TransportError::Connect {
                endpoint: descriptor.endpoint().to_string(),
                reason: "loopback configured to refuse connections".to_string(),
            });
        }
        self.device_id = Some(descriptor.device_id.clone());
        self.trace = options.trace;
        debug!(device_id = %descriptor.device_id, "loopback transport open");
        Ok(())
    }

    async fn submit(
        &mut self,
        tracking_id: TrackingId,
        envelope: &EventEnvelope,
    ) -> TransportResult<()> {
        let device_id = self.device_id.clone().ok_or(TransportError::NotOpen)?;
        if self.trace {
            trace!(%device_id, tracking_id, "-> loopback event");
        }
        self.inbox.push(DeliveredEvent {
            device_id,
            tracking_id,
            envelope: envelope.clone(),
        });
        if !self.config.withhold_confirmations {
            self.in_flight
                .push((tracking_id, self.config.confirm_after_polls.max(1)));
        }
        Ok(())
    }

    async fn poll(&mut self) -> TransportResult<Vec<Confirmation>> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let result = self.config.result;
        let mut due = Vec::new();
        self.in_flight.retain_mut(|(tracking_id, remaining)| {
            *remaining -= 1;
            if *remaining == 0 {
                due.push(Confirmation {
                    tracking_id: *tracking_id,
                    result,
                });
                false
            } else {
                true
            }
        });
        Ok(due)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.device_id = None;
        self.in_flight.clear();
        Ok(())
    }
}

/// How the loopback provisioning service answers.
#[derive(Debug, Clone)]
pub enum ProvisioningScript {
    /// Assign `assigned_hub`; the device id is the registration id.
    Assign { assigned_hub: String },
    Fail { code: FailureCode, reason: String },
    /// Never answer.
    Hang,
}

impl Default for ProvisioningScript {
    fn default() -> Self {
        Self::Assign {
            assigned_hub: "loopback.local".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopbackProvisioning {
    script: ProvisioningScript,
    step_delay: Duration,
}

impl LoopbackProvisioning {
    pub fn new(script: ProvisioningScript) -> Self {
        Self {
            script,
            step_delay: Duration::ZERO,
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    async fn step(&self, status: &UnboundedSender<RegistrationStatus>, next: RegistrationStatus) {
        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        let _ = status.send(next);
    }
}

#[async_trait]
impl ProvisioningTransport for LoopbackProvisioning {
    async fn register(
        &mut self,
        request: &RegistrationRequest,
        status: &UnboundedSender<RegistrationStatus>,
    ) -> Result<DeviceAssignment, ProvisioningError> {
        self.step(status, RegistrationStatus::Connected).await;
        self.step(status, RegistrationStatus::Registering).await;

        match &self.script {
            ProvisioningScript::Assign { assigned_hub } => {
                self.step(status, RegistrationStatus::Assigning).await;
                DeviceAssignment::new(assigned_hub.clone(), request.registration_id.clone())
            }
            ProvisioningScript::Fail { code, reason } => Err(code.into_error(reason.clone())),
            ProvisioningScript::Hang => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

/// Factory handing out loopback transports that share one inbox.
#[derive(Debug, Clone, Default)]
pub struct LoopbackFactory {
    pub inbox: LoopbackInbox,
    pub config: LoopbackConfig,
    pub script: ProvisioningScript,
}

impl LoopbackFactory {
    pub fn new(config: LoopbackConfig, script: ProvisioningScript) -> Self {
        Self {
            inbox: LoopbackInbox::default(),
            config,
            script,
        }
    }
}

impl TransportFactory for LoopbackFactory {
    fn device_transport(&self, _provider: TransportProvider) -> TransportResult<Box<dyn Transport>> {
        Ok(Box::new(LoopbackTransport::new(
            self.config.clone(),
            self.inbox.clone(),
        )))
    }

    fn provisioning_transport(
        &self,
        _provider: TransportProvider,
    ) -> TransportResult<Box<dyn ProvisioningTransport>> {
        Ok(Box::new(LoopbackProvisioning::new(self.script.clone())))
    }
}
