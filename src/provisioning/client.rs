//! Provisioning client
//!
//! Created from a global endpoint, an ID scope and a transport selector.
//! `register_device` consumes the client and starts the registration on a
//! Tokio task, which must therefore run inside a Tokio runtime. The task
//! closes the provisioning transport once the outcome is known.

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::client::options::HttpProxy;
use crate::platform::{Platform, PlatformLease};
use crate::provisioning::{DeviceAssignment, RegistrationRequest, RegistrationStatus};
use crate::transport::{ProvisioningTransport, TransportProvider};
use crate::utils::error::{OptionError, ProvisioningError, TransportError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningOption {
    Trace(bool),
    HttpProxy(HttpProxy),
    /// Overrides the registration id the device would otherwise present.
    RegistrationId(String),
}

pub struct ProvisioningClient {
    global_endpoint: String,
    id_scope: String,
    provider: Option<TransportProvider>,
    registration_id: Option<String>,
    trace: bool,
    http_proxy: Option<HttpProxy>,
    transport: Box<dyn ProvisioningTransport>,
    lease: PlatformLease,
}

type RegistrationResult = Result<DeviceAssignment, ProvisioningError>;

impl ProvisioningClient {
    pub fn create(
        platform: &Platform,
        global_endpoint: &str,
        id_scope: &str,
        provider: TransportProvider,
    ) -> Result<Self, ProvisioningError> {
        let transport = platform.factory().provisioning_transport(provider)?;
        let mut client = Self::with_transport(platform, global_endpoint, id_scope, transport)?;
        client.provider = Some(provider);
        Ok(client)
    }

    pub fn with_transport(
        platform: &Platform,
        global_endpoint: &str,
        id_scope: &str,
        transport: Box<dyn ProvisioningTransport>,
    ) -> Result<Self, ProvisioningError> {
        if global_endpoint.trim().is_empty() {
            return Err(ProvisioningError::InvalidArgument(
                "global endpoint must not be empty".to_string(),
            ));
        }
        if id_scope.trim().is_empty() {
            return Err(ProvisioningError::InvalidArgument(
                "id scope must not be empty".to_string(),
            ));
        }
        Ok(Self {
            global_endpoint: global_endpoint.to_string(),
            id_scope: id_scope.to_string(),
            provider: None,
            registration_id: None,
            trace: false,
            http_proxy: None,
            transport,
            lease: platform.lease(),
        })
    }

    pub fn provider(&self) -> Option<TransportProvider> {
        self.provider
    }

    pub fn set_option(&mut self, option: ProvisioningOption) -> Result<(), ProvisioningError> {
        match option {
            ProvisioningOption::Trace(on) => self.trace = on,
            ProvisioningOption::HttpProxy(proxy) => {
                proxy.validate()?;
                self.http_proxy = Some(proxy);
            }
            ProvisioningOption::RegistrationId(id) => {
                let trimmed = id.trim();
                if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                    return Err(OptionError::InvalidRegistrationId(id).into());
                }
                self.registration_id = Some(trimmed.to_string());
            }
        }
        Ok(())
    }

    /// Start the one registration attempt this client is good for.
    pub fn register_device(self) -> RegistrationHandle {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel::<RegistrationResult>();

        let Self {
            global_endpoint,
            id_scope,
            registration_id,
            trace,
            http_proxy,
            mut transport,
            lease,
            ..
        } = self;

        let request = registration_id
            .map(|registration_id| RegistrationRequest {
                global_endpoint,
                id_scope,
                registration_id,
                trace,
                http_proxy,
            })
            .ok_or_else(|| {
                ProvisioningError::InvalidArgument("no registration id configured".to_string())
            });

        let task = tokio::spawn(async move {
            let outcome = match request {
                Ok(request) => {
                    info!(
                        registration_id = %request.registration_id,
                        id_scope = %request.id_scope,
                        "Registering device"
                    );
                    transport.register(&request, &status_tx).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = transport.close().await {
                debug!("provisioning transport close failed: {e}");
            }

            match &outcome {
                Ok(assignment) => {
                    let _ = status_tx.send(RegistrationStatus::Assigned);
                    info!(
                        "Registration information received from service: {}, deviceId: {}",
                        assignment.assigned_hub(),
                        assignment.device_id()
                    );
                }
                Err(e) => {
                    let _ = status_tx.send(RegistrationStatus::Error);
                    error!("Failure registering device: {e}");
                }
            }
            // Release the platform before the caller can observe the outcome.
            drop(lease);
            let _ = result_tx.send(outcome);
        });

        RegistrationHandle {
            status: status_rx,
            result: result_rx,
            task,
        }
    }
}

impl fmt::Debug for ProvisioningClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningClient")
            .field("global_endpoint", &self.global_endpoint)
            .field("id_scope", &self.id_scope)
            .field("provider", &self.provider)
            .field("registration_id", &self.registration_id)
            .field("trace", &self.trace)
            .field("http_proxy", &self.http_proxy)
            .finish()
    }
}

/// Tracks one in-flight registration. Dropping the handle aborts it.
#[derive(Debug)]
pub struct RegistrationHandle {
    status: UnboundedReceiver<RegistrationStatus>,
    result: oneshot::Receiver<RegistrationResult>,
    task: JoinHandle<()>,
}

impl RegistrationHandle {
    /// Next status update; `None` once the registration task has finished and
    /// every update was read.
    pub async fn next_status(&mut self) -> Option<RegistrationStatus> {
        self.status.recv().await
    }

    pub fn try_status(&mut self) -> Option<RegistrationStatus> {
        self.status.try_recv().ok()
    }

    /// Wait for the outcome, giving up after `timeout` or when `cancel` fires.
    pub async fn wait(
        mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DeviceAssignment, ProvisioningError> {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProvisioningError::Cancelled),
            waited = tokio::time::timeout(timeout, &mut self.result) => match waited {
                Err(_) => Err(ProvisioningError::Timeout(timeout)),
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(TransportError::Closed.into()),
            },
        };

        if matches!(
            outcome,
            Err(ProvisioningError::Timeout(_) | ProvisioningError::Cancelled)
        ) {
            self.task.abort();
        }
        outcome
    }
}

impl Drop for RegistrationHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
