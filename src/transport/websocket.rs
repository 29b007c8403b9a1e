//! WebSocket bridge
//!
//! Carries device and provisioning traffic as JSON frames over a websocket,
//! the same frames the local hub simulator understands. Responsibilities:
//! - Open the connection and announce the device with a `hello` frame
//! - Forward queued events as `event` frames
//! - Read `ack` frames on a background task and hand them to `poll` through
//!   an unbounded channel, so polling never waits on the socket
//! - Run the `register` exchange for provisioning
//!
//! Only plain `ws://` endpoints without a proxy are supported.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::client::connection::ConnectionDescriptor;
use crate::client::message::{Confirmation, EventEnvelope, TrackingId};
use crate::client::options::ClientOptions;
use crate::provisioning::{DeviceAssignment, RegistrationRequest, RegistrationStatus};
use crate::transport::message::{DeviceFrame, ServiceFrame};
use crate::transport::{ProvisioningTransport, Transport, TransportProvider};
use crate::utils::error::{ProvisioningError, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    provider: TransportProvider,
    sink: Option<SplitSink<WsStream, WsMessage>>,
    acks: Option<UnboundedReceiver<Confirmation>>,
    reader: Option<JoinHandle<()>>,
    trace: bool,
}

impl WebSocketTransport {
    pub fn new(provider: TransportProvider) -> Self {
        Self {
            provider,
            sink: None,
            acks: None,
            reader: None,
            trace: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(
        &mut self,
        descriptor: &ConnectionDescriptor,
        options: &ClientOptions,
    ) -> TransportResult<()> {
        if self.sink.is_some() {
            return Ok(());
        }
        if options.http_proxy.is_some() {
            return Err(TransportError::Unsupported(format!(
                "http proxy over {}",
                self.provider
            )));
        }

        let url = endpoint_url(descriptor.endpoint());
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;
        let (mut sink, stream) = ws_stream.split();

        let hello = DeviceFrame::Hello {
            device_id: descriptor.device_id.clone(),
            module_id: descriptor.module_id.clone(),
            auth: descriptor.auth.as_str().to_string(),
            protocol: self.provider.to_string(),
        };
        sink.send(WsMessage::text(serde_json::to_string(&hello)?))
            .await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.trace = options.trace;
        self.reader = Some(tokio::spawn(read_acks(
            stream,
            tx,
            descriptor.device_id.clone(),
            options.trace,
        )));
        self.sink = Some(sink);
        self.acks = Some(rx);
        debug!(endpoint = %url, device_id = %descriptor.device_id, "websocket transport open");
        Ok(())
    }

    async fn submit(
        &mut self,
        tracking_id: TrackingId,
        envelope: &EventEnvelope,
    ) -> TransportResult<()> {
        let sink = self.sink.as_mut().ok_or(TransportError::NotOpen)?;
        let frame = DeviceFrame::Event {
            tracking_id,
            envelope: envelope.clone(),
        };
        let text = serde_json::to_string(&frame)?;
        if self.trace {
            trace!(frame = %text, "-> event");
        }
        sink.send(WsMessage::text(text)).await?;
        Ok(())
    }

    async fn poll(&mut self) -> TransportResult<Vec<Confirmation>> {
        let acks = self.acks.as_mut().ok_or(TransportError::NotOpen)?;
        let mut confirmations = Vec::new();
        loop {
            match acks.try_recv() {
                Ok(confirmation) => confirmations.push(confirmation),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if confirmations.is_empty() {
                        return Err(TransportError::Closed);
                    }
                    break;
                }
            }
        }
        Ok(confirmations)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.acks = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut sink) = self.sink.take() {
            sink.close().await?;
        }
        Ok(())
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn read_acks(
    mut stream: futures_util::stream::SplitStream<WsStream>,
    tx: UnboundedSender<Confirmation>,
    device_id: String,
    trace_frames: bool,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(%device_id, "websocket read failed: {e}");
                break;
            }
        };
        if trace_frames {
            trace!(frame = %text.as_str(), "<- frame");
        }

        match serde_json::from_str::<ServiceFrame>(&text) {
            Ok(ServiceFrame::Ack {
                tracking_id,
                result,
            }) => {
                if tx.send(Confirmation { tracking_id, result }).is_err() {
                    break;
                }
            }
            Ok(ServiceFrame::Error { message }) => {
                warn!(%device_id, "hub reported an error: {message}");
            }
            Ok(other) => {
                warn!(%device_id, "unexpected frame on a device session: {other:?}");
            }
            Err(e) => {
                warn!(%device_id, "invalid frame from hub: {e}");
            }
        }
    }
    debug!(%device_id, "ack reader closed");
}

#[derive(Debug, Clone)]
pub struct WebSocketProvisioning {
    provider: TransportProvider,
}

impl WebSocketProvisioning {
    pub fn new(provider: TransportProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ProvisioningTransport for WebSocketProvisioning {
    async fn register(
        &mut self,
        request: &RegistrationRequest,
        status: &UnboundedSender<RegistrationStatus>,
    ) -> Result<DeviceAssignment, ProvisioningError> {
        if request.http_proxy.is_some() {
            return Err(TransportError::Unsupported(format!("http proxy over {}", self.provider)).into());
        }

        let url = endpoint_url(&request.global_endpoint);
        let (mut ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: url.clone(),
                reason: e.to_string(),
            })?;
        let _ = status.send(RegistrationStatus::Connected);

        let register = DeviceFrame::Register {
            id_scope: request.id_scope.clone(),
            registration_id: request.registration_id.clone(),
        };
        ws_stream
            .send(WsMessage::text(
                serde_json::to_string(&register).map_err(TransportError::from)?,
            ))
            .await
            .map_err(TransportError::from)?;

        while let Some(frame) = ws_stream.next().await {
            let text = match frame.map_err(TransportError::from)? {
                WsMessage::Text(text) => text,
                WsMessage::Close(_) => break,
                _ => continue,
            };
            if request.trace {
                trace!(frame = %text.as_str(), "<- provisioning frame");
            }

            let frame: ServiceFrame = serde_json::from_str(&text)
                .map_err(|e| ProvisioningError::Parsing(e.to_string()))?;
            match frame {
                ServiceFrame::Status { status: progress } => {
                    if matches!(
                        progress,
                        RegistrationStatus::Registering | RegistrationStatus::Assigning
                    ) {
                        let _ = status.send(progress);
                    }
                }
                ServiceFrame::Assigned {
                    assigned_hub,
                    device_id,
                } => {
                    let _ = ws_stream.close(None).await;
                    return DeviceAssignment::new(assigned_hub, device_id);
                }
                ServiceFrame::Failed { code, reason } => {
                    let _ = ws_stream.close(None).await;
                    return Err(code.into_error(reason));
                }
                ServiceFrame::Error { message } => {
                    return Err(ProvisioningError::Rejected(message));
                }
                ServiceFrame::Ack { .. } => {
                    return Err(TransportError::Protocol(
                        "ack received during registration".to_string(),
                    )
                    .into());
                }
            }
        }

        Err(TransportError::Closed.into())
    }

    async fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

fn endpoint_url(endpoint: &str) -> String {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    }
}
