//! Hub simulator server
//!
//! A minimal WebSocket server that plays both the hub and the provisioning
//! service for local runs and tests. Responsibilities:
//! - Accept TCP/WebSocket connections, one task per connection
//! - Use the first frame to pick the session: `hello` opens a telemetry
//!   session, `register` runs a provisioning exchange
//! - Store every `event` through the `Hub` and answer it with an `ack`
//! - Answer a `register` with status updates followed by `assigned` or
//!   `failed`
//!
//! There is no TLS and no authentication; the auth mode a device announces
//! is only logged.

use std::sync::{Arc, Mutex};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, info, warn};
use tungstenite::Utf8Bytes;
use tungstenite::protocol::Message as WsMessage;

use crate::client::message::ConfirmationResult;
use crate::hub::engine::{Hub, Refusal};
use crate::provisioning::RegistrationStatus;
use crate::transport::message::{DeviceFrame, FailureCode, ServiceFrame};
use crate::utils::error::TransportError;

type ServerSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type ServerSource = SplitStream<WebSocketStream<TcpStream>>;

pub async fn start_hub_server(addr: String, hub: Arc<Mutex<Hub>>) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Hub simulator listening on ws://{addr}");
    serve(listener, hub).await;
    Ok(())
}

/// Accept connections on an already bound listener until accepting fails.
pub async fn serve(listener: TcpListener, hub: Arc<Mutex<Hub>>) {
    while let Ok((stream, peer)) = listener.accept().await {
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, hub).await {
                warn!(%peer, "connection ended with error: {e}");
            }
            debug!(%peer, "connection closed");
        });
    }
}

async fn handle_connection(stream: TcpStream, hub: Arc<Mutex<Hub>>) -> Result<(), TransportError> {
    let ws_stream = accept_async(stream).await?;
    let (mut sink, mut source) = ws_stream.split();

    let Some(text) = next_text(&mut source).await? else {
        return Ok(());
    };

    match serde_json::from_str::<DeviceFrame>(&text) {
        Ok(DeviceFrame::Hello {
            device_id,
            auth,
            protocol,
            ..
        }) => {
            info!(%device_id, %auth, %protocol, "device connected");
            telemetry_session(&device_id, &mut sink, &mut source, &hub).await?;
            info!(%device_id, "device disconnected");
        }
        Ok(DeviceFrame::Register {
            id_scope,
            registration_id,
        }) => {
            provisioning_session(&id_scope, &registration_id, &mut sink, &hub).await?;
        }
        Ok(DeviceFrame::Event { .. }) => {
            send_frame(
                &mut sink,
                &ServiceFrame::Error {
                    message: "hello required before events".to_string(),
                },
            )
            .await?;
        }
        Err(e) => {
            warn!(
                "Invalid first frame: {e} | {}",
                text.chars().take(100).collect::<String>()
            );
            send_frame(
                &mut sink,
                &ServiceFrame::Error {
                    message: format!("invalid frame: {e}"),
                },
            )
            .await?;
        }
    }
    Ok(())
}

async fn telemetry_session(
    device_id: &str,
    sink: &mut ServerSink,
    source: &mut ServerSource,
    hub: &Arc<Mutex<Hub>>,
) -> Result<(), TransportError> {
    while let Some(text) = next_text(source).await? {
        match serde_json::from_str::<DeviceFrame>(&text) {
            Ok(DeviceFrame::Event {
                tracking_id,
                envelope,
            }) => {
                let result = match hub.lock() {
                    Ok(hub) => hub.accept_event(device_id, tracking_id, &envelope),
                    Err(_) => ConfirmationResult::Error,
                };
                send_frame(sink, &ServiceFrame::Ack {
                    tracking_id,
                    result,
                })
                .await?;
            }
            Ok(other) => {
                warn!(%device_id, "unexpected frame in telemetry session: {other:?}");
                send_frame(sink, &ServiceFrame::Error {
                    message: "unexpected frame".to_string(),
                })
                .await?;
            }
            Err(e) => {
                warn!(%device_id, "invalid frame: {e}");
                send_frame(sink, &ServiceFrame::Error {
                    message: format!("invalid frame: {e}"),
                })
                .await?;
            }
        }
    }
    Ok(())
}

async fn provisioning_session(
    id_scope: &str,
    registration_id: &str,
    sink: &mut ServerSink,
    hub: &Arc<Mutex<Hub>>,
) -> Result<(), TransportError> {
    send_frame(sink, &ServiceFrame::Status {
        status: RegistrationStatus::Registering,
    })
    .await?;

    let outcome = match hub.lock() {
        Ok(hub) => hub.register(id_scope, registration_id),
        Err(_) => Err(Refusal {
            code: FailureCode::Rejected,
            reason: "hub state unavailable".to_string(),
        }),
    };

    match outcome {
        Ok(assignment) => {
            send_frame(sink, &ServiceFrame::Status {
                status: RegistrationStatus::Assigning,
            })
            .await?;
            send_frame(sink, &ServiceFrame::Assigned {
                assigned_hub: assignment.assigned_hub().to_string(),
                device_id: assignment.device_id().to_string(),
            })
            .await?;
        }
        Err(refusal) => {
            send_frame(sink, &ServiceFrame::Failed {
                code: refusal.code,
                reason: refusal.reason,
            })
            .await?;
        }
    }

    let _ = sink.close().await;
    Ok(())
}

async fn next_text(source: &mut ServerSource) -> Result<Option<Utf8Bytes>, TransportError> {
    while let Some(message) = source.next().await {
        match message? {
            WsMessage::Text(text) => return Ok(Some(text)),
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

async fn send_frame(sink: &mut ServerSink, frame: &ServiceFrame) -> Result<(), TransportError> {
    let text = serde_json::to_string(frame)?;
    sink.send(WsMessage::text(text)).await?;
    Ok(())
}
