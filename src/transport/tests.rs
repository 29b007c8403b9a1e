use std::time::Duration;

use tokio::net::TcpListener;

use crate::client::connection::ConnectionDescriptor;
use crate::client::message::{ConfirmationResult, Message};
use crate::client::options::{ClientOptions, HttpProxy};
use crate::transport::message::{DeviceFrame, FailureCode, ServiceFrame};
use crate::transport::{
    BridgeFactory, LoopbackConfig, LoopbackInbox, LoopbackTransport, Transport,
    TransportFactory, TransportProvider, WebSocketTransport,
};
use crate::utils::error::{ProvisioningError, TransportError};

fn descriptor() -> ConnectionDescriptor {
    "HostName=hub.local;DeviceId=dev-1;SharedAccessKey=a2V5"
        .parse()
        .unwrap()
}

#[test]
fn test_provider_parsing() {
    let cases = [
        ("mqtt", TransportProvider::Mqtt),
        ("MQTT_WS", TransportProvider::MqttWebSockets),
        ("mqtt-websockets", TransportProvider::MqttWebSockets),
        ("amqp", TransportProvider::Amqp),
        (" amqp-ws ", TransportProvider::AmqpWebSockets),
        ("http", TransportProvider::Http),
    ];
    for (text, expected) in cases {
        assert_eq!(text.parse::<TransportProvider>().unwrap(), expected);
    }
    assert!(matches!(
        "coap".parse::<TransportProvider>(),
        Err(TransportError::Unsupported(_))
    ));
}

#[test]
fn test_provider_display_round_trips() {
    for provider in [
        TransportProvider::Mqtt,
        TransportProvider::MqttWebSockets,
        TransportProvider::Amqp,
        TransportProvider::AmqpWebSockets,
        TransportProvider::Http,
    ] {
        assert_eq!(provider.to_string().parse::<TransportProvider>().unwrap(), provider);
    }
    assert!(TransportProvider::AmqpWebSockets.is_websocket());
    assert!(!TransportProvider::Http.is_websocket());
}

#[test]
fn test_bridge_factory_only_builds_websocket_transports() {
    let factory = BridgeFactory;
    assert!(factory.device_transport(TransportProvider::MqttWebSockets).is_ok());
    assert!(factory.provisioning_transport(TransportProvider::AmqpWebSockets).is_ok());
    for provider in [
        TransportProvider::Mqtt,
        TransportProvider::Amqp,
        TransportProvider::Http,
    ] {
        assert!(matches!(
            factory.device_transport(provider),
            Err(TransportError::Unsupported(_))
        ));
        assert!(matches!(
            factory.provisioning_transport(provider),
            Err(TransportError::Unsupported(_))
        ));
    }
}

#[tokio::test]
async fn test_loopback_requires_open() {
    let mut transport = LoopbackTransport::new(LoopbackConfig::default(), LoopbackInbox::default());
    let envelope = Message::from_text("x").to_envelope();

    assert!(matches!(
        transport.submit(1, &envelope).await,
        Err(TransportError::NotOpen)
    ));
    assert!(matches!(transport.poll().await, Err(TransportError::NotOpen)));
}

#[tokio::test]
async fn test_loopback_confirms_after_configured_polls() {
    let inbox = LoopbackInbox::default();
    let config = LoopbackConfig {
        confirm_after_polls: 2,
        result: ConfirmationResult::MessageTimeout,
        ..LoopbackConfig::default()
    };
    let mut transport = LoopbackTransport::new(config, inbox.clone());
    transport
        .open(&descriptor(), &ClientOptions::default())
        .await
        .unwrap();
    assert!(transport.is_open());

    transport
        .submit(1, &Message::from_text("a").to_envelope())
        .await
        .unwrap();
    transport
        .submit(2, &Message::from_text("b").to_envelope())
        .await
        .unwrap();
    assert_eq!(inbox.len(), 2);

    assert!(transport.poll().await.unwrap().is_empty());
    let confirmations = transport.poll().await.unwrap();
    let ids: Vec<_> = confirmations.iter().map(|c| c.tracking_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(
        confirmations
            .iter()
            .all(|c| c.result == ConfirmationResult::MessageTimeout)
    );
    assert!(transport.poll().await.unwrap().is_empty());

    transport.close().await.unwrap();
    assert!(!transport.is_open());
}

#[tokio::test]
async fn test_websocket_open_reports_unreachable_endpoint() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let descriptor: ConnectionDescriptor =
        format!("HostName={addr};DeviceId=dev-1;SharedAccessKey=a2V5")
            .parse()
            .unwrap();
    let mut transport = WebSocketTransport::new(TransportProvider::MqttWebSockets);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        transport.open(&descriptor, &ClientOptions::default()),
    )
    .await
    .unwrap();
    assert!(matches!(result, Err(TransportError::Connect { .. })));
    assert!(matches!(transport.poll().await, Err(TransportError::NotOpen)));
}

#[tokio::test]
async fn test_websocket_open_rejects_proxy() {
    let mut transport = WebSocketTransport::new(TransportProvider::MqttWebSockets);
    let options = ClientOptions::default().with_http_proxy(HttpProxy::new("proxy.local", 3128));
    assert!(matches!(
        transport.open(&descriptor(), &options).await,
        Err(TransportError::Unsupported(_))
    ));
}

#[test]
fn test_frames_use_type_tags() {
    let hello = DeviceFrame::Hello {
        device_id: "dev-1".to_string(),
        module_id: None,
        auth: "sas".to_string(),
        protocol: "mqtt-ws".to_string(),
    };
    let value = serde_json::to_value(&hello).unwrap();
    assert_eq!(value["type"], "hello");
    assert_eq!(value["device_id"], "dev-1");

    let ack: ServiceFrame =
        serde_json::from_str(r#"{"type":"ack","tracking_id":4,"result":"because_destroy"}"#)
            .unwrap();
    assert_eq!(
        ack,
        ServiceFrame::Ack {
            tracking_id: 4,
            result: ConfirmationResult::BecauseDestroy
        }
    );

    let failed: ServiceFrame =
        serde_json::from_str(r#"{"type":"failed","code":"hub_not_specified","reason":"none"}"#)
            .unwrap();
    assert_eq!(
        failed,
        ServiceFrame::Failed {
            code: FailureCode::HubNotSpecified,
            reason: "none".to_string()
        }
    );
}

#[test]
fn test_failure_codes_map_to_errors() {
    assert!(matches!(
        FailureCode::Unauthorized.into_error("no".to_string()),
        ProvisioningError::Unauthorized(_)
    ));
    assert!(matches!(
        FailureCode::Disabled.into_error("off".to_string()),
        ProvisioningError::Disabled(_)
    ));
    assert!(matches!(
        FailureCode::HubNotSpecified.into_error(String::new()),
        ProvisioningError::HubNotSpecified
    ));
    assert!(matches!(
        FailureCode::Rejected.into_error("bad".to_string()),
        ProvisioningError::Rejected(_)
    ));
}
