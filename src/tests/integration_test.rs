use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::client::{ClientOptions, ConfirmationResult, DeviceClient, Message, TelemetryLoop};
use crate::hub::{Hub, serve};
use crate::persistence::EventStore;
use crate::platform::Platform;
use crate::provisioning::{ProvisioningClient, ProvisioningOption, RegistrationStatus};
use crate::transport::TransportProvider;
use crate::utils::error::ProvisioningError;

const SCOPE: &str = "0ne00003E26";

async fn start_simulator() -> (String, Arc<Mutex<Hub>>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = EventStore::new(dir.path().to_str().unwrap(), None, None).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    // The simulator assigns devices to itself.
    let hub = Arc::new(Mutex::new(Hub::new(store, &addr, SCOPE)));
    tokio::spawn(serve(listener, hub.clone()));
    (addr, hub, dir)
}

#[tokio::test]
async fn integration_provision_then_send_telemetry() {
    let (addr, hub, _dir) = start_simulator().await;
    let platform = Platform::init();
    let cancel = CancellationToken::new();

    let mut provisioning =
        ProvisioningClient::create(&platform, &addr, SCOPE, TransportProvider::MqttWebSockets)
            .unwrap();
    provisioning
        .set_option(ProvisioningOption::RegistrationId("e2e-device".to_string()))
        .unwrap();

    let mut handle = provisioning.register_device();
    let mut statuses = Vec::new();
    while let Some(status) = handle.next_status().await {
        statuses.push(status);
    }
    assert_eq!(
        statuses,
        vec![
            RegistrationStatus::Connected,
            RegistrationStatus::Registering,
            RegistrationStatus::Assigning,
            RegistrationStatus::Assigned,
        ]
    );
    let assignment = handle.wait(Duration::from_secs(5), &cancel).await.unwrap();
    assert_eq!(assignment.assigned_hub(), addr);
    assert_eq!(assignment.device_id(), "e2e-device");

    let mut client = DeviceClient::from_device_auth(
        &platform,
        &assignment,
        TransportProvider::MqttWebSockets,
        ClientOptions::default().with_trace(true),
    )
    .unwrap();

    let report = TelemetryLoop::new(3)
        .with_timeout(Duration::from_secs(5))
        .run(
            &mut client,
            |n| {
                let mut message = Message::from_text(&format!("Hello World {}!", n + 1));
                message
                    .set_message_id(format!("MSG_{n}"))
                    .set_content_type("application%2Fjson")
                    .set_content_encoding("utf-8");
                message
                    .set_property("property_key", "property_value")
                    .unwrap();
                message
            },
            &cancel,
        )
        .await
        .unwrap();

    assert_eq!(report.sent, 3);
    assert_eq!(report.confirmed, 3);
    assert!(report.is_success());
    assert!(client.destroy().await.unwrap().is_empty());
    assert!(platform.deinit().is_ok());

    let events = hub.lock().unwrap().events("e2e-device").unwrap();
    assert_eq!(events.len(), 3);
    let mut tracking_ids: Vec<_> = events.iter().map(|e| e.tracking_id).collect();
    tracking_ids.sort();
    assert_eq!(tracking_ids, vec![1, 2, 3]);
    for event in &events {
        let properties = &event.envelope.properties;
        assert_eq!(properties.content_type.as_deref(), Some("application%2Fjson"));
        assert_eq!(properties.content_encoding.as_deref(), Some("utf-8"));
        assert_eq!(
            properties.custom.get("property_key").map(String::as_str),
            Some("property_value")
        );
    }
    let first = events.iter().find(|e| e.tracking_id == 1).unwrap();
    assert_eq!(first.envelope.payload_text(), Some("Hello World 1!"));
    assert_eq!(first.envelope.properties.message_id.as_deref(), Some("MSG_0"));
}

#[tokio::test]
async fn integration_connection_string_session() {
    let (addr, hub, _dir) = start_simulator().await;
    let platform = Platform::init();

    let mut client = DeviceClient::from_connection_string(
        &platform,
        &format!("HostName={addr};DeviceId=cs-device;SharedAccessKey=c2FtcGxl"),
        TransportProvider::AmqpWebSockets,
        ClientOptions::default(),
    )
    .unwrap();

    let pending = client.send_event_async(&Message::from_text("ping")).unwrap();
    let mut resolved = Vec::new();
    for _ in 0..500 {
        resolved.extend(client.do_work().await.unwrap());
        if !resolved.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(resolved.len(), 1);
    assert_eq!(pending.await, ConfirmationResult::Ok);

    client.destroy().await.unwrap();
    assert_eq!(hub.lock().unwrap().events("cs-device").unwrap().len(), 1);
}

#[tokio::test]
async fn integration_registration_in_unknown_scope_is_unauthorized() {
    let (addr, _hub, _dir) = start_simulator().await;
    let platform = Platform::init();

    let mut provisioning =
        ProvisioningClient::create(&platform, &addr, "other-scope", TransportProvider::MqttWebSockets)
            .unwrap();
    provisioning
        .set_option(ProvisioningOption::RegistrationId("e2e-device".to_string()))
        .unwrap();

    let result = provisioning
        .register_device()
        .wait(Duration::from_secs(5), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ProvisioningError::Unauthorized(_))));
}
