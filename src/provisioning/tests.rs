use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::options::HttpProxy;
use crate::platform::Platform;
use crate::provisioning::{
    DeviceAssignment, ProvisioningClient, ProvisioningOption, RegistrationStatus,
};
use crate::transport::message::FailureCode;
use crate::transport::{
    LoopbackConfig, LoopbackFactory, LoopbackProvisioning, ProvisioningScript, TransportProvider,
};
use crate::utils::error::{OptionError, ProvisioningError, TransportError};

const ENDPOINT: &str = "global.example.net";
const SCOPE: &str = "0ne00003E26";

fn scripted_client(platform: &Platform, script: ProvisioningScript) -> ProvisioningClient {
    let mut client = ProvisioningClient::with_transport(
        platform,
        ENDPOINT,
        SCOPE,
        Box::new(LoopbackProvisioning::new(script)),
    )
    .unwrap();
    client
        .set_option(ProvisioningOption::RegistrationId("sensor-1".to_string()))
        .unwrap();
    client
}

#[test]
fn test_assignment_requires_both_fields() {
    assert!(matches!(
        DeviceAssignment::new("", "dev"),
        Err(ProvisioningError::Parsing(_))
    ));
    assert!(matches!(
        DeviceAssignment::new("hub", " "),
        Err(ProvisioningError::Parsing(_))
    ));
    let assignment = DeviceAssignment::new("hub", "dev").unwrap();
    assert_eq!(assignment.assigned_hub(), "hub");
    assert_eq!(assignment.device_id(), "dev");
}

#[test]
fn test_deserialized_assignment_is_validated() {
    let empty = serde_json::from_str::<DeviceAssignment>(r#"{"assigned_hub":"","device_id":""}"#);
    assert!(empty.is_err());

    let blank_device =
        serde_json::from_str::<DeviceAssignment>(r#"{"assigned_hub":"hub","device_id":"  "}"#);
    assert!(blank_device.is_err());

    let assignment: DeviceAssignment =
        serde_json::from_str(r#"{"assigned_hub":"hub","device_id":"dev"}"#).unwrap();
    assert_eq!(assignment, DeviceAssignment::new("hub", "dev").unwrap());
    assert_eq!(
        serde_json::to_value(&assignment).unwrap(),
        serde_json::json!({"assigned_hub": "hub", "device_id": "dev"})
    );
}

#[test]
fn test_create_requires_endpoint_and_scope() {
    let platform = Platform::init();
    assert!(matches!(
        ProvisioningClient::create(&platform, "", SCOPE, TransportProvider::MqttWebSockets),
        Err(ProvisioningError::InvalidArgument(_))
    ));
    assert!(matches!(
        ProvisioningClient::create(&platform, ENDPOINT, " ", TransportProvider::MqttWebSockets),
        Err(ProvisioningError::InvalidArgument(_))
    ));
    assert!(matches!(
        ProvisioningClient::create(&platform, ENDPOINT, SCOPE, TransportProvider::Http),
        Err(ProvisioningError::Transport(TransportError::Unsupported(_)))
    ));
    assert_eq!(platform.live_handles(), 0);
}

#[test]
fn test_set_option_validation() {
    let platform = Platform::init();
    let mut client =
        ProvisioningClient::create(&platform, ENDPOINT, SCOPE, TransportProvider::AmqpWebSockets)
            .unwrap();
    assert_eq!(client.provider(), Some(TransportProvider::AmqpWebSockets));

    assert!(matches!(
        client.set_option(ProvisioningOption::RegistrationId("two words".to_string())),
        Err(ProvisioningError::InvalidOption(
            OptionError::InvalidRegistrationId(_)
        ))
    ));
    assert!(matches!(
        client.set_option(ProvisioningOption::HttpProxy(HttpProxy::new("proxy", 0))),
        Err(ProvisioningError::InvalidOption(OptionError::InvalidProxy(_)))
    ));
    assert!(client.set_option(ProvisioningOption::Trace(true)).is_ok());
}

#[tokio::test]
async fn test_successful_registration_reports_every_status() {
    let platform = Platform::init();
    let client = scripted_client(
        &platform,
        ProvisioningScript::Assign {
            assigned_hub: "assigned.hub".to_string(),
        },
    );
    assert_eq!(platform.live_handles(), 1);

    let mut handle = client.register_device();
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

    let assignment = handle
        .wait(Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(assignment.assigned_hub(), "assigned.hub");
    assert_eq!(assignment.device_id(), "sensor-1");
    assert!(platform.deinit().is_ok());
}

#[tokio::test]
async fn test_failed_registration_maps_failure_code() {
    let platform = Platform::init();
    let client = scripted_client(
        &platform,
        ProvisioningScript::Fail {
            code: FailureCode::Disabled,
            reason: "enrollment disabled".to_string(),
        },
    );

    let mut handle = client.register_device();
    let mut last = None;
    while let Some(status) = handle.next_status().await {
        last = Some(status);
    }
    assert_eq!(last, Some(RegistrationStatus::Error));

    let result = handle
        .wait(Duration::from_secs(1), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ProvisioningError::Disabled(reason)) if reason == "enrollment disabled"));
}

#[tokio::test]
async fn test_missing_registration_id_fails_the_attempt() {
    let platform = Platform::init();
    let client = ProvisioningClient::with_transport(
        &platform,
        ENDPOINT,
        SCOPE,
        Box::new(LoopbackProvisioning::new(ProvisioningScript::default())),
    )
    .unwrap();

    let result = client
        .register_device()
        .wait(Duration::from_secs(1), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ProvisioningError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_wait_times_out_when_service_never_answers() {
    let platform = Platform::init();
    let client = scripted_client(&platform, ProvisioningScript::Hang);

    let result = client
        .register_device()
        .wait(Duration::from_millis(50), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(ProvisioningError::Timeout(_))));
}

#[tokio::test]
async fn test_wait_stops_on_cancel() {
    let platform = Platform::init();
    let client = scripted_client(&platform, ProvisioningScript::Hang);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = client
        .register_device()
        .wait(Duration::from_secs(5), &cancel)
        .await;
    assert!(matches!(result, Err(ProvisioningError::Cancelled)));
}

#[tokio::test]
async fn test_create_uses_platform_factory() {
    let factory = Arc::new(LoopbackFactory::new(
        LoopbackConfig::default(),
        ProvisioningScript::Assign {
            assigned_hub: "factory.hub".to_string(),
        },
    ));
    let platform = Platform::with_factory(factory);
    let mut client =
        ProvisioningClient::create(&platform, ENDPOINT, SCOPE, TransportProvider::Mqtt).unwrap();
    client
        .set_option(ProvisioningOption::RegistrationId("sensor-2".to_string()))
        .unwrap();

    let mut handle = client.register_device();
    // Statuses are optional to read; the result is delivered regardless.
    assert!(handle.next_status().await.is_some());
    let assignment = handle
        .wait(Duration::from_secs(1), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(assignment.assigned_hub(), "factory.hub");
    assert_eq!(assignment.device_id(), "sensor-2");
}
