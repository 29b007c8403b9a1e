use std::sync::Arc;

use crate::client::{ClientOptions, DeviceClient};
use crate::platform::Platform;
use crate::transport::{LoopbackConfig, LoopbackFactory, ProvisioningScript, TransportProvider};
use crate::utils::error::PlatformError;

const CONNECTION_STRING: &str = "HostName=hub.local;DeviceId=dev-1;SharedAccessKey=a2V5";

fn loopback_platform() -> Platform {
    Platform::with_factory(Arc::new(LoopbackFactory::new(
        LoopbackConfig::default(),
        ProvisioningScript::default(),
    )))
}

#[test]
fn test_deinit_without_clients() {
    let platform = Platform::init();
    assert_eq!(platform.live_handles(), 0);
    assert!(platform.deinit().is_ok());
}

#[test]
fn test_version_matches_package() {
    assert_eq!(Platform::version(), env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_live_handles_follow_clients() {
    let platform = loopback_platform();
    let first = DeviceClient::from_connection_string(
        &platform,
        CONNECTION_STRING,
        TransportProvider::Mqtt,
        ClientOptions::default(),
    )
    .unwrap();
    let second = DeviceClient::from_connection_string(
        &platform,
        CONNECTION_STRING,
        TransportProvider::Amqp,
        ClientOptions::default(),
    )
    .unwrap();
    assert_eq!(platform.live_handles(), 2);

    first.destroy().await.unwrap();
    assert_eq!(platform.live_handles(), 1);
    second.destroy().await.unwrap();
    assert_eq!(platform.live_handles(), 0);

    assert!(platform.deinit().is_ok());
}

#[test]
fn test_deinit_while_client_alive_is_busy() {
    let platform = loopback_platform();
    let _client = DeviceClient::from_connection_string(
        &platform,
        CONNECTION_STRING,
        TransportProvider::Http,
        ClientOptions::default(),
    )
    .unwrap();

    match platform.deinit() {
        Err(PlatformError::Busy { live }) => assert_eq!(live, 1),
        other => panic!("expected Busy, got {other:?}"),
    }
}

#[test]
fn test_failed_construction_does_not_hold_a_lease() {
    let platform = Platform::init();
    let result = DeviceClient::from_connection_string(
        &platform,
        CONNECTION_STRING,
        TransportProvider::Mqtt,
        ClientOptions::default(),
    );
    assert!(result.is_err());
    assert_eq!(platform.live_handles(), 0);
}
