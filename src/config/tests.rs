use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::Settings;
use super::{ProxySettings, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.hub.transport, "mqtt-ws");
    assert!(settings.hub.trace);
    assert!(settings.proxy.is_none());
    assert_eq!(settings.telemetry.message_count, 5);
    assert_eq!(settings.telemetry.payload, "test_message");
    assert_eq!(settings.telemetry.poll_interval_ms, 1);
    assert_eq!(settings.telemetry.timeout_secs, 30);
    assert_eq!(
        settings.provisioning.global_endpoint,
        "global.azure-devices-provisioning.net"
    );
    assert_eq!(settings.provisioning.messages, 2);
    assert_eq!(settings.simulator.bind_addr(), "127.0.0.1:8883");
    assert_eq!(settings.simulator.event_ttl_secs, Some(3600));
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("absent");

    let cfg = load_config_from(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.telemetry.message_count, 5);
    assert_eq!(cfg.simulator.port, 8883);
}

#[test]
#[serial]
fn test_file_overrides_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("default.toml");
    let toml = r#"
        [hub]
        connection_string = "HostName=hub.example;DeviceId=d1;x509=true"
        transport = "amqp-ws"

        [proxy]
        host = "proxy.local"
        port = 3128

        [telemetry]
        message_count = 12

        [simulator]
        port = 9100
        max_events_per_device = 10
    "#;
    fs::write(&path, toml).unwrap();

    let cfg = load_config_from(path.to_str().unwrap()).unwrap();
    assert_eq!(
        cfg.hub.connection_string,
        "HostName=hub.example;DeviceId=d1;x509=true"
    );
    assert_eq!(cfg.hub.transport, "amqp-ws");
    assert!(cfg.hub.trace);
    assert_eq!(
        cfg.proxy,
        Some(ProxySettings {
            host: "proxy.local".to_string(),
            port: 3128,
            username: None,
            password: None,
        })
    );
    assert_eq!(cfg.telemetry.message_count, 12);
    assert_eq!(cfg.telemetry.payload, "test_message");
    assert_eq!(cfg.simulator.port, 9100);
    assert_eq!(cfg.simulator.host, "127.0.0.1");
    assert_eq!(cfg.simulator.max_events_per_device, Some(10));
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("default.toml");
    fs::write(&path, "[telemetry]\nmessage_count = 12\n").unwrap();

    temp_env::with_vars(
        [
            ("DEVICELINK_TELEMETRY__MESSAGE_COUNT", Some("3")),
            ("DEVICELINK_PROVISIONING__REGISTRATION_ID", Some("env-device")),
        ],
        || {
            let cfg = load_config_from(path.to_str().unwrap()).unwrap();
            assert_eq!(cfg.telemetry.message_count, 3);
            assert_eq!(cfg.provisioning.registration_id, "env-device");
            assert_eq!(cfg.provisioning.id_scope, "0ne00003E26");
        },
    );
}
