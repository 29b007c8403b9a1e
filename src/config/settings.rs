use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Covers the device session, the optional proxy, the telemetry loop, the
/// provisioning flow and the local hub simulator.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub hub: HubSettings,
    pub proxy: Option<ProxySettings>,
    pub telemetry: TelemetrySettings,
    pub provisioning: ProvisioningSettings,
    pub simulator: SimulatorSettings,
}

/// How the device reaches its hub.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub connection_string: String,
    pub transport: String,
    pub trace: bool,
    pub trusted_certificate_path: Option<String>,
    pub x509_certificate_path: Option<String>,
    pub x509_private_key_path: Option<String>,
    pub x509_engine: Option<String>,
    pub x509_key_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    pub message_count: usize,
    pub payload: String,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvisioningSettings {
    pub global_endpoint: String,
    pub id_scope: String,
    pub registration_id: String,
    pub transport: String,
    pub timeout_secs: u64,
    /// Messages sent to the assigned hub once registration succeeds.
    pub messages: usize,
    pub trace: bool,
}

/// Local hub simulator.
///
/// `assigned_hub` is the endpoint handed to registering devices, so it should
/// point back at `host:port` for local runs.
#[derive(Debug, Deserialize, Clone)]
pub struct SimulatorSettings {
    pub host: String,
    pub port: u16,
    pub assigned_hub: String,
    pub id_scope: String,
    pub db_path: String,
    pub event_ttl_secs: Option<i64>,
    pub max_events_per_device: Option<usize>,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub hub: Option<PartialHubSettings>,
    pub proxy: Option<ProxySettings>,
    pub telemetry: Option<PartialTelemetrySettings>,
    pub provisioning: Option<PartialProvisioningSettings>,
    pub simulator: Option<PartialSimulatorSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialHubSettings {
    pub connection_string: Option<String>,
    pub transport: Option<String>,
    pub trace: Option<bool>,
    pub trusted_certificate_path: Option<String>,
    pub x509_certificate_path: Option<String>,
    pub x509_private_key_path: Option<String>,
    pub x509_engine: Option<String>,
    pub x509_key_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTelemetrySettings {
    pub message_count: Option<usize>,
    pub payload: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialProvisioningSettings {
    pub global_endpoint: Option<String>,
    pub id_scope: Option<String>,
    pub registration_id: Option<String>,
    pub transport: Option<String>,
    pub timeout_secs: Option<u64>,
    pub messages: Option<usize>,
    pub trace: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSimulatorSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub assigned_hub: Option<String>,
    pub id_scope: Option<String>,
    pub db_path: Option<String>,
    pub event_ttl_secs: Option<i64>,
    pub max_events_per_device: Option<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hub: HubSettings {
                connection_string:
                    "HostName=127.0.0.1:8883;DeviceId=sample-device;SharedAccessKey=c2FtcGxl"
                        .to_string(),
                transport: "mqtt-ws".to_string(),
                trace: true,
                trusted_certificate_path: None,
                x509_certificate_path: None,
                x509_private_key_path: None,
                x509_engine: None,
                x509_key_id: None,
            },
            proxy: None,
            telemetry: TelemetrySettings {
                message_count: 5,
                payload: "test_message".to_string(),
                poll_interval_ms: 1,
                timeout_secs: 30,
            },
            provisioning: ProvisioningSettings {
                global_endpoint: crate::provisioning::DEFAULT_GLOBAL_ENDPOINT.to_string(),
                id_scope: "0ne00003E26".to_string(),
                registration_id: "sample-registration".to_string(),
                transport: "mqtt-ws".to_string(),
                timeout_secs: 60,
                messages: 2,
                trace: true,
            },
            simulator: SimulatorSettings {
                host: "127.0.0.1".to_string(),
                port: 8883,
                assigned_hub: "127.0.0.1:8883".to_string(),
                id_scope: "0ne00003E26".to_string(),
                db_path: "devicelink_db".to_string(),
                event_ttl_secs: Some(3600),
                max_events_per_device: Some(1000),
            },
        }
    }
}

impl Settings {
    /// Fill every value missing from `partial` with the default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let hub = partial.hub.unwrap_or_default();
        let telemetry = partial.telemetry.unwrap_or_default();
        let provisioning = partial.provisioning.unwrap_or_default();
        let simulator = partial.simulator.unwrap_or_default();

        Self {
            hub: HubSettings {
                connection_string: hub
                    .connection_string
                    .unwrap_or(default.hub.connection_string),
                transport: hub.transport.unwrap_or(default.hub.transport),
                trace: hub.trace.unwrap_or(default.hub.trace),
                trusted_certificate_path: hub
                    .trusted_certificate_path
                    .or(default.hub.trusted_certificate_path),
                x509_certificate_path: hub
                    .x509_certificate_path
                    .or(default.hub.x509_certificate_path),
                x509_private_key_path: hub
                    .x509_private_key_path
                    .or(default.hub.x509_private_key_path),
                x509_engine: hub.x509_engine.or(default.hub.x509_engine),
                x509_key_id: hub.x509_key_id.or(default.hub.x509_key_id),
            },
            proxy: partial.proxy.or(default.proxy),
            telemetry: TelemetrySettings {
                message_count: telemetry
                    .message_count
                    .unwrap_or(default.telemetry.message_count),
                payload: telemetry.payload.unwrap_or(default.telemetry.payload),
                poll_interval_ms: telemetry
                    .poll_interval_ms
                    .unwrap_or(default.telemetry.poll_interval_ms),
                timeout_secs: telemetry
                    .timeout_secs
                    .unwrap_or(default.telemetry.timeout_secs),
            },
            provisioning: ProvisioningSettings {
                global_endpoint: provisioning
                    .global_endpoint
                    .unwrap_or(default.provisioning.global_endpoint),
                id_scope: provisioning
                    .id_scope
                    .unwrap_or(default.provisioning.id_scope),
                registration_id: provisioning
                    .registration_id
                    .unwrap_or(default.provisioning.registration_id),
                transport: provisioning
                    .transport
                    .unwrap_or(default.provisioning.transport),
                timeout_secs: provisioning
                    .timeout_secs
                    .unwrap_or(default.provisioning.timeout_secs),
                messages: provisioning
                    .messages
                    .unwrap_or(default.provisioning.messages),
                trace: provisioning.trace.unwrap_or(default.provisioning.trace),
            },
            simulator: SimulatorSettings {
                host: simulator.host.unwrap_or(default.simulator.host),
                port: simulator.port.unwrap_or(default.simulator.port),
                assigned_hub: simulator
                    .assigned_hub
                    .unwrap_or(default.simulator.assigned_hub),
                id_scope: simulator.id_scope.unwrap_or(default.simulator.id_scope),
                db_path: simulator.db_path.unwrap_or(default.simulator.db_path),
                event_ttl_secs: simulator
                    .event_ttl_secs
                    .or(default.simulator.event_ttl_secs),
                max_events_per_device: simulator
                    .max_events_per_device
                    .or(default.simulator.max_events_per_device),
            },
        }
    }
}

impl SimulatorSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
