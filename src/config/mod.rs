mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    HubSettings, ProvisioningSettings, ProxySettings, Settings, SimulatorSettings,
    TelemetrySettings,
};

/// Loads the configuration from `config/default` and `DEVICELINK_*`
/// environment variables, merged over the default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    load_config_from("config/default")
}

/// Same as `load_config` with an explicit file path (extension optional).
///
/// Nested keys use a double underscore in the environment, e.g.
/// `DEVICELINK_TELEMETRY__MESSAGE_COUNT=10`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("DEVICELINK")
                .prefix_separator("_")
                .separator("__"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}

#[cfg(test)]
mod tests;
