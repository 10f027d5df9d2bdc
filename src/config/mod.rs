mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    LoggingSettings, MqttSettings, PartialSettings, ServerSettings, Settings, StoreSettings,
};

/// Default configuration file, relative to the working directory. The
/// extension is resolved by the `config` crate (`config/default.toml`, ...).
pub const DEFAULT_CONFIG_PATH: &str = "config/default";

/// Prefix of environment overrides, e.g. `MQTTDASH__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "MQTTDASH";

/// Loads `path` (optional) and environment overrides, then merges the result
/// over `Settings::default()`.
pub fn load_config_from(path: &str) -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("mqtt.topics"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(partial.merge(Settings::default()))
}
