use std::time::Duration;

use serde::Deserialize;

use crate::bridge::{BridgeOptions, ConnectRequest};

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub mqtt: MqttSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// Address the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Upstream broker settings.
///
/// When `url` is set the service connects on startup and subscribes `topics`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MqttSettings {
    pub url: Option<String>,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub secure: bool,
    pub topics: Vec<String>,
    pub keep_alive_secs: u64,
    pub reconnect_interval_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StoreSettings {
    pub max_messages: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

impl MqttSettings {
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// The startup connection, if a broker URL is configured.
    pub fn connect_request(&self) -> Option<ConnectRequest> {
        let url = self.url.as_deref()?.trim();
        if url.is_empty() {
            return None;
        }

        let mut request = ConnectRequest::new(url, self.port).secure(self.secure);
        if let Some(username) = &self.username {
            request = request.with_credentials(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            );
        }
        if let Some(client_id) = &self.client_id {
            request = request.with_client_id(client_id.clone());
        }
        Some(request)
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub mqtt: Option<PartialMqttSettings>,
    pub store: Option<PartialStoreSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialMqttSettings {
    pub url: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub secure: Option<bool>,
    pub topics: Option<Vec<String>>,
    pub keep_alive_secs: Option<u64>,
    pub reconnect_interval_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialStoreSettings {
    pub max_messages: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let mqtt = self.mqtt.unwrap_or_default();
        let store = self.store.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(defaults.server.host),
                port: server.port.unwrap_or(defaults.server.port),
            },
            mqtt: MqttSettings {
                url: mqtt.url.or(defaults.mqtt.url),
                port: mqtt.port.unwrap_or(defaults.mqtt.port),
                username: mqtt.username.or(defaults.mqtt.username),
                password: mqtt.password.or(defaults.mqtt.password),
                client_id: mqtt.client_id.or(defaults.mqtt.client_id),
                secure: mqtt.secure.unwrap_or(defaults.mqtt.secure),
                topics: mqtt.topics.unwrap_or(defaults.mqtt.topics),
                keep_alive_secs: mqtt.keep_alive_secs.unwrap_or(defaults.mqtt.keep_alive_secs),
                reconnect_interval_secs: mqtt
                    .reconnect_interval_secs
                    .unwrap_or(defaults.mqtt.reconnect_interval_secs),
                connect_timeout_secs: mqtt
                    .connect_timeout_secs
                    .unwrap_or(defaults.mqtt.connect_timeout_secs),
            },
            store: StoreSettings {
                max_messages: store.max_messages.unwrap_or(defaults.store.max_messages),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(defaults.logging.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        let bridge = BridgeOptions::default();
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            mqtt: MqttSettings {
                url: None,
                port: 8083,
                username: None,
                password: None,
                client_id: None,
                secure: false,
                topics: Vec::new(),
                keep_alive_secs: bridge.keep_alive.as_secs(),
                reconnect_interval_secs: bridge.reconnect_interval.as_secs(),
                connect_timeout_secs: bridge.connect_timeout.as_secs(),
            },
            store: StoreSettings {
                max_messages: crate::persistence::MemoryStore::DEFAULT_MAX_MESSAGES,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
