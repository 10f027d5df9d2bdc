//! Connection parameters and observable connection state.

use std::time::Duration;

use rumqttc::{MqttOptions, Transport};
use serde::{Deserialize, Serialize};

use crate::utils::error::ConnectionError;

/// Lifecycle of the upstream broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Metadata of the current (or last attempted) connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Normalised broker URL, scheme and port included.
    pub url: String,
    pub port: u16,
    pub client_id: String,
    pub secure: bool,
}

/// State plus metadata, as reported to observers and browser sessions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub status: ConnectionState,
    pub info: Option<ConnectionInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Everything `Bridge::connect` needs to reach a broker.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: String,
    pub port: u16,
    pub credentials: Option<Credentials>,
    pub client_id: Option<String>,
    pub secure: bool,
}

impl ConnectRequest {
    pub fn new(url: impl Into<String>, port: u16) -> Self {
        Self {
            url: url.into(),
            port,
            credentials: None,
            client_id: None,
            secure: false,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Resolves the normalised URL and the client id that will be used.
    pub fn connection_info(&self) -> Result<ConnectionInfo, ConnectionError> {
        let url = normalize_broker_url(&self.url, self.port, self.secure)?;
        let client_id = match self.client_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => generate_client_id(),
        };

        Ok(ConnectionInfo {
            url,
            port: self.port,
            client_id,
            secure: self.secure,
        })
    }

    /// Builds the rumqttc options for this request.
    pub fn mqtt_options(&self, info: &ConnectionInfo, options: &BridgeOptions) -> MqttOptions {
        // The websocket transport reads host, port and path from the URL itself.
        let mut mqtt = MqttOptions::new(info.client_id.clone(), info.url.clone(), info.port);
        mqtt.set_transport(if info.secure {
            Transport::wss_with_default_config()
        } else {
            Transport::Ws
        });
        mqtt.set_keep_alive(options.keep_alive);
        mqtt.set_clean_session(true);

        if let Some(credentials) = &self.credentials {
            mqtt.set_credentials(credentials.username.clone(), credentials.password.clone());
        }

        mqtt
    }
}

/// Tunables shared by every connection the bridge makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    pub keep_alive: Duration,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(60),
            reconnect_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

const DEFAULT_WS_PATH: &str = "/mqtt";

/// Strips whatever scheme `url` carries and rebuilds it as
/// `ws://host:port/path` (or `wss://` when `secure`).
///
/// A port already present in `url` is replaced by `port`. Without a path the
/// conventional `/mqtt` endpoint is used.
pub fn normalize_broker_url(url: &str, port: u16, secure: bool) -> Result<String, ConnectionError> {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };

    let (authority, path) = match without_scheme.find('/') {
        Some(idx) => without_scheme.split_at(idx),
        None => (without_scheme, ""),
    };

    let host = match authority.rsplit_once(':') {
        Some((host, maybe_port)) if maybe_port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    };

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(ConnectionError::InvalidAddress(url.to_string()));
    }

    let path = match path.trim_end_matches('/') {
        "" => DEFAULT_WS_PATH,
        p => p,
    };
    let scheme = if secure { "wss" } else { "ws" };

    Ok(format!("{scheme}://{host}:{port}{path}"))
}

fn generate_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("mqttdash-{}", &id[..8])
}
