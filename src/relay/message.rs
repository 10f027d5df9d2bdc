use serde::{Deserialize, Serialize};

use crate::bridge::{ConnectionInfo, ConnectionState, ConnectionStatus, Message};

/// Events pushed to browser sessions. The push channel is one-way: browsers
/// never send anything the relay acts on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "connectionStatus")]
    ConnectionStatus {
        status: ConnectionState,
        info: Option<ConnectionInfo>,
    },

    #[serde(rename = "mqttMessage")]
    MqttMessage { message: Message },
}

impl ServerEvent {
    pub fn status(status: &ConnectionStatus) -> Self {
        ServerEvent::ConnectionStatus {
            status: status.status,
            info: status.info.clone(),
        }
    }

    pub fn message(message: &Message) -> Self {
        ServerEvent::MqttMessage {
            message: message.clone(),
        }
    }
}
