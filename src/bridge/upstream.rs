//! The bridge's view of the MQTT client.
//!
//! `Upstream` is the request side (subscribe, unsubscribe, publish,
//! disconnect). Requests are queued without waiting for the broker. One
//! `subscribe` call is one SUBSCRIBE packet, however many filters it carries,
//! so re-applying a large subscription set takes a handful of queue slots. The
//! response side arrives as rumqttc events, which are reduced to the few
//! `UpstreamEvent`s the bridge acts on.

use rumqttc::{AsyncClient, Event, Outgoing, Packet, QoS, SubscribeFilter, SubscribeReasonCode};

use crate::utils::error::SubscriptionError;

pub trait Upstream: Send {
    /// Queues one SUBSCRIBE for all of `patterns`, which must not be empty.
    fn subscribe(&self, patterns: &[String]) -> Result<(), SubscriptionError>;
    fn unsubscribe(&self, pattern: &str) -> Result<(), SubscriptionError>;
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SubscriptionError>;
    fn disconnect(&self) -> Result<(), SubscriptionError>;
}

impl Upstream for AsyncClient {
    fn subscribe(&self, patterns: &[String]) -> Result<(), SubscriptionError> {
        let filters = patterns
            .iter()
            .map(|pattern| SubscribeFilter::new(pattern.clone(), QoS::AtMostOnce));
        Ok(self.try_subscribe_many(filters)?)
    }

    fn unsubscribe(&self, pattern: &str) -> Result<(), SubscriptionError> {
        Ok(self.try_unsubscribe(pattern)?)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SubscriptionError> {
        Ok(self.try_publish(topic, QoS::AtMostOnce, retain, payload)?)
    }

    fn disconnect(&self) -> Result<(), SubscriptionError> {
        Ok(self.try_disconnect()?)
    }
}

/// Events the bridge reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// CONNACK received; the session is up.
    Connected,
    /// A PUBLISH arrived from the broker.
    Publish { topic: String, payload: Vec<u8> },
    /// The client put a SUBSCRIBE on the wire with this packet id.
    SubscribeSent { pkid: u16 },
    /// SUBACK for a SUBSCRIBE; `rejected` lists the indices of refused filters.
    SubscribeAcked { pkid: u16, rejected: Vec<usize> },
    /// The connection dropped or could not be (re)established.
    ConnectionLost { reason: String },
    /// The reconnect interval elapsed and the next attempt is starting.
    Reconnecting,
    /// Our own DISCONNECT went out.
    Closed,
}

impl UpstreamEvent {
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => Some(UpstreamEvent::Connected),
            Event::Incoming(Packet::Publish(publish)) => Some(UpstreamEvent::Publish {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            }),
            Event::Incoming(Packet::SubAck(ack)) => Some(UpstreamEvent::SubscribeAcked {
                pkid: ack.pkid,
                rejected: ack
                    .return_codes
                    .iter()
                    .enumerate()
                    .filter(|(_, code)| matches!(code, SubscribeReasonCode::Failure))
                    .map(|(idx, _)| idx)
                    .collect(),
            }),
            Event::Outgoing(Outgoing::Subscribe(pkid)) => {
                Some(UpstreamEvent::SubscribeSent { pkid: *pkid })
            }
            Event::Outgoing(Outgoing::Disconnect) => Some(UpstreamEvent::Closed),
            _ => None,
        }
    }
}
