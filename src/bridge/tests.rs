use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::{
    AsyncClient, Event, MqttOptions, Outgoing, Packet, Publish, QoS, SubAck, SubscribeReasonCode,
};
use serde_json::json;

use super::connection::normalize_broker_url;
use super::engine::{Bridge, lock_bridge};
use super::listener::BridgeListener;
use super::message::{Message, Payload};
use super::subscriptions::{SUBSCRIBE_BATCH_BYTES, Subscriptions, batches};
use super::upstream::{Upstream, UpstreamEvent};
use super::{BridgeOptions, ConnectRequest, ConnectionInfo, ConnectionState, ConnectionStatus};
use crate::persistence::{MemoryStore, MessageStore, RetentionWindow};
use crate::utils::error::{
    BridgeError, ConnectionError, DeliveryError, StoreError, SubscriptionError,
};

#[derive(Clone, Default)]
struct RecordingUpstream {
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingUpstream {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) -> Result<(), SubscriptionError> {
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl Upstream for RecordingUpstream {
    fn subscribe(&self, patterns: &[String]) -> Result<(), SubscriptionError> {
        self.record(format!("sub {}", patterns.join(" ")))
    }

    fn unsubscribe(&self, pattern: &str) -> Result<(), SubscriptionError> {
        self.record(format!("unsub {pattern}"))
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SubscriptionError> {
        let payload = String::from_utf8(payload).unwrap();
        self.record(format!("pub {topic} {payload} {retain}"))
    }

    fn disconnect(&self) -> Result<(), SubscriptionError> {
        self.record("disconnect".to_string())
    }
}

struct FailingUpstream;

impl Upstream for FailingUpstream {
    fn subscribe(&self, _patterns: &[String]) -> Result<(), SubscriptionError> {
        Err(SubscriptionError::Client("request queue full".to_string()))
    }

    fn unsubscribe(&self, _pattern: &str) -> Result<(), SubscriptionError> {
        Err(SubscriptionError::Client("request queue full".to_string()))
    }

    fn publish(&self, _topic: &str, _payload: Vec<u8>, _retain: bool) -> Result<(), SubscriptionError> {
        Err(SubscriptionError::Client("request queue full".to_string()))
    }

    fn disconnect(&self) -> Result<(), SubscriptionError> {
        Ok(())
    }
}

#[derive(Default)]
struct CollectingListener {
    messages: Mutex<Vec<Message>>,
    statuses: Mutex<Vec<ConnectionState>>,
}

impl BridgeListener for CollectingListener {
    fn on_message(&self, message: &Message) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn on_status(&self, status: &ConnectionStatus) -> Result<(), DeliveryError> {
        self.statuses.lock().unwrap().push(status.status);
        Ok(())
    }
}

struct FailingListener;

impl BridgeListener for FailingListener {
    fn on_message(&self, _message: &Message) -> Result<(), DeliveryError> {
        Err(DeliveryError::Listener("chart widget gone".to_string()))
    }
}

struct PanickingListener;

impl BridgeListener for PanickingListener {
    fn on_message(&self, _message: &Message) -> Result<(), DeliveryError> {
        panic!("listener blew up");
    }
}

struct FailingStore;

impl MessageStore for FailingStore {
    fn append(&mut self, _message: Message) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    fn query(&self, _topic: &str, _window: RetentionWindow) -> Vec<Message> {
        Vec::new()
    }

    fn query_matching(&self, _pattern: &str, _window: RetentionWindow) -> Vec<Message> {
        Vec::new()
    }

    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    fn len(&self) -> usize {
        0
    }
}

fn test_info() -> ConnectionInfo {
    ConnectionInfo {
        url: "ws://localhost:8083/mqtt".to_string(),
        port: 8083,
        client_id: "test-client".to_string(),
        secure: false,
    }
}

fn connected_bridge() -> (Bridge, RecordingUpstream) {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    let upstream = RecordingUpstream::default();
    bridge.attach(Box::new(upstream.clone()), test_info());
    bridge.handle_event(UpstreamEvent::Connected);
    (bridge, upstream)
}

fn publish(topic: &str, payload: &str) -> UpstreamEvent {
    UpstreamEvent::Publish {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
    }
}

#[test]
fn test_new_bridge_is_disconnected() {
    let bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    assert!(!bridge.is_connected());
    assert_eq!(bridge.connection_status(), ConnectionStatus::default());
    assert!(bridge.subscriptions().is_empty());
}

#[test]
fn test_subscribe_without_connection_fails() {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());

    let result = bridge.subscribe("sensor/#");
    assert!(matches!(
        result,
        Err(BridgeError::Subscription(SubscriptionError::NotConnected))
    ));
    assert!(bridge.subscriptions().is_empty());

    assert!(matches!(
        bridge.unsubscribe("sensor/#"),
        Err(BridgeError::Subscription(SubscriptionError::NotConnected))
    ));
    assert!(matches!(
        bridge.publish("sensor/a", &Payload::from("on"), false),
        Err(BridgeError::Subscription(SubscriptionError::NotConnected))
    ));
}

#[test]
fn test_subscribe_while_connecting_fails() {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    bridge.attach(Box::new(RecordingUpstream::default()), test_info());

    assert_eq!(bridge.connection_status().status, ConnectionState::Connecting);
    assert!(bridge.subscribe("sensor/#").is_err());
}

#[test]
fn test_subscribe_is_idempotent() {
    let (mut bridge, upstream) = connected_bridge();

    bridge.subscribe("sensor/+/temp").unwrap();
    bridge.subscribe("sensor/+/temp").unwrap();

    assert_eq!(bridge.subscriptions(), vec!["sensor/+/temp".to_string()]);
    assert_eq!(upstream.calls(), vec!["sub sensor/+/temp".to_string()]);
}

#[test]
fn test_unsubscribe_removes_pattern() {
    let (mut bridge, upstream) = connected_bridge();

    bridge.subscribe("a").unwrap();
    bridge.subscribe("b").unwrap();
    bridge.unsubscribe("a").unwrap();

    assert_eq!(bridge.subscriptions(), vec!["b".to_string()]);
    assert_eq!(upstream.calls().last().unwrap(), "unsub a");
}

#[test]
fn test_client_failure_is_reported_and_not_recorded() {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    bridge.attach(Box::new(FailingUpstream), test_info());
    bridge.handle_event(UpstreamEvent::Connected);

    let result = bridge.subscribe("sensor/#");
    assert!(matches!(
        result,
        Err(BridgeError::Subscription(SubscriptionError::Client(_)))
    ));
    assert!(bridge.subscriptions().is_empty());
}

#[test]
fn test_reconnect_resubscribes_all_patterns() {
    let (mut bridge, upstream) = connected_bridge();
    for pattern in ["sensor/#", "power/+/watts", "door"] {
        bridge.subscribe(pattern).unwrap();
    }

    bridge.handle_event(UpstreamEvent::ConnectionLost {
        reason: "connection reset".to_string(),
    });
    assert!(!bridge.is_connected());
    upstream.clear();

    bridge.handle_event(UpstreamEvent::Reconnecting);
    bridge.handle_event(UpstreamEvent::Connected);

    // one request carries the whole set
    assert_eq!(
        upstream.calls(),
        vec!["sub door power/+/watts sensor/#".to_string()]
    );
    assert_eq!(bridge.subscriptions().len(), 3);
    assert!(bridge.is_connected());
}

#[test]
fn test_suback_rejection_removes_pattern() {
    let (mut bridge, _upstream) = connected_bridge();
    bridge.subscribe("allowed/#").unwrap();
    bridge.subscribe("forbidden/#").unwrap();

    bridge.handle_event(UpstreamEvent::SubscribeSent { pkid: 1 });
    bridge.handle_event(UpstreamEvent::SubscribeSent { pkid: 2 });
    bridge.handle_event(UpstreamEvent::SubscribeAcked {
        pkid: 1,
        rejected: vec![],
    });
    bridge.handle_event(UpstreamEvent::SubscribeAcked {
        pkid: 2,
        rejected: vec![0],
    });

    assert_eq!(bridge.subscriptions(), vec!["allowed/#".to_string()]);
}

#[test]
fn test_fan_out_isolates_failing_listeners() {
    let (mut bridge, _upstream) = connected_bridge();
    let first = Arc::new(CollectingListener::default());
    let last = Arc::new(CollectingListener::default());

    bridge.register_listener(first.clone());
    bridge.register_listener(Arc::new(FailingListener));
    bridge.register_listener(last.clone());

    bridge.handle_event(publish("sensor/room1/temp", "21.5"));

    assert_eq!(first.messages.lock().unwrap().len(), 1);
    assert_eq!(last.messages.lock().unwrap().len(), 1);
    assert_eq!(bridge.retained(), 1);
}

#[test]
fn test_fan_out_survives_panicking_listener() {
    let (mut bridge, _upstream) = connected_bridge();
    let first = Arc::new(CollectingListener::default());
    let last = Arc::new(CollectingListener::default());

    bridge.register_listener(first.clone());
    bridge.register_listener(Arc::new(PanickingListener));
    bridge.register_listener(last.clone());

    bridge.handle_event(publish("sensor/room1/temp", "21.5"));

    assert_eq!(first.messages.lock().unwrap().len(), 1);
    assert_eq!(last.messages.lock().unwrap().len(), 1);
    assert_eq!(bridge.history("sensor/room1/temp", RetentionWindow::OneHour).len(), 1);
}

#[test]
fn test_store_failure_does_not_stop_delivery() {
    let mut bridge = Bridge::new(BridgeOptions::default(), FailingStore);
    let listener = Arc::new(CollectingListener::default());
    bridge.register_listener(listener.clone());

    bridge.handle_event(publish("t", "1"));

    assert_eq!(listener.messages.lock().unwrap().len(), 1);
    assert_eq!(bridge.retained(), 0);
}

#[test]
fn test_payload_decoding_falls_back_to_text() {
    let (mut bridge, _upstream) = connected_bridge();
    let listener = Arc::new(CollectingListener::default());
    bridge.register_listener(listener.clone());

    bridge.handle_event(publish("t", "42"));
    bridge.handle_event(publish("t", "not json"));
    bridge.handle_event(publish("t", r#"{"temp": 21.5}"#));

    let messages = listener.messages.lock().unwrap();
    assert_eq!(messages[0].payload, Payload::Json(json!(42)));
    assert_eq!(messages[1].payload, Payload::Text("not json".to_string()));
    assert_eq!(messages[2].payload, Payload::Json(json!({"temp": 21.5})));
}

#[test]
fn test_listeners_receive_in_registration_order() {
    struct Tagged(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl BridgeListener for Tagged {
        fn on_message(&self, _message: &Message) -> Result<(), DeliveryError> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    let (mut bridge, _upstream) = connected_bridge();
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["one", "two", "three"] {
        bridge.register_listener(Arc::new(Tagged(tag, order.clone())));
    }

    bridge.handle_event(publish("t", "1"));
    assert_eq!(*order.lock().unwrap(), vec!["one", "two", "three"]);
}

#[test]
fn test_removed_listener_gets_nothing() {
    let (mut bridge, _upstream) = connected_bridge();
    let listener = Arc::new(CollectingListener::default());
    let id = bridge.register_listener(listener.clone());

    assert!(bridge.remove_listener(id));
    assert!(!bridge.remove_listener(id));
    bridge.handle_event(publish("t", "1"));

    assert!(listener.messages.lock().unwrap().is_empty());
}

#[test]
fn test_status_transitions_are_broadcast() {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    let listener = Arc::new(CollectingListener::default());
    bridge.register_listener(listener.clone());

    bridge.attach(Box::new(RecordingUpstream::default()), test_info());
    bridge.handle_event(UpstreamEvent::Connected);
    bridge.handle_event(UpstreamEvent::Connected);
    bridge.handle_event(UpstreamEvent::ConnectionLost {
        reason: "keep alive timeout".to_string(),
    });
    bridge.handle_event(UpstreamEvent::Reconnecting);

    assert_eq!(
        *listener.statuses.lock().unwrap(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
        ]
    );
    assert_eq!(bridge.connection_status().info, Some(test_info()));
}

#[test]
fn test_events_from_stale_connection_are_ignored() {
    let mut bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new());
    let old = bridge.attach(Box::new(RecordingUpstream::default()), test_info());
    let new = bridge.attach(Box::new(RecordingUpstream::default()), test_info());

    assert!(!bridge.handle_upstream(old, publish("t", "1")));
    assert_eq!(bridge.retained(), 0);

    assert!(bridge.handle_upstream(new, publish("t", "2")));
    assert_eq!(bridge.retained(), 1);
}

#[test]
fn test_publish_sends_encoded_payload() {
    let (bridge, upstream) = connected_bridge();

    bridge
        .publish("lamp/set", &Payload::Json(json!({"on": true})), true)
        .unwrap();
    bridge.publish("lamp/name", &Payload::from("desk"), false).unwrap();

    assert_eq!(
        upstream.calls(),
        vec![
            r#"pub lamp/set {"on":true} true"#.to_string(),
            "pub lamp/name desk false".to_string(),
        ]
    );
}

#[test]
fn test_history_queries_the_store() {
    let (mut bridge, _upstream) = connected_bridge();
    bridge.handle_event(publish("sensor/a/temp", "1"));
    bridge.handle_event(publish("sensor/b/temp", "2"));
    bridge.handle_event(publish("sensor/a/temp", "3"));

    assert_eq!(bridge.history("sensor/a/temp", RetentionWindow::OneHour).len(), 2);
    assert_eq!(
        bridge
            .history_matching("sensor/+/temp", RetentionWindow::OneHour)
            .len(),
        3
    );
    assert_eq!(
        bridge.topics(),
        vec!["sensor/a/temp".to_string(), "sensor/b/temp".to_string()]
    );
}

#[test]
fn test_subscriptions_track_acks() {
    let mut subs = Subscriptions::new();
    assert!(subs.insert("a"));
    assert!(!subs.insert("a"));
    subs.requested(vec!["a".to_string()]);
    subs.sent(7);

    assert!(subs.acknowledged(8, &[0]).is_empty());
    assert_eq!(subs.acknowledged(7, &[0]), vec!["a".to_string()]);
    assert!(subs.is_empty());

    subs.insert("b");
    subs.requested(vec!["b".to_string()]);
    subs.reset_pending();
    subs.sent(1);
    assert!(subs.acknowledged(1, &[0]).is_empty());
    assert!(subs.contains("b"));
}

#[test]
fn test_suback_codes_line_up_with_filters() {
    let mut subs = Subscriptions::new();
    let batch: Vec<String> = ["a/#", "b/#", "c/#"].iter().map(|p| p.to_string()).collect();
    for pattern in &batch {
        subs.insert(pattern);
    }
    subs.requested(batch);
    subs.sent(3);

    assert_eq!(subs.acknowledged(3, &[1, 2, 9]), vec!["b/#".to_string(), "c/#".to_string()]);
    assert_eq!(subs.patterns(), vec!["a/#".to_string()]);
}

#[test]
fn test_queued_subscribe_survives_connection_loss() {
    let (mut bridge, upstream) = connected_bridge();

    bridge.subscribe("allowed/#").unwrap();
    bridge.handle_event(UpstreamEvent::SubscribeSent { pkid: 1 });
    bridge.handle_event(UpstreamEvent::SubscribeAcked {
        pkid: 1,
        rejected: vec![],
    });

    // still sitting in the client's queue when the connection drops
    bridge.subscribe("forbidden/#").unwrap();
    bridge.handle_event(UpstreamEvent::ConnectionLost {
        reason: "connection reset".to_string(),
    });
    bridge.handle_event(UpstreamEvent::Reconnecting);
    bridge.handle_event(UpstreamEvent::Connected);
    assert_eq!(
        upstream.calls().last().unwrap(),
        "sub allowed/# forbidden/#"
    );

    // the client replays the queued request before the re-subscribe
    bridge.handle_event(UpstreamEvent::SubscribeSent { pkid: 2 });
    bridge.handle_event(UpstreamEvent::SubscribeSent { pkid: 3 });
    bridge.handle_event(UpstreamEvent::SubscribeAcked {
        pkid: 2,
        rejected: vec![0],
    });
    bridge.handle_event(UpstreamEvent::SubscribeAcked {
        pkid: 3,
        rejected: vec![1],
    });

    assert_eq!(bridge.subscriptions(), vec!["allowed/#".to_string()]);
}

#[test]
fn test_subscribe_all_packs_new_patterns() {
    let (mut bridge, upstream) = connected_bridge();
    bridge.subscribe("a").unwrap();
    upstream.clear();

    let patterns: Vec<String> = ["a", "b", "c", "b"].iter().map(|p| p.to_string()).collect();
    assert_eq!(bridge.subscribe_all(&patterns).unwrap(), 2);
    assert_eq!(upstream.calls(), vec!["sub b c".to_string()]);

    assert_eq!(bridge.subscribe_all(&patterns).unwrap(), 0);
    assert_eq!(upstream.calls().len(), 1);
}

#[test]
fn test_large_batches_stay_under_packet_limit() {
    let patterns: Vec<String> = (0..400)
        .map(|i| format!("building/floor-{i:03}/room/+/temperature"))
        .collect();

    let groups = batches(&patterns);

    assert!(groups.len() > 1);
    for group in &groups {
        let bytes: usize = group.iter().map(|p| p.len() + 3).sum();
        assert!(bytes <= SUBSCRIBE_BATCH_BYTES);
    }
    assert_eq!(groups.concat(), patterns);
}

/// Counts how many patterns actually made it into the client's queue.
struct QueueCounter {
    client: AsyncClient,
    queued: Arc<AtomicUsize>,
}

impl Upstream for QueueCounter {
    fn subscribe(&self, patterns: &[String]) -> Result<(), SubscriptionError> {
        Upstream::subscribe(&self.client, patterns)?;
        self.queued.fetch_add(patterns.len(), Ordering::SeqCst);
        Ok(())
    }

    fn unsubscribe(&self, pattern: &str) -> Result<(), SubscriptionError> {
        Upstream::unsubscribe(&self.client, pattern)
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<(), SubscriptionError> {
        Upstream::publish(&self.client, topic, payload, retain)
    }

    fn disconnect(&self) -> Result<(), SubscriptionError> {
        Upstream::disconnect(&self.client)
    }
}

#[test]
fn test_reconnect_resubscribes_more_patterns_than_queue_slots() {
    let (mut bridge, _upstream) = connected_bridge();
    for i in 0..150 {
        bridge.subscribe(&format!("sensor/{i}/#")).unwrap();
    }

    // a real client whose request queue nobody drains
    let options = MqttOptions::new("test-client", "ws://localhost:8083/mqtt", 8083);
    let (client, _eventloop) = AsyncClient::new(options, 100);
    let queued = Arc::new(AtomicUsize::new(0));
    bridge.attach(
        Box::new(QueueCounter {
            client,
            queued: queued.clone(),
        }),
        test_info(),
    );
    bridge.handle_event(UpstreamEvent::Connected);

    assert_eq!(bridge.subscriptions().len(), 150);
    assert_eq!(queued.load(Ordering::SeqCst), 150);
}

#[test]
fn test_upstream_event_from_rumqttc() {
    let publish = Event::Incoming(Packet::Publish(Publish::new(
        "sensor/a",
        QoS::AtMostOnce,
        "42",
    )));
    assert_eq!(
        UpstreamEvent::from_event(&publish),
        Some(UpstreamEvent::Publish {
            topic: "sensor/a".to_string(),
            payload: b"42".to_vec(),
        })
    );

    let rejected = Event::Incoming(Packet::SubAck(SubAck::new(
        4,
        vec![SubscribeReasonCode::Failure],
    )));
    assert_eq!(
        UpstreamEvent::from_event(&rejected),
        Some(UpstreamEvent::SubscribeAcked {
            pkid: 4,
            rejected: vec![0]
        })
    );

    let mixed = Event::Incoming(Packet::SubAck(SubAck::new(
        5,
        vec![
            SubscribeReasonCode::Success(QoS::AtMostOnce),
            SubscribeReasonCode::Failure,
            SubscribeReasonCode::Success(QoS::AtMostOnce),
        ],
    )));
    assert_eq!(
        UpstreamEvent::from_event(&mixed),
        Some(UpstreamEvent::SubscribeAcked {
            pkid: 5,
            rejected: vec![1]
        })
    );

    assert_eq!(
        UpstreamEvent::from_event(&Event::Outgoing(Outgoing::Subscribe(9))),
        Some(UpstreamEvent::SubscribeSent { pkid: 9 })
    );
    assert_eq!(
        UpstreamEvent::from_event(&Event::Outgoing(Outgoing::PingReq)),
        None
    );
}

#[test]
fn test_normalize_broker_url() {
    assert_eq!(
        normalize_broker_url("mqtt://broker.local", 8083, false).unwrap(),
        "ws://broker.local:8083/mqtt"
    );
    assert_eq!(
        normalize_broker_url("wss://broker.local:9001/ws/", 8884, true).unwrap(),
        "wss://broker.local:8884/ws"
    );
    assert_eq!(
        normalize_broker_url("  broker.local ", 1884, true).unwrap(),
        "wss://broker.local:1884/mqtt"
    );
    assert_eq!(
        normalize_broker_url("ws://[::1]:8083", 8083, false).unwrap(),
        "ws://[::1]:8083/mqtt"
    );
    assert!(normalize_broker_url("", 8083, false).is_err());
    assert!(normalize_broker_url("ws://", 8083, false).is_err());
}

#[test]
fn test_connection_info_generates_client_id() {
    let info = ConnectRequest::new("broker.local", 8083)
        .connection_info()
        .unwrap();
    assert!(info.client_id.starts_with("mqttdash-"));
    assert_eq!(info.client_id.len(), "mqttdash-".len() + 8);
    assert!(!info.secure);

    let info = ConnectRequest::new("broker.local", 8884)
        .with_client_id("dashboard-1")
        .with_credentials("user", "secret")
        .secure(true)
        .connection_info()
        .unwrap();
    assert_eq!(info.client_id, "dashboard-1");
    assert_eq!(info.url, "wss://broker.local:8884/mqtt");
}

#[test]
fn test_connection_status_wire_format() {
    let status = ConnectionStatus {
        status: ConnectionState::Connected,
        info: Some(test_info()),
    };
    assert_eq!(
        serde_json::to_value(&status).unwrap(),
        json!({
            "status": "connected",
            "info": {
                "url": "ws://localhost:8083/mqtt",
                "port": 8083,
                "clientId": "test-client",
                "secure": false
            }
        })
    );
    assert_eq!(
        serde_json::to_value(ConnectionStatus::default()).unwrap(),
        json!({ "status": "disconnected", "info": null })
    );
}

#[tokio::test]
async fn test_disconnect_when_idle_is_noop() {
    let bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new()).into_shared();

    Bridge::disconnect(&bridge).await;
    Bridge::disconnect(&bridge).await;

    let bridge = lock_bridge(&bridge);
    assert_eq!(bridge.connection_status().status, ConnectionState::Disconnected);
    assert!(!bridge.is_connected());
}

#[tokio::test]
async fn test_disconnect_closes_link() {
    let bridge = Bridge::new(BridgeOptions::default(), MemoryStore::new()).into_shared();
    let upstream = RecordingUpstream::default();
    {
        let mut b = lock_bridge(&bridge);
        b.attach(Box::new(upstream.clone()), test_info());
        b.handle_event(UpstreamEvent::Connected);
        b.subscribe("sensor/#").unwrap();
    }

    Bridge::disconnect(&bridge).await;

    assert_eq!(upstream.calls().last().unwrap(), "disconnect");
    let b = lock_bridge(&bridge);
    assert!(!b.is_connected());
    assert_eq!(b.connection_status().status, ConnectionState::Disconnected);
    // kept for the next connect
    assert_eq!(b.subscriptions(), vec!["sensor/#".to_string()]);
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let options = BridgeOptions {
        connect_timeout: Duration::from_secs(5),
        ..BridgeOptions::default()
    };
    let bridge = Bridge::new(options, MemoryStore::new()).into_shared();

    let result = Bridge::connect(&bridge, ConnectRequest::new("127.0.0.1", port)).await;

    assert!(matches!(result, Err(BridgeError::Connection(_))));
    let b = lock_bridge(&bridge);
    assert_eq!(b.connection_status().status, ConnectionState::Error);
    assert!(!b.is_connected());
    assert_eq!(
        b.connection_status().info.unwrap().url,
        format!("ws://127.0.0.1:{port}/mqtt")
    );
}

#[tokio::test]
async fn test_connect_times_out_when_broker_never_answers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // accept the socket but never complete the handshake
    let silent = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        drop(socket);
    });

    let options = BridgeOptions {
        connect_timeout: Duration::from_secs(1),
        ..BridgeOptions::default()
    };
    let bridge = Bridge::new(options, MemoryStore::new()).into_shared();

    let result = Bridge::connect(&bridge, ConnectRequest::new("127.0.0.1", port)).await;

    assert!(matches!(
        result,
        Err(BridgeError::Connection(ConnectionError::Timeout { secs: 1, .. }))
    ));
    let b = lock_bridge(&bridge);
    assert_eq!(b.connection_status().status, ConnectionState::Error);
    assert!(!b.is_connected());
    assert!(!b.has_link());
    drop(b);
    silent.abort();
}
