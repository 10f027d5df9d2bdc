//! Bridge engine
//!
//! The bridge owns the single upstream broker connection together with the
//! state that must survive it:
//! - the active subscription set, re-applied on every (re)connect
//! - the message store every received message is appended to
//! - the listener registry decoded messages and status changes fan out to
//!
//! Concurrency and usage notes:
//! - Everything except `connect`/`disconnect` is synchronous and designed to be
//!   called with the bridge behind a lock (`SharedBridge`). Nothing here holds
//!   the lock across an `.await`.
//! - One background task per connection polls the rumqttc event loop and hands
//!   each event to the bridge under the lock, so store and subscription
//!   mutations happen one at a time.
//! - Each connection gets a generation number. Events from a connection that
//!   has since been closed or replaced are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connection::{
    BridgeOptions, ConnectRequest, ConnectionInfo, ConnectionState, ConnectionStatus,
};
use super::listener::{BridgeListener, ListenerId, ListenerRegistry};
use super::message::{Message, Payload};
use super::subscriptions::{Subscriptions, batches};
use super::upstream::{Upstream, UpstreamEvent};
use crate::persistence::{MessageStore, RetentionWindow};
use crate::utils::error::{BridgeError, ConnectionError, SubscriptionError};

pub type SharedBridge = Arc<Mutex<Bridge>>;

/// Locks the bridge, recovering the guard if a previous holder panicked.
pub fn lock_bridge(bridge: &SharedBridge) -> MutexGuard<'_, Bridge> {
    bridge.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How long `disconnect` waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Request channel capacity of the rumqttc client.
const REQUEST_CAPACITY: usize = 100;

struct Link {
    generation: u64,
    upstream: Box<dyn Upstream>,
    task: Option<JoinHandle<()>>,
}

pub struct Bridge {
    options: BridgeOptions,
    store: Box<dyn MessageStore>,
    listeners: ListenerRegistry,
    subscriptions: Subscriptions,
    status: ConnectionStatus,
    link: Option<Link>,
    generation: u64,
}

impl Bridge {
    pub fn new(options: BridgeOptions, store: impl MessageStore + 'static) -> Self {
        Self {
            options,
            store: Box::new(store),
            listeners: ListenerRegistry::new(),
            subscriptions: Subscriptions::new(),
            status: ConnectionStatus::default(),
            link: None,
            generation: 0,
        }
    }

    pub fn into_shared(self) -> SharedBridge {
        Arc::new(Mutex::new(self))
    }

    pub fn register_listener(&mut self, listener: Arc<dyn BridgeListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some() && self.status.status == ConnectionState::Connected
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.clone()
    }

    /// Currently active subscription patterns, in no particular order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.patterns()
    }

    /// Subscribes `pattern` upstream. The pattern is recorded as active right
    /// away; a later broker rejection removes it again.
    pub fn subscribe(&mut self, pattern: &str) -> Result<(), BridgeError> {
        self.subscribe_all(&[pattern.to_string()]).map(|_| ())
    }

    /// Subscribes every pattern not already active, packing them into as few
    /// SUBSCRIBE requests as possible. Returns how many were newly subscribed.
    pub fn subscribe_all(&mut self, patterns: &[String]) -> Result<usize, BridgeError> {
        let upstream = match self.link.as_ref() {
            Some(link) if self.status.status == ConnectionState::Connected => &link.upstream,
            _ => {
                warn!("Cannot subscribe to {}: not connected", patterns.join(", "));
                return Err(SubscriptionError::NotConnected.into());
            }
        };

        let mut fresh: Vec<String> = Vec::new();
        for pattern in patterns {
            if self.subscriptions.contains(pattern) || fresh.contains(pattern) {
                debug!("Already subscribed to {pattern}");
            } else {
                fresh.push(pattern.clone());
            }
        }

        let mut subscribed = 0;
        for batch in batches(&fresh) {
            if let Err(e) = upstream.subscribe(&batch) {
                error!("Failed to subscribe to {}: {e}", batch.join(", "));
                return Err(e.into());
            }
            for pattern in &batch {
                self.subscriptions.insert(pattern);
                info!("Subscribed to {pattern}");
            }
            subscribed += batch.len();
            self.subscriptions.requested(batch);
        }
        Ok(subscribed)
    }

    pub fn unsubscribe(&mut self, pattern: &str) -> Result<(), BridgeError> {
        let upstream = match self.link.as_ref() {
            Some(link) if self.status.status == ConnectionState::Connected => &link.upstream,
            _ => {
                warn!("Cannot unsubscribe from {pattern}: not connected");
                return Err(SubscriptionError::NotConnected.into());
            }
        };

        if let Err(e) = upstream.unsubscribe(pattern) {
            error!("Failed to unsubscribe from {pattern}: {e}");
            return Err(e.into());
        }

        self.subscriptions.remove(pattern);
        info!("Unsubscribed from {pattern}");
        Ok(())
    }

    /// Publishes at QoS 0 without waiting for the broker.
    pub fn publish(&self, topic: &str, payload: &Payload, retain: bool) -> Result<(), BridgeError> {
        let upstream = match self.link.as_ref() {
            Some(link) if self.status.status == ConnectionState::Connected => &link.upstream,
            _ => {
                warn!("Cannot publish to {topic}: not connected");
                return Err(SubscriptionError::NotConnected.into());
            }
        };

        upstream.publish(topic, payload.to_bytes(), retain).inspect_err(|e| {
            error!("Failed to publish to {topic}: {e}");
        })?;
        Ok(())
    }

    pub fn history(&self, topic: &str, window: RetentionWindow) -> Vec<Message> {
        self.store.query(topic, window)
    }

    pub fn history_matching(&self, pattern: &str, window: RetentionWindow) -> Vec<Message> {
        self.store.query_matching(pattern, window)
    }

    pub fn topics(&self) -> Vec<String> {
        self.store.topics()
    }

    pub fn retained(&self) -> usize {
        self.store.len()
    }

    /// Opens a connection to the broker described by `request`, closing any
    /// existing one first. Resolves once the broker has answered, the attempt
    /// has failed, or the connect timeout has elapsed.
    pub async fn connect(bridge: &SharedBridge, request: ConnectRequest) -> Result<(), BridgeError> {
        Self::disconnect(bridge).await;

        let options = lock_bridge(bridge).options;
        let info = request.connection_info().inspect_err(|e| {
            error!("Cannot connect: {e}");
        })?;

        let (client, eventloop) =
            AsyncClient::new(request.mqtt_options(&info, &options), REQUEST_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        info!("Connecting to {} as {}", info.url, info.client_id);
        let generation = lock_bridge(bridge).attach(Box::new(client), info.clone());

        let task = tokio::spawn(Self::run_event_loop(
            bridge.clone(),
            eventloop,
            generation,
            ready_tx,
            options.reconnect_interval,
        ));
        lock_bridge(bridge).track_task(generation, task);

        let outcome = match tokio::time::timeout(options.connect_timeout, ready_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectionError::Closed),
            Err(_) => Err(ConnectionError::Timeout {
                url: info.url.clone(),
                secs: options.connect_timeout.as_secs(),
            }),
        };

        match outcome {
            Ok(()) => {
                info!("Connected to {}", info.url);
                Ok(())
            }
            Err(e) => {
                error!("Connection to {} failed: {e}", info.url);
                lock_bridge(bridge).abandon(generation);
                Err(e.into())
            }
        }
    }

    /// Closes the active connection, if any. Calling it while disconnected is
    /// a no-op.
    pub async fn disconnect(bridge: &SharedBridge) {
        let link = lock_bridge(bridge).detach();
        let Some(mut link) = link else {
            return;
        };

        if let Err(e) = link.upstream.disconnect() {
            debug!("DISCONNECT could not be queued: {e}");
        }

        if let Some(task) = link.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(DISCONNECT_GRACE, task).await.is_err() {
                abort.abort();
            }
        }

        info!("Disconnected from broker");
    }

    /// Installs a new upstream and moves to `connecting`. Returns the
    /// generation events from this upstream must carry.
    pub(crate) fn attach(&mut self, upstream: Box<dyn Upstream>, info: ConnectionInfo) -> u64 {
        self.generation += 1;
        self.subscriptions.reset_pending();
        self.link = Some(Link {
            generation: self.generation,
            upstream,
            task: None,
        });
        self.status.info = Some(info);
        self.set_state(ConnectionState::Connecting);
        self.generation
    }

    fn track_task(&mut self, generation: u64, task: JoinHandle<()>) {
        match self.link.as_mut() {
            Some(link) if link.generation == generation => link.task = Some(task),
            _ => task.abort(),
        }
    }

    /// Drops a connection attempt that failed or timed out.
    fn abandon(&mut self, generation: u64) {
        if self.is_current(generation) {
            if let Some(task) = self.link.take().and_then(|link| link.task) {
                task.abort();
            }
            self.subscriptions.reset_pending();
            self.set_state(ConnectionState::Error);
        }
    }

    fn detach(&mut self) -> Option<Link> {
        let link = self.link.take()?;
        self.subscriptions.reset_pending();
        self.set_state(ConnectionState::Disconnected);
        Some(link)
    }

    #[cfg(test)]
    pub(crate) fn has_link(&self) -> bool {
        self.link.is_some()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    /// Routes an event from the connection with the given generation. Returns
    /// `false` once that connection is no longer the active one.
    pub(crate) fn handle_upstream(&mut self, generation: u64, event: UpstreamEvent) -> bool {
        if !self.is_current(generation) {
            debug!("Ignoring event from stale connection {generation}: {event:?}");
            return false;
        }
        self.handle_event(event);
        true
    }

    pub(crate) fn handle_event(&mut self, event: UpstreamEvent) {
        match event {
            UpstreamEvent::Connected => {
                self.set_state(ConnectionState::Connected);
                self.resubscribe_all();
            }
            UpstreamEvent::Publish { topic, payload } => {
                self.ingest(Message::received(topic, &payload));
            }
            UpstreamEvent::SubscribeSent { pkid } => self.subscriptions.sent(pkid),
            UpstreamEvent::SubscribeAcked { pkid, rejected } => {
                for pattern in self.subscriptions.acknowledged(pkid, &rejected) {
                    let err = SubscriptionError::Rejected { pattern };
                    warn!("{err}; removed from active subscriptions");
                }
            }
            UpstreamEvent::ConnectionLost { reason } => {
                warn!(
                    "Broker connection lost: {reason}; retrying in {}s",
                    self.options.reconnect_interval.as_secs()
                );
                self.subscriptions.connection_lost();
                self.set_state(ConnectionState::Disconnected);
            }
            UpstreamEvent::Reconnecting => self.set_state(ConnectionState::Connecting),
            UpstreamEvent::Closed => debug!("DISCONNECT sent"),
        }
    }

    /// Stores a message and hands it to every listener. A store failure is
    /// logged and does not stop delivery.
    pub fn ingest(&mut self, message: Message) {
        debug!("Message on {}", message.topic);
        if let Err(e) = self.store.append(message.clone()) {
            warn!("Failed to store message on {}: {e}", message.topic);
        }
        self.listeners.notify_message(&message);
    }

    /// Re-applies the whole active set on a fresh session. Requests the client
    /// still holds from before the drop are replayed ahead of these.
    fn resubscribe_all(&mut self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };

        for batch in batches(&self.subscriptions.patterns()) {
            match link.upstream.subscribe(&batch) {
                Ok(()) => {
                    debug!("Re-subscribed to {}", batch.join(", "));
                    self.subscriptions.requested(batch);
                }
                Err(e) => error!("Failed to re-subscribe to {}: {e}", batch.join(", ")),
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.status.status == state {
            return;
        }
        info!("Connection state: {:?} -> {:?}", self.status.status, state);
        self.status.status = state;
        self.listeners.notify_status(&self.status);
    }

    async fn run_event_loop(
        bridge: SharedBridge,
        mut eventloop: EventLoop,
        generation: u64,
        ready: oneshot::Sender<Result<(), ConnectionError>>,
        reconnect_interval: Duration,
    ) {
        let mut ready = Some(ready);

        loop {
            match eventloop.poll().await {
                Ok(event) => {
                    let Some(event) = UpstreamEvent::from_event(&event) else {
                        continue;
                    };
                    let connected = matches!(event, UpstreamEvent::Connected);
                    let closed = matches!(event, UpstreamEvent::Closed);

                    let current = lock_bridge(&bridge).handle_upstream(generation, event);
                    if !current || closed {
                        break;
                    }
                    if connected {
                        if let Some(tx) = ready.take() {
                            let _ = tx.send(Ok(()));
                        }
                    }
                }
                Err(e) => {
                    // The first attempt is reported to `connect`, which tears the link down.
                    if let Some(tx) = ready.take() {
                        let _ = tx.send(Err(e.into()));
                        break;
                    }

                    let lost = UpstreamEvent::ConnectionLost {
                        reason: e.to_string(),
                    };
                    let current = lock_bridge(&bridge).handle_upstream(generation, lost);
                    if !current {
                        break;
                    }

                    tokio::time::sleep(reconnect_interval).await;

                    let current =
                        lock_bridge(&bridge).handle_upstream(generation, UpstreamEvent::Reconnecting);
                    if !current {
                        break;
                    }
                }
            }
        }

        debug!("Event loop for connection {generation} stopped");
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("status", &self.status)
            .field("subscriptions", &self.subscriptions)
            .field("listeners", &self.listeners)
            .field("retained", &self.store.len())
            .finish()
    }
}
