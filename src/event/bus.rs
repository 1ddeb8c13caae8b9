use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use super::handler::TopicHandler;
use super::subscription::{listen, Delivery, SubscriptionHandle};
use crate::config::DEFAULT_TOPIC_CAPACITY;

/// Topic-addressed publish/subscribe over the single realtime channel
///
/// Subscriptions are idempotent per `(topic, owner)`: subscribing the same
/// owner to the same topic twice returns the first handle and leaves a single
/// listener registered.
pub trait MessageBus: Send + Sync {
    /// Publishes `payload` on `topic`, returning how many listeners received it
    fn publish(&self, topic: &str, payload: Value) -> usize;

    /// Registers `handler` for every payload on `topic`
    fn subscribe(
        &self,
        topic: &str,
        owner: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> SubscriptionHandle;

    /// Registers `handler` for the next payload on `topic` only
    ///
    /// The subscription releases itself after firing; unsubscribing before
    /// that guarantees the handler never runs.
    fn subscribe_once(
        &self,
        topic: &str,
        owner: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> SubscriptionHandle;

    /// Removes a subscription. Returns false if it was already gone.
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;

    /// Number of live subscriptions on `topic`
    fn listener_count(&self, topic: &str) -> usize;
}

struct Registration {
    topic: String,
    owner: String,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct BusState {
    /// Topic channels: topic -> sender
    channels: HashMap<String, broadcast::Sender<Value>>,
    registrations: HashMap<SubscriptionHandle, Registration>,
}

impl BusState {
    fn remove(&mut self, handle: SubscriptionHandle) -> Option<Registration> {
        let registration = self.registrations.remove(&handle)?;
        let topic_still_used = self
            .registrations
            .values()
            .any(|r| r.topic == registration.topic);
        if !topic_still_used {
            self.channels.remove(&registration.topic);
            debug!(topic = %registration.topic, "Dropped topic channel with no listeners");
        }
        Some(registration)
    }
}

/// In-process message bus backed by one broadcast channel per topic
#[derive(Clone)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<BusState>>,
    capacity: usize,
}

impl InMemoryMessageBus {
    /// Creates a bus with the default per-topic capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Creates a bus whose topics buffer `capacity` payloads
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            capacity: capacity.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        topic: &str,
        owner: &str,
        handler: Arc<dyn TopicHandler>,
        delivery: Delivery,
    ) -> SubscriptionHandle {
        let mut state = self.state();

        if let Some((handle, _)) = state
            .registrations
            .iter()
            .find(|(_, r)| r.topic == topic && r.owner == owner)
        {
            debug!(topic = %topic, owner = %owner, "Listener already registered for owner");
            return *handle;
        }

        let capacity = self.capacity;
        let receiver = state
            .channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        let handle = SubscriptionHandle::new();
        let weak_state: Weak<Mutex<BusState>> = Arc::downgrade(&self.state);
        let release = move |handle: SubscriptionHandle| match weak_state.upgrade() {
            Some(state) => state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(handle)
                .is_some(),
            None => false,
        };

        // Registration is inserted before the lock is released, so the task
        // can never try to release a handle that is not yet registered.
        let task = tokio::spawn(listen(
            handle,
            topic.to_string(),
            receiver,
            handler,
            delivery,
            release,
        ));
        state.registrations.insert(
            handle,
            Registration {
                topic: topic.to_string(),
                owner: owner.to_string(),
                task,
            },
        );

        debug!(
            topic = %topic,
            owner = %owner,
            subscription = %handle,
            delivery = ?delivery,
            "Listener registered"
        );
        handle
    }
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus for InMemoryMessageBus {
    fn publish(&self, topic: &str, payload: Value) -> usize {
        let state = self.state();

        match state.channels.get(topic) {
            Some(sender) => match sender.send(payload) {
                Ok(receiver_count) => {
                    debug!(topic = %topic, receivers = receiver_count, "Payload published");
                    receiver_count
                }
                Err(_) => {
                    debug!(topic = %topic, "Payload published with no receivers");
                    0
                }
            },
            None => {
                debug!(topic = %topic, "No listeners for topic");
                0
            }
        }
    }

    fn subscribe(
        &self,
        topic: &str,
        owner: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> SubscriptionHandle {
        self.register(topic, owner, handler, Delivery::Every)
    }

    fn subscribe_once(
        &self,
        topic: &str,
        owner: &str,
        handler: Arc<dyn TopicHandler>,
    ) -> SubscriptionHandle {
        self.register(topic, owner, handler, Delivery::Once)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        match self.state().remove(handle) {
            Some(registration) => {
                registration.task.abort();
                debug!(topic = %registration.topic, subscription = %handle, "Listener removed");
                true
            }
            None => false,
        }
    }

    fn listener_count(&self, topic: &str) -> usize {
        self.state()
            .registrations
            .values()
            .filter(|r| r.topic == topic)
            .count()
    }
}

impl std::fmt::Debug for InMemoryMessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryMessageBus")
            .field("topics", &state.channels.len())
            .field("subscriptions", &state.registrations.len())
            .finish()
    }
}
