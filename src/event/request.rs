//! Correlated request/response over the fire-and-forget bus.
//!
//! A request publishes on one topic and waits for exactly one reply on a
//! derived topic, racing a deadline. The reply subscription and the deadline
//! form a single cancellation unit: whichever settles first releases both,
//! and releasing twice is a no-op. Nothing here guarantees the backend
//! answers; silence surfaces as a [`TimeoutError`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::bus::MessageBus;
use super::handler::TopicHandler;
use super::subscription::SubscriptionHandle;
use crate::shared::{ChatError, Operation, TimeoutError};

/// One correlated exchange: what to send, where the reply comes back, how long to wait
#[derive(Debug, Clone)]
pub struct ReplyRequest {
    pub operation: Operation,
    pub room_id: String,
    pub send_topic: String,
    pub payload: Value,
    pub reply_topic: String,
    pub timeout: Duration,
}

/// Issues correlated requests and tracks how many are still waiting
#[derive(Clone)]
pub struct RequestCorrelator {
    bus: Arc<dyn MessageBus>,
    pending: Arc<AtomicUsize>,
}

impl RequestCorrelator {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            bus,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Requests whose reply subscription and deadline are both still live
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Publishes the request and resolves with the first reply, or times out
    #[instrument(
        skip(self, request),
        fields(operation = %request.operation, room_id = %request.room_id)
    )]
    pub async fn request(&self, request: ReplyRequest) -> Result<Value, ChatError> {
        let ReplyRequest {
            operation,
            room_id,
            send_topic,
            payload,
            reply_topic,
            timeout: deadline,
        } = request;

        let (reply_tx, reply_rx) = oneshot::channel();
        let owner = format!("{}:{}", operation, Uuid::new_v4());

        // Subscribe before publishing so a fast reply cannot be missed
        let wait = PendingReply::register(
            self.bus.clone(),
            &reply_topic,
            &owner,
            reply_tx,
            self.pending.clone(),
        );

        let receivers = self.bus.publish(&send_topic, payload);
        debug!(
            send_topic = %send_topic,
            reply_topic = %reply_topic,
            receivers = receivers,
            "Correlated request sent"
        );

        let outcome = timeout(deadline, reply_rx).await;
        wait.cancel();

        match outcome {
            Ok(Ok(reply)) => {
                debug!(reply_topic = %reply_topic, "Correlated reply received");
                Ok(reply)
            }
            Ok(Err(_)) => Err(ChatError::Bus(format!(
                "reply subscription on {} closed before settling",
                reply_topic
            ))),
            Err(_elapsed) => {
                warn!(
                    reply_topic = %reply_topic,
                    timeout_ms = deadline.as_millis() as u64,
                    "Never received a reply from realtime"
                );
                Err(TimeoutError {
                    operation,
                    room_id,
                    timeout: deadline,
                }
                .into())
            }
        }
    }
}

/// The reply half of a request: a single-use subscription that is released exactly once
struct PendingReply {
    bus: Arc<dyn MessageBus>,
    handle: SubscriptionHandle,
    settled: AtomicBool,
    pending: Arc<AtomicUsize>,
}

impl PendingReply {
    fn register(
        bus: Arc<dyn MessageBus>,
        reply_topic: &str,
        owner: &str,
        reply_tx: oneshot::Sender<Value>,
        pending: Arc<AtomicUsize>,
    ) -> Self {
        let handle = bus.subscribe_once(reply_topic, owner, Arc::new(ReplyForwarder::new(reply_tx)));
        pending.fetch_add(1, Ordering::SeqCst);
        Self {
            bus,
            handle,
            settled: AtomicBool::new(false),
            pending,
        }
    }

    fn cancel(&self) {
        if self.settled.swap(true, Ordering::SeqCst) {
            return;
        }
        // False when the reply already consumed the once-subscription
        self.bus.unsubscribe(self.handle);
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Forwards the first reply payload into the waiting request
struct ReplyForwarder {
    reply_tx: Mutex<Option<oneshot::Sender<Value>>>,
}

impl ReplyForwarder {
    fn new(reply_tx: oneshot::Sender<Value>) -> Self {
        Self {
            reply_tx: Mutex::new(Some(reply_tx)),
        }
    }
}

#[async_trait]
impl TopicHandler for ReplyForwarder {
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError> {
        let sender = self
            .reply_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    debug!(topic = %topic, "Reply arrived after the request settled");
                }
            }
            None => debug!(topic = %topic, "Duplicate reply ignored"),
        }
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "ReplyForwarder"
    }
}
