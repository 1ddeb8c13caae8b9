//! In-process stand-in for the realtime backend.
//!
//! Answers the request topics the room engine publishes: acknowledges joins,
//! returns room metadata and echoes sent messages back as records, each after
//! a configurable delay. Used by the demo binary and integration tests.

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::event::{MessageBus, RequestEnvelope, SubscriptionHandle, Topic, TopicHandler};
use crate::shared::ChatError;

const LOOPBACK_OWNER: &str = "loopback-realtime";

/// Reply delays for each request kind
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub join_latency: Duration,
    pub room_info_latency: Duration,
    pub send_latency: Duration,
    /// Extra random delay up to this bound, added to every reply
    pub jitter: Duration,
    /// Address echoed messages are sent from
    pub self_address: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            join_latency: Duration::from_millis(50),
            room_info_latency: Duration::from_millis(50),
            send_latency: Duration::from_millis(20),
            jitter: Duration::ZERO,
            self_address: "me@example.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    to: String,
    body: String,
    #[serde(default)]
    children: Option<Value>,
}

#[derive(Clone, Copy, Debug)]
enum Reply {
    Join,
    RoomInfo,
    SendMessage,
}

/// Fake realtime backend listening on the shared bus
pub struct LoopbackRealtime {
    bus: Arc<dyn MessageBus>,
    subjects: Arc<RwLock<HashMap<String, String>>>,
    subscriptions: Vec<SubscriptionHandle>,
}

impl LoopbackRealtime {
    /// Subscribes to the request topics and starts answering them
    pub fn start(bus: Arc<dyn MessageBus>, config: LoopbackConfig) -> Self {
        let subjects = Arc::new(RwLock::new(HashMap::new()));
        let config = Arc::new(config);

        let subscriptions = [
            (Topic::JoinRequest, Reply::Join),
            (Topic::RoomInfoRequest, Reply::RoomInfo),
            (Topic::SendMessageRequest, Reply::SendMessage),
        ]
        .into_iter()
        .map(|(topic, reply)| {
            bus.subscribe(
                &topic.to_string(),
                LOOPBACK_OWNER,
                Arc::new(Responder {
                    reply,
                    bus: bus.clone(),
                    config: config.clone(),
                    subjects: subjects.clone(),
                }),
            )
        })
        .collect();

        Self {
            bus,
            subjects,
            subscriptions,
        }
    }

    /// Subject returned for `room_id` on room-info requests
    pub async fn set_subject(&self, room_id: &str, subject: &str) {
        self.subjects
            .write()
            .await
            .insert(room_id.to_string(), subject.to_string());
    }

    /// Stops answering requests
    pub fn stop(self) -> usize {
        self.subscriptions
            .into_iter()
            .filter(|handle| self.bus.unsubscribe(*handle))
            .count()
    }
}

struct Responder {
    reply: Reply,
    bus: Arc<dyn MessageBus>,
    config: Arc<LoopbackConfig>,
    subjects: Arc<RwLock<HashMap<String, String>>>,
}

impl Responder {
    fn delay(&self) -> Duration {
        let base = match self.reply {
            Reply::Join => self.config.join_latency,
            Reply::RoomInfo => self.config.room_info_latency,
            Reply::SendMessage => self.config.send_latency,
        };
        let jitter_ms = self.config.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }

    async fn reply_for(&self, room_id: &str, payload: Value) -> Result<(Topic, Value), ChatError> {
        match self.reply {
            Reply::Join => Ok((Topic::Joined(room_id.to_string()), json!({}))),
            Reply::RoomInfo => {
                let subject = self.subjects.read().await.get(room_id).cloned();
                Ok((
                    Topic::RoomInfo(room_id.to_string()),
                    json!({ "subject": subject }),
                ))
            }
            Reply::SendMessage => {
                let request: SendRequest = serde_json::from_value(payload)?;
                Ok((
                    Topic::MessageSent(room_id.to_string()),
                    json!({
                        "id": Uuid::new_v4().to_string(),
                        "from": self.config.self_address,
                        "to": request.to,
                        "time": chrono::Utc::now().timestamp_millis(),
                        "raw": request.body,
                        "children": request.children,
                    }),
                ))
            }
        }
    }
}

#[async_trait]
impl TopicHandler for Responder {
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError> {
        let envelope: RequestEnvelope<Value> = serde_json::from_value(payload)?;
        let (reply_topic, reply) = self.reply_for(&envelope.id, envelope.payload).await?;
        let delay = self.delay();
        let bus = self.bus.clone();
        debug!(topic = %topic, reply_topic = %reply_topic, delay_ms = delay.as_millis() as u64, "Loopback reply scheduled");

        // Each reply runs on its own task so slow rooms don't hold up others
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            bus.publish(&reply_topic.to_string(), reply);
        });
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "LoopbackResponder"
    }
}
