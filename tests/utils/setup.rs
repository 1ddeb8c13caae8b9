use std::sync::Arc;
use std::time::Duration;

use chatroom::entity::{Group, InMemoryEntityStore, User};
use chatroom::{
    ChatConfig, ChatContext, InMemoryMessageBus, LoopbackConfig, LoopbackRealtime, MessageBus,
    RoomLifecycle, RoomRegistry, SubscriptionHandle,
};

use super::mocks::{MockHistoryLoader, RecordingRouter, TopicRecorder};

pub const SELF_ADDRESS: &str = "me@example.com";
pub const ADA: &str = "ada@example.com";
pub const BOB: &str = "bob@example.com";
pub const GROUP: &str = "abc@conference.example.com";
pub const OTHER_GROUP: &str = "xyz@conference.example.com";

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub bus: Arc<InMemoryMessageBus>,
    pub store: Arc<InMemoryEntityStore>,
    pub history: Arc<MockHistoryLoader>,
    pub router: Arc<RecordingRouter>,
    pub registry: Arc<RoomRegistry>,
    pub loopback: Option<LoopbackRealtime>,
}

pub struct TestSetupBuilder {
    loopback: Option<LoopbackConfig>,
    subjects: Vec<(String, String)>,
    history_delay: Duration,
    request_timeout: Option<Duration>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            loopback: Some(LoopbackConfig {
                self_address: SELF_ADDRESS.to_string(),
                ..LoopbackConfig::default()
            }),
            subjects: Vec::new(),
            history_delay: Duration::ZERO,
            request_timeout: None,
        }
    }

    /// Backend that acknowledges joins after 1200ms and answers metadata 600ms later
    pub fn with_slow_backend(mut self) -> Self {
        self.loopback = Some(LoopbackConfig {
            join_latency: Duration::from_millis(1200),
            room_info_latency: Duration::from_millis(600),
            send_latency: Duration::from_millis(20),
            jitter: Duration::ZERO,
            self_address: SELF_ADDRESS.to_string(),
        });
        self
    }

    /// No backend at all, so every correlated request times out
    pub fn without_backend(mut self) -> Self {
        self.loopback = None;
        self
    }

    pub fn with_subject(mut self, room_id: &str, subject: &str) -> Self {
        self.subjects.push((room_id.to_string(), subject.to_string()));
        self
    }

    pub fn with_history_delay(mut self, delay: Duration) -> Self {
        self.history_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> TestSetup {
        let bus = Arc::new(InMemoryMessageBus::new());

        let store = Arc::new(InMemoryEntityStore::new());
        store.insert_user(User::new(SELF_ADDRESS, "Me")).await;
        store.insert_user(User::new(ADA, "Ada")).await;
        store.insert_user(User::new(BOB, "Bob")).await;
        store.insert_group(Group::new(GROUP, "Planning")).await;
        store.insert_group(Group::new(OTHER_GROUP, "Ops")).await;

        let history = Arc::new(MockHistoryLoader::new(self.history_delay));
        let router = Arc::new(RecordingRouter::new());

        let mut config = ChatConfig::default();
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }

        let loopback = match self.loopback {
            Some(loopback_config) => {
                let loopback = LoopbackRealtime::start(bus.clone(), loopback_config);
                for (room_id, subject) in &self.subjects {
                    loopback.set_subject(room_id, subject).await;
                }
                Some(loopback)
            }
            None => None,
        };

        let context = ChatContext::new(
            bus.clone(),
            store.clone(),
            history.clone(),
            router.clone(),
            config,
        );

        TestSetup {
            bus,
            store,
            history,
            router,
            registry: Arc::new(RoomRegistry::new(&context)),
            loopback,
        }
    }
}

impl TestSetup {
    pub fn lifecycle(&self) -> Arc<RoomLifecycle> {
        self.registry.lifecycle().clone()
    }

    /// Subscribes a recorder to `topic`
    pub fn listen(&self, topic: &str) -> (Arc<TopicRecorder>, SubscriptionHandle) {
        let recorder = Arc::new(TopicRecorder::new());
        let handle = self.bus.subscribe(topic, "test-recorder", recorder.clone());
        (recorder, handle)
    }

    /// Lets spawned subscription tasks drain their queues
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
