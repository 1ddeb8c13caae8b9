use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatroom::event::RequestEnvelope;
use chatroom::navigation::{RouteParams, Router};
use chatroom::room::HistoryLoader;
use chatroom::{ChatError, MessageBus, Room, Topic, TopicHandler};

// ============================================================================
// Mock Infrastructure
// ============================================================================

/// Router that remembers every navigation instead of displaying anything
#[derive(Default)]
pub struct RecordingRouter {
    navigations: Mutex<Vec<(String, RouteParams)>>,
}

impl RecordingRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn navigations(&self) -> Vec<(String, RouteParams)> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn last_address(&self) -> Option<String> {
        self.navigations
            .lock()
            .unwrap()
            .last()
            .map(|(_, params)| params.address.clone())
    }
}

impl Router for RecordingRouter {
    fn navigate_to(&self, route: &str, params: RouteParams) {
        self.navigations
            .lock()
            .unwrap()
            .push((route.to_string(), params));
    }
}

/// History loader that takes a fixed time and can be told to fail
pub struct MockHistoryLoader {
    delay: Duration,
    fail_next: AtomicBool,
    calls: AtomicUsize,
}

impl MockHistoryLoader {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_next: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryLoader for MockHistoryLoader {
    async fn load_history_before(&self, room: &Room) -> Result<(), ChatError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ChatError::Bus(format!("history for {} unavailable", room.id())));
        }
        Ok(())
    }
}

/// Bus listener that keeps every payload it sees
#[derive(Default)]
pub struct TopicRecorder {
    received: Mutex<Vec<(String, Value)>>,
}

impl TopicRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn received(&self) -> Vec<(String, Value)> {
        self.received.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl TopicHandler for TopicRecorder {
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError> {
        self.received
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "TopicRecorder"
    }
}

/// Backend fragment that acknowledges joins and ignores everything else
pub struct JoinAcker {
    bus: Arc<dyn MessageBus>,
}

impl JoinAcker {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl TopicHandler for JoinAcker {
    async fn handle(&self, _topic: &str, payload: Value) -> Result<(), ChatError> {
        let request: RequestEnvelope<Value> = serde_json::from_value(payload)?;
        self.bus
            .publish(&Topic::Joined(request.id).to_string(), serde_json::json!({}));
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "JoinAcker"
    }
}
