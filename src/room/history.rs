use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::Room;
use crate::message::{MessagePipeline, RawMessage, TimestampFormat};
use crate::shared::ChatError;

/// Backfills messages that predate the room's activation in this session
#[async_trait]
pub trait HistoryLoader: Send + Sync {
    async fn load_history_before(&self, room: &Room) -> Result<(), ChatError>;
}

/// In-memory implementation of HistoryLoader for development and testing
///
/// Serves seeded raw records per room id, older than anything the room holds.
pub struct InMemoryHistoryLoader {
    pipeline: Arc<MessagePipeline>,
    timestamp_format: TimestampFormat,
    records: RwLock<HashMap<String, Vec<RawMessage>>>,
    loads: AtomicUsize,
}

impl InMemoryHistoryLoader {
    pub fn new(pipeline: Arc<MessagePipeline>, timestamp_format: TimestampFormat) -> Self {
        Self {
            pipeline,
            timestamp_format,
            records: RwLock::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub async fn seed(&self, room_id: &str, records: Vec<RawMessage>) {
        self.records
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .extend(records);
    }

    /// How many backfills have run
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryLoader for InMemoryHistoryLoader {
    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    async fn load_history_before(&self, room: &Room) -> Result<(), ChatError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        let records = self
            .records
            .read()
            .await
            .get(room.id())
            .cloned()
            .unwrap_or_default();
        let oldest = room.messages().first().map(|m| m.time);

        let mut history = Vec::with_capacity(records.len());
        for raw in records {
            let message = self
                .pipeline
                .normalize(raw, &self.timestamp_format, true)
                .await?;
            if oldest.map_or(true, |oldest| message.time < oldest) {
                history.push(message);
            }
        }

        debug!(count = history.len(), "Loaded history records");
        room.prepend_history(history);
        Ok(())
    }
}
