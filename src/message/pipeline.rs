use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::models::{Message, RawMessage, TimestampFormat};
use crate::entity::{EntityStore, User};
use crate::shared::ChatError;

/// Knobs for message normalization
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Resolve sender entities for historical messages too
    pub resolve_historical_senders: bool,
}

/// Turns raw realtime records into typed messages
///
/// Block-grouping flags are left at their defaults; the room that holds the
/// message computes them from its neighbours.
pub struct MessagePipeline {
    entity_store: Arc<dyn EntityStore>,
    options: PipelineOptions,
}

impl MessagePipeline {
    pub fn new(entity_store: Arc<dyn EntityStore>, options: PipelineOptions) -> Self {
        Self {
            entity_store,
            options,
        }
    }

    /// Normalizes `raw`, resolving its sender through the entity store
    #[instrument(skip(self, raw), fields(message_id = %raw.id))]
    pub async fn normalize(
        &self,
        raw: RawMessage,
        timestamp_format: &TimestampFormat,
        is_historical: bool,
    ) -> Result<Message, ChatError> {
        let resolve = !is_historical || self.options.resolve_historical_senders;
        let user = match (&raw.from, resolve) {
            (Some(from), true) => Some(self.entity_store.find_user(from).await?),
            _ => None,
        };

        debug!(resolved_sender = user.is_some(), is_historical, "Normalizing message");
        build(raw, timestamp_format, is_historical, user)
    }

    /// Normalizes `raw` with a sender the caller already resolved, e.g. a search hit
    pub fn normalize_with_sender(
        &self,
        raw: RawMessage,
        timestamp_format: &TimestampFormat,
        is_historical: bool,
        sender: Arc<User>,
    ) -> Result<Message, ChatError> {
        build(raw, timestamp_format, is_historical, Some(sender))
    }
}

fn build(
    raw: RawMessage,
    timestamp_format: &TimestampFormat,
    is_historical: bool,
    user: Option<Arc<User>>,
) -> Result<Message, ChatError> {
    // Records without a timestamp are stamped on receipt
    let time = match &raw.time {
        Some(time) => timestamp_format.parse(time)?,
        None => Utc::now(),
    };

    Ok(Message {
        id: raw.id,
        oid: raw.oid,
        from: raw.from,
        to: raw.to,
        time,
        raw: raw.raw,
        correction_raw: None,
        corrects: raw.corrects,
        links: raw.links,
        files: raw.files,
        user,
        is_historical,
        start_of_block: true,
        end_of_block: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityKind, InMemoryEntityStore};
    use crate::message::models::RawTimestamp;

    fn raw(from: Option<&str>) -> RawMessage {
        RawMessage {
            id: "m1".to_string(),
            oid: None,
            from: from.map(str::to_string),
            to: Some("abc@conference.example.com".to_string()),
            time: Some(RawTimestamp::Millis(1_700_000_000_000)),
            raw: "hello".to_string(),
            corrects: None,
            links: Vec::new(),
            files: Vec::new(),
        }
    }

    async fn store_with_ada() -> Arc<InMemoryEntityStore> {
        let store = Arc::new(InMemoryEntityStore::new());
        store.insert_user(User::new("ada@example.com", "Ada")).await;
        store
    }

    #[tokio::test]
    async fn test_live_message_resolves_sender() {
        let store = store_with_ada().await;
        let pipeline = MessagePipeline::new(store.clone(), PipelineOptions::default());

        let message = pipeline
            .normalize(raw(Some("ada@example.com")), &TimestampFormat::UnixMillis, false)
            .await
            .unwrap();

        assert_eq!(message.user.as_ref().unwrap().label(), "Ada");
        assert_eq!(message.time.timestamp(), 1_700_000_000);
        assert!(!message.is_historical);
        assert_eq!(store.fetch_count(EntityKind::User, "ada@example.com").await, 1);
    }

    #[tokio::test]
    async fn test_historical_message_skips_sender_by_default() {
        let store = store_with_ada().await;
        let pipeline = MessagePipeline::new(store.clone(), PipelineOptions::default());

        let message = pipeline
            .normalize(raw(Some("ada@example.com")), &TimestampFormat::UnixMillis, true)
            .await
            .unwrap();

        assert!(message.user.is_none());
        assert!(message.is_historical);
        assert_eq!(store.fetch_count(EntityKind::User, "ada@example.com").await, 0);
    }

    #[tokio::test]
    async fn test_historical_sender_resolution_is_configurable() {
        let store = store_with_ada().await;
        let pipeline = MessagePipeline::new(
            store.clone(),
            PipelineOptions {
                resolve_historical_senders: true,
            },
        );

        let message = pipeline
            .normalize(raw(Some("ada@example.com")), &TimestampFormat::UnixMillis, true)
            .await
            .unwrap();

        assert!(message.user.is_some());
    }

    #[tokio::test]
    async fn test_pre_resolved_sender_is_not_fetched() {
        let store = store_with_ada().await;
        let pipeline = MessagePipeline::new(store.clone(), PipelineOptions::default());
        let sender = Arc::new(User::new("ada@example.com", "Ada from search"));

        let message = pipeline
            .normalize_with_sender(
                raw(Some("ada@example.com")),
                &TimestampFormat::UnixMillis,
                true,
                sender,
            )
            .unwrap();

        assert_eq!(message.user.unwrap().label(), "Ada from search");
        assert_eq!(store.fetch_count(EntityKind::User, "ada@example.com").await, 0);
    }

    #[tokio::test]
    async fn test_unknown_sender_is_entity_fetch_error() {
        let pipeline = MessagePipeline::new(
            Arc::new(InMemoryEntityStore::new()),
            PipelineOptions::default(),
        );

        let result = pipeline
            .normalize(raw(Some("ghost@example.com")), &TimestampFormat::UnixMillis, false)
            .await;

        assert!(matches!(result, Err(ChatError::EntityFetch { .. })));
    }

    #[tokio::test]
    async fn test_message_without_sender_needs_no_lookup() {
        let pipeline = MessagePipeline::new(
            Arc::new(InMemoryEntityStore::new()),
            PipelineOptions::default(),
        );

        let message = pipeline
            .normalize(raw(None), &TimestampFormat::UnixMillis, false)
            .await
            .unwrap();

        assert!(message.user.is_none());
        assert_eq!(message.content(), "hello");
    }
}
