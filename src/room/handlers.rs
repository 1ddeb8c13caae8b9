use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::models::{OccupantPayload, Room};
use crate::entity::EntityStore;
use crate::event::{OpenRoomPayload, TopicHandler};
use crate::message::{MessagePipeline, RawMessage, TimestampFormat};
use crate::navigation::{RouteParams, Router, ROOM_ROUTE};
use crate::shared::ChatError;

/// Normalizes live messages on `message:<roomId>` into the room
pub struct RoomMessageHandler {
    room: Weak<Room>,
    pipeline: Arc<MessagePipeline>,
    timestamp_format: TimestampFormat,
}

impl RoomMessageHandler {
    pub fn new(
        room: &Arc<Room>,
        pipeline: Arc<MessagePipeline>,
        timestamp_format: TimestampFormat,
    ) -> Self {
        Self {
            room: Arc::downgrade(room),
            pipeline,
            timestamp_format,
        }
    }
}

#[async_trait]
impl TopicHandler for RoomMessageHandler {
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError> {
        let Some(room) = self.room.upgrade() else {
            debug!(topic = %topic, "Room dropped before message arrived");
            return Ok(());
        };

        let raw = RawMessage::from_payload(payload)?;
        let message = self
            .pipeline
            .normalize(raw, &self.timestamp_format, false)
            .await?;
        room.receive_message(message);
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "RoomMessageHandler"
    }
}

/// Tracks room occupants from `occupant:<roomId>`
pub struct OccupantHandler {
    room: Weak<Room>,
    entity_store: Arc<dyn EntityStore>,
}

impl OccupantHandler {
    pub fn new(room: &Arc<Room>, entity_store: Arc<dyn EntityStore>) -> Self {
        Self {
            room: Arc::downgrade(room),
            entity_store,
        }
    }
}

#[async_trait]
impl TopicHandler for OccupantHandler {
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError> {
        let Some(room) = self.room.upgrade() else {
            debug!(topic = %topic, "Room dropped before occupant event arrived");
            return Ok(());
        };

        let event: OccupantPayload = serde_json::from_value(payload)?;
        let occupant = self.entity_store.find_user(&event.from).await?;
        room.occupant_changed(event.event_type, occupant);
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "OccupantHandler"
    }
}

/// Navigates to the room named by an inbound `open-room` event
pub struct OpenRoomHandler {
    router: Arc<dyn Router>,
}

impl OpenRoomHandler {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl TopicHandler for OpenRoomHandler {
    async fn handle(&self, _topic: &str, payload: Value) -> Result<(), ChatError> {
        let request: OpenRoomPayload = serde_json::from_value(payload)?;
        self.router.navigate_to(
            ROOM_ROUTE,
            RouteParams::room(request.address).with_subject_hint(request.subject_hint),
        );
        Ok(())
    }

    fn handler_name(&self) -> &'static str {
        "OpenRoomHandler"
    }
}
