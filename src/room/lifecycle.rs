use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::handlers::{OccupantHandler, RoomMessageHandler};
use super::history::HistoryLoader;
use super::models::{LifecycleState, Room, RoomKind};
use crate::config::ChatConfig;
use crate::entity::{Entity, EntityKind, EntityStore};
use crate::event::{MessageBus, ReplyRequest, RequestCorrelator, RequestEnvelope, Topic};
use crate::message::{Message, MessagePipeline, PipelineOptions, RawMessage};
use crate::shared::{ChatContext, ChatError, Operation};

/// Room metadata returned on `room-info:<roomId>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    to: &'a str,
    body: &'a str,
    children: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvitePayload<'a> {
    room_jid: &'a str,
    user_jid: &'a str,
}

/// Drives a room from NEW through entity binding to ACTIVE
///
/// Steps for one room run strictly in order; different rooms progress
/// independently. A failed step leaves the room in its last stable state so
/// activation can be retried.
pub struct RoomLifecycle {
    bus: Arc<dyn MessageBus>,
    entity_store: Arc<dyn EntityStore>,
    history_loader: Arc<dyn HistoryLoader>,
    pipeline: Arc<MessagePipeline>,
    requests: RequestCorrelator,
    config: ChatConfig,
}

impl RoomLifecycle {
    pub fn new(context: &ChatContext) -> Self {
        let pipeline = MessagePipeline::new(
            context.entity_store.clone(),
            PipelineOptions {
                resolve_historical_senders: context.config.resolve_historical_senders,
            },
        );

        Self {
            bus: context.bus.clone(),
            entity_store: context.entity_store.clone(),
            history_loader: context.history_loader.clone(),
            pipeline: Arc::new(pipeline),
            requests: RequestCorrelator::new(context.bus.clone()),
            config: context.config.clone(),
        }
    }

    pub fn requests(&self) -> &RequestCorrelator {
        &self.requests
    }

    pub fn pipeline(&self) -> &Arc<MessagePipeline> {
        &self.pipeline
    }

    /// Full setup: bind listeners, fetch the entity, activate
    #[instrument(skip(self, room), fields(room_id = %room.id(), kind = %room.kind()))]
    pub async fn setup(&self, room: &Arc<Room>) -> Result<(), ChatError> {
        self.bind(room).await?;
        self.activate(room).await?;
        info!("Room setup complete");
        Ok(())
    }

    /// Subscribes the room's scoped message and occupant topics and loads its entity
    ///
    /// The room only becomes BOUND once both are done; a failed entity fetch
    /// leaves it NEW with its listeners attached, ready for another attempt.
    pub async fn bind(&self, room: &Arc<Room>) -> Result<(), ChatError> {
        if room.lifecycle() != LifecycleState::New {
            debug!(room_id = %room.id(), "Room already bound");
            return Ok(());
        }

        if room.subscription_count() == 0 {
            self.attach_listeners(room);
        }
        self.load_entity(room).await?;
        room.transition(LifecycleState::Bound)
    }

    fn attach_listeners(&self, room: &Arc<Room>) {
        let owner = room.subscription_owner();
        let message_handle = self.bus.subscribe(
            &Topic::Message(room.id().to_string()).to_string(),
            &owner,
            Arc::new(RoomMessageHandler::new(
                room,
                self.pipeline.clone(),
                self.config.live_timestamp_format.clone(),
            )),
        );
        let occupant_handle = self.bus.subscribe(
            &Topic::Occupant(room.id().to_string()).to_string(),
            &owner,
            Arc::new(OccupantHandler::new(room, self.entity_store.clone())),
        );
        room.attach_subscriptions([message_handle, occupant_handle]);
    }

    /// Fetches and attaches the room's user or group entity, once
    pub async fn load_entity(&self, room: &Room) -> Result<Entity, ChatError> {
        if let Some(entity) = room.entity() {
            return Ok(entity.clone());
        }

        let kind = match room.kind() {
            RoomKind::Person => EntityKind::User,
            RoomKind::Group => EntityKind::Group,
        };
        let entity = self.entity_store.find_entity(kind, room.address()).await?;
        room.bind_entity(entity.clone());
        debug!(room_id = %room.id(), kind = %kind, "Bound room entity");
        Ok(entity)
    }

    /// Joins (group rooms), fetches metadata, backfills history, marks ACTIVE
    ///
    /// No-op on an already active room.
    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    pub async fn activate(&self, room: &Room) -> Result<(), ChatError> {
        if room.is_activated() {
            debug!("Room already active");
            return Ok(());
        }

        if room.kind() == RoomKind::Group {
            if room.lifecycle() != LifecycleState::Joined {
                self.join_room(room).await?;
            }
            let info = self.get_room_info(room).await?;
            room.set_subject(info.subject);
        }

        self.load_history(room).await?;
        info!(room_id = %room.id(), "Room activated");
        Ok(())
    }

    /// Correlated join on `join-room`, acknowledged on `join:<roomId>`
    pub async fn join_room(&self, room: &Room) -> Result<(), ChatError> {
        room.transition(LifecycleState::Joining)?;

        let request = ReplyRequest {
            operation: Operation::Join,
            room_id: room.id().to_string(),
            send_topic: Topic::JoinRequest.to_string(),
            payload: json!(RequestEnvelope::new(room.id(), room.address())),
            reply_topic: Topic::Joined(room.id().to_string()).to_string(),
            timeout: self.config.join_timeout,
        };

        match self.requests.request(request).await {
            Ok(_) => {
                room.transition(LifecycleState::Joined)?;
                info!(room_id = %room.id(), "Joined room");
                Ok(())
            }
            Err(e) => {
                warn!(room_id = %room.id(), error = %e, "Couldn't join room");
                rollback(room, LifecycleState::Bound);
                Err(e)
            }
        }
    }

    /// Correlated metadata fetch on `get-room-info`, answered on `room-info:<roomId>`
    pub async fn get_room_info(&self, room: &Room) -> Result<RoomInfo, ChatError> {
        let request = ReplyRequest {
            operation: Operation::RoomInfo,
            room_id: room.id().to_string(),
            send_topic: Topic::RoomInfoRequest.to_string(),
            payload: json!(RequestEnvelope::new(room.id(), room.address())),
            reply_topic: Topic::RoomInfo(room.id().to_string()).to_string(),
            timeout: self.config.room_info_timeout,
        };

        let reply = self.requests.request(request).await?;
        Ok(serde_json::from_value(reply)?)
    }

    async fn load_history(&self, room: &Room) -> Result<(), ChatError> {
        let previous = room.lifecycle();
        room.transition(LifecycleState::HistoryLoading)?;

        match self.history_loader.load_history_before(room).await {
            Ok(()) => room.transition(LifecycleState::Active),
            Err(e) => {
                warn!(room_id = %room.id(), error = %e, "History backfill failed");
                rollback(room, previous);
                Err(e)
            }
        }
    }

    /// Sends `body` and waits for the backend to echo it on `send-message:<roomId>`
    ///
    /// Sends within one room go out one at a time; each waits its turn with
    /// its body already listed as pending.
    #[instrument(skip(self, room, body, children), fields(room_id = %room.id()))]
    pub async fn send_message(
        &self,
        room: &Room,
        body: &str,
        children: Option<Value>,
    ) -> Result<Message, ChatError> {
        room.add_pending(body);

        // Echoes carry no request id, so a second outstanding send could take this one's reply
        let _turn = room.send_turn().await;
        let payload = SendMessagePayload {
            to: room.address(),
            body,
            children,
        };
        let request = ReplyRequest {
            operation: Operation::SendMessage,
            room_id: room.id().to_string(),
            send_topic: Topic::SendMessageRequest.to_string(),
            payload: json!(RequestEnvelope::new(room.id(), payload)),
            reply_topic: Topic::MessageSent(room.id().to_string()).to_string(),
            timeout: self.config.send_timeout,
        };

        let echoed = match self.requests.request(request).await {
            Ok(reply) => reply,
            Err(e) => {
                room.discard_pending(body);
                return Err(e);
            }
        };

        let raw = RawMessage::from_payload(echoed)?;
        let message = self
            .pipeline
            .normalize(raw, &self.config.live_timestamp_format, false)
            .await?;
        room.update_pending_message(message.clone());
        Ok(message)
    }

    /// Invites `invitee_address` to the room; the backend never acknowledges invites
    pub fn invite_to_room(&self, room: &Room, invitee_address: &str) -> usize {
        let payload = InvitePayload {
            room_jid: room.address(),
            user_jid: invitee_address,
        };
        debug!(room_id = %room.id(), invitee = %invitee_address, "Inviting to room");
        self.bus.publish(
            &Topic::InviteToRoom.to_string(),
            json!(RequestEnvelope::new(room.id(), payload)),
        )
    }

    /// Releases every bus subscription the room holds
    pub fn release(&self, room: &Room) -> usize {
        let released = room
            .take_subscriptions()
            .into_iter()
            .filter(|handle| self.bus.unsubscribe(*handle))
            .count();
        debug!(room_id = %room.id(), released = released, "Released room subscriptions");
        released
    }
}

fn rollback(room: &Room, to: LifecycleState) {
    if let Err(e) = room.transition(to) {
        warn!(room_id = %room.id(), error = %e, "Lifecycle rollback rejected");
    }
}
