use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::{Entity, User};
use crate::event::SubscriptionHandle;
use crate::message::{apply_block_grouping, Message};
use crate::shared::ChatError;

/// Domain prefix the realtime backend uses for multi-user rooms
const GROUP_DOMAIN_PREFIX: &str = "conference.";

/// Direct conversation or group chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum RoomKind {
    Person,
    Group,
}

impl RoomKind {
    /// Group rooms live on the conference domain; everything else is a person
    pub fn from_address(address: &str) -> Self {
        match address.split_once('@') {
            Some((_, domain)) if domain.starts_with(GROUP_DOMAIN_PREFIX) => RoomKind::Group,
            _ => RoomKind::Person,
        }
    }
}

/// Room setup progress
///
/// `NEW → BOUND → (JOINING → JOINED →)? HISTORY_LOADING → ACTIVE`, with
/// rollback edges from the in-progress states back to the last stable one.
/// A room is BOUND once its listeners are attached and its entity is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    New,
    Bound,
    Joining,
    Joined,
    HistoryLoading,
    Active,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (New, Bound)
                | (Bound, Joining)
                | (Bound, HistoryLoading)
                | (Joining, Joined)
                | (Joining, Bound)
                | (Joined, HistoryLoading)
                | (HistoryLoading, Active)
                | (HistoryLoading, Bound)
                | (HistoryLoading, Joined)
        )
    }
}

/// Derives the room id from the local part of an address
pub fn room_id_from_address(address: &str) -> Result<String, ChatError> {
    let local = address.split('@').next().unwrap_or_default().trim();
    if local.is_empty() {
        return Err(ChatError::Validation(format!(
            "address {:?} has no local part",
            address
        )));
    }
    Ok(local.to_string())
}

/// Occupant presence changes published on `occupant:<roomId>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupantEventType {
    Join,
    Available,
    Leave,
    Unavailable,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupantPayload {
    pub from: String,
    #[serde(alias = "type")]
    pub event_type: OccupantEventType,
}

/// Outgoing message waiting for the backend to echo it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    pub body: String,
}

#[derive(Debug)]
struct RoomState {
    lifecycle: LifecycleState,
    subject: Option<String>,
    messages: Vec<Message>,
    pending: Vec<PendingMessage>,
    occupants: Vec<Arc<User>>,
    subscriptions: Vec<SubscriptionHandle>,
}

/// A conversation context, shared between the registry and its bus handlers
#[derive(Debug)]
pub struct Room {
    id: String,
    /// Distinguishes rooms that share an id, e.g. a room reopened after close
    instance: Uuid,
    address: String,
    kind: RoomKind,
    entity: OnceLock<Entity>,
    state: RwLock<RoomState>,
    /// Sends share one echo topic, so only one may be outstanding at a time
    send_gate: AsyncMutex<()>,
}

impl Room {
    /// Creates a room for `address`, deriving id and kind from it
    pub fn new(address: &str) -> Result<Self, ChatError> {
        Self::with_kind(address, RoomKind::from_address(address))
    }

    pub fn with_kind(address: &str, kind: RoomKind) -> Result<Self, ChatError> {
        Ok(Self {
            id: room_id_from_address(address)?,
            instance: Uuid::new_v4(),
            address: address.to_string(),
            kind,
            entity: OnceLock::new(),
            state: RwLock::new(RoomState {
                lifecycle: LifecycleState::New,
                subject: None,
                messages: Vec::new(),
                pending: Vec::new(),
                occupants: Vec::new(),
                subscriptions: Vec::new(),
            }),
            send_gate: AsyncMutex::new(()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, RoomState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RoomState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Bus owner key for this room's listeners
    pub(crate) fn subscription_owner(&self) -> String {
        format!("room:{}:{}", self.id, self.instance)
    }

    /// Waits until no other send is outstanding in this room
    pub(crate) async fn send_turn(&self) -> AsyncMutexGuard<'_, ()> {
        self.send_gate.lock().await
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    pub fn entity(&self) -> Option<&Entity> {
        self.entity.get()
    }

    /// Binds the room's entity. Only the first binding sticks.
    pub fn bind_entity(&self, entity: Entity) -> bool {
        self.entity.set(entity).is_ok()
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.read().lifecycle
    }

    pub fn is_activated(&self) -> bool {
        self.lifecycle() == LifecycleState::Active
    }

    /// Moves the room to `next`, rejecting edges the state machine does not allow
    pub fn transition(&self, next: LifecycleState) -> Result<(), ChatError> {
        let mut state = self.write();
        let current = state.lifecycle;
        if !current.can_transition_to(next) {
            return Err(ChatError::InvalidTransition {
                room_id: self.id.clone(),
                from: current,
                to: next,
            });
        }
        state.lifecycle = next;
        debug!(room_id = %self.id, from = %current, to = %next, "Room lifecycle transition");
        Ok(())
    }

    pub fn subject(&self) -> Option<String> {
        self.read().subject.clone()
    }

    pub fn set_subject(&self, subject: Option<String>) {
        self.write().subject = subject;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.read().messages.clone()
    }

    pub fn message_count(&self) -> usize {
        self.read().messages.len()
    }

    /// Adds a live message
    ///
    /// A correction supersedes the message it references in place; a message
    /// whose id is already present replaces that entry.
    pub fn receive_message(&self, message: Message) {
        let mut state = self.write();

        let target = message
            .corrects
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| state.messages.iter().position(|m| m.id == id));

        if let Some(index) = target {
            let corrected = state.messages[index].with_correction(message.raw.clone());
            debug!(room_id = %self.id, corrected_id = %corrected.id, "Applied correction");
            state.messages[index] = corrected;
        } else if let Some(index) = state.messages.iter().position(|m| m.id == message.id) {
            state.messages[index] = message;
        } else {
            state.messages.push(message);
        }

        apply_block_grouping(&mut state.messages);
    }

    /// Inserts backfilled messages ahead of everything already loaded
    pub fn prepend_history(&self, history: Vec<Message>) -> usize {
        let mut state = self.write();
        let mut merged: Vec<Message> = history
            .into_iter()
            .filter(|m| !state.messages.iter().any(|existing| existing.id == m.id))
            .collect();
        let added = merged.len();

        merged.sort_by_key(|m| m.time);
        merged.append(&mut state.messages);
        state.messages = merged;
        apply_block_grouping(&mut state.messages);

        info!(room_id = %self.id, added = added, "Backfilled room history");
        added
    }

    pub fn add_pending(&self, body: &str) {
        self.write().pending.push(PendingMessage {
            body: body.to_string(),
        });
    }

    pub fn discard_pending(&self, body: &str) -> bool {
        let mut state = self.write();
        match state.pending.iter().position(|p| p.body == body) {
            Some(index) => {
                state.pending.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn pending_messages(&self) -> Vec<PendingMessage> {
        self.read().pending.clone()
    }

    /// Replaces the pending entry echoed back by the backend with the real message
    pub fn update_pending_message(&self, message: Message) {
        self.discard_pending(&message.raw);
        self.receive_message(message);
    }

    pub fn occupants(&self) -> Vec<Arc<User>> {
        self.read().occupants.clone()
    }

    pub fn occupant_changed(&self, event_type: OccupantEventType, occupant: Arc<User>) {
        let mut state = self.write();
        match event_type {
            OccupantEventType::Join | OccupantEventType::Available => {
                if !state.occupants.iter().any(|o| o.id == occupant.id) {
                    state.occupants.push(occupant);
                }
            }
            OccupantEventType::Leave | OccupantEventType::Unavailable => {
                state.occupants.retain(|o| o.id != occupant.id);
            }
            OccupantEventType::Other => {
                debug!(room_id = %self.id, occupant = %occupant.id, "Ignoring occupant event");
            }
        }
    }

    pub(crate) fn attach_subscriptions(&self, handles: impl IntoIterator<Item = SubscriptionHandle>) {
        self.write().subscriptions.extend(handles);
    }

    pub(crate) fn take_subscriptions(&self) -> Vec<SubscriptionHandle> {
        std::mem::take(&mut self.write().subscriptions)
    }

    pub fn subscription_count(&self) -> usize {
        self.read().subscriptions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn message(id: &str, from: &str, at_secs: i64) -> Message {
        Message {
            id: id.to_string(),
            oid: None,
            from: Some(from.to_string()),
            to: None,
            time: Utc.timestamp_opt(at_secs, 0).unwrap(),
            raw: format!("body of {}", id),
            correction_raw: None,
            corrects: None,
            links: Vec::new(),
            files: Vec::new(),
            user: None,
            is_historical: false,
            start_of_block: true,
            end_of_block: true,
        }
    }

    #[rstest]
    #[case("abc@conference.example.com", "abc", RoomKind::Group)]
    #[case("ada@example.com", "ada", RoomKind::Person)]
    #[case("bare-id", "bare-id", RoomKind::Person)]
    fn test_room_identity_from_address(
        #[case] address: &str,
        #[case] id: &str,
        #[case] kind: RoomKind,
    ) {
        let room = Room::new(address).unwrap();
        assert_eq!(room.id(), id);
        assert_eq!(room.kind(), kind);
        assert_eq!(room.lifecycle(), LifecycleState::New);
    }

    #[test]
    fn test_address_without_local_part_is_rejected() {
        assert!(matches!(
            Room::new("@conference.example.com"),
            Err(ChatError::Validation(_))
        ));
    }

    #[rstest]
    #[case(LifecycleState::New, LifecycleState::Bound, true)]
    #[case(LifecycleState::Bound, LifecycleState::Joining, true)]
    #[case(LifecycleState::Bound, LifecycleState::HistoryLoading, true)]
    #[case(LifecycleState::Joining, LifecycleState::Joined, true)]
    #[case(LifecycleState::Joining, LifecycleState::Bound, true)]
    #[case(LifecycleState::Joined, LifecycleState::HistoryLoading, true)]
    #[case(LifecycleState::HistoryLoading, LifecycleState::Active, true)]
    #[case(LifecycleState::New, LifecycleState::Active, false)]
    #[case(LifecycleState::Bound, LifecycleState::Active, false)]
    #[case(LifecycleState::Active, LifecycleState::Active, false)]
    #[case(LifecycleState::Active, LifecycleState::Bound, false)]
    #[case(LifecycleState::Active, LifecycleState::New, false)]
    fn test_transition_table(
        #[case] from: LifecycleState,
        #[case] to: LifecycleState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_invalid_transition_is_rejected_and_state_kept() {
        let room = Room::new("ada@example.com").unwrap();
        let err = room.transition(LifecycleState::Active).unwrap_err();

        assert!(matches!(
            err,
            ChatError::InvalidTransition {
                from: LifecycleState::New,
                to: LifecycleState::Active,
                ..
            }
        ));
        assert_eq!(room.lifecycle(), LifecycleState::New);
    }

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::HistoryLoading.to_string(), "HISTORY_LOADING");
        assert_eq!(RoomKind::Group.to_string(), "group");
    }

    #[test]
    fn test_entity_binds_once() {
        let room = Room::new("ada@example.com").unwrap();
        let first = Entity::User(Arc::new(User::new("ada@example.com", "Ada")));
        let second = Entity::User(Arc::new(User::new("ada@example.com", "Someone else")));

        assert!(room.bind_entity(first.clone()));
        assert!(!room.bind_entity(second));
        assert_eq!(room.entity(), Some(&first));
    }

    #[test]
    fn test_correction_supersedes_referenced_message() {
        let room = Room::new("abc@conference.example.com").unwrap();
        room.receive_message(message("m1", "ada", 10));

        let mut correction = message("m2", "ada", 20);
        correction.raw = "fixed".to_string();
        correction.corrects = Some("m1".to_string());
        room.receive_message(correction);

        let messages = room.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].content(), "fixed");
        assert!(messages[0].is_corrected());
    }

    #[test]
    fn test_correction_for_unknown_message_is_appended() {
        let room = Room::new("abc@conference.example.com").unwrap();
        let mut correction = message("m2", "ada", 20);
        correction.corrects = Some("missing".to_string());
        room.receive_message(correction);

        assert_eq!(room.message_count(), 1);
        assert!(room.messages()[0].is_corrected());
    }

    #[test]
    fn test_receive_groups_consecutive_senders() {
        let room = Room::new("abc@conference.example.com").unwrap();
        room.receive_message(message("m1", "ada", 10));
        room.receive_message(message("m2", "ada", 11));
        room.receive_message(message("m3", "bob", 12));

        let messages = room.messages();
        assert!(messages[0].start_of_block && !messages[0].end_of_block);
        assert!(!messages[1].start_of_block && messages[1].end_of_block);
        assert!(messages[2].start_of_block && messages[2].end_of_block);
    }

    #[test]
    fn test_prepend_history_skips_duplicates_and_orders_by_time() {
        let room = Room::new("abc@conference.example.com").unwrap();
        room.receive_message(message("live", "ada", 100));

        let added = room.prepend_history(vec![
            message("h2", "bob", 50),
            message("h1", "bob", 40),
            message("live", "ada", 100),
        ]);

        assert_eq!(added, 2);
        let ids: Vec<String> = room.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["h1", "h2", "live"]);
    }

    #[test]
    fn test_update_pending_message_replaces_pending_entry() {
        let room = Room::new("abc@conference.example.com").unwrap();
        room.add_pending("body of m1");
        assert_eq!(room.pending_messages().len(), 1);

        room.update_pending_message(message("m1", "me", 10));

        assert!(room.pending_messages().is_empty());
        assert_eq!(room.message_count(), 1);
    }

    #[test]
    fn test_occupant_join_and_leave() {
        let room = Room::new("abc@conference.example.com").unwrap();
        let ada = Arc::new(User::new("ada@example.com", "Ada"));

        room.occupant_changed(OccupantEventType::Join, ada.clone());
        room.occupant_changed(OccupantEventType::Available, ada.clone());
        assert_eq!(room.occupants().len(), 1);

        room.occupant_changed(OccupantEventType::Leave, ada);
        assert!(room.occupants().is_empty());
    }

    #[test]
    fn test_occupant_payload_accepts_type_alias() {
        let payload: OccupantPayload = serde_json::from_value(serde_json::json!({
            "from": "ada@example.com",
            "type": "unavailable"
        }))
        .unwrap();
        assert_eq!(payload.event_type, OccupantEventType::Unavailable);

        let payload: OccupantPayload = serde_json::from_value(serde_json::json!({
            "from": "ada@example.com",
            "eventType": "kicked"
        }))
        .unwrap();
        assert_eq!(payload.event_type, OccupantEventType::Other);
    }
}
