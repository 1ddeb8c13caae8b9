use serde::{Deserialize, Serialize};
use std::fmt;

/// Topics exchanged with the realtime backend
///
/// Requests go out on unscoped topics the backend listens to; replies and
/// inbound traffic for a room arrive on topics scoped by the room id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound: navigate to a room
    OpenRoom,
    /// Inbound: live message for a room
    Message(String),
    /// Inbound: occupant presence change for a room
    Occupant(String),
    /// Outbound request to join a group room
    JoinRequest,
    /// Reply: join acknowledged
    Joined(String),
    /// Outbound request for room metadata
    RoomInfoRequest,
    /// Reply: room metadata
    RoomInfo(String),
    /// Outbound message send
    SendMessageRequest,
    /// Reply: echoed message record
    MessageSent(String),
    /// Outbound invite, never acknowledged
    InviteToRoom,
    /// Outbound signal that no rooms remain open
    CloseWindow,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::OpenRoom => write!(f, "open-room"),
            Topic::Message(room_id) => write!(f, "message:{}", room_id),
            Topic::Occupant(room_id) => write!(f, "occupant:{}", room_id),
            Topic::JoinRequest => write!(f, "join-room"),
            Topic::Joined(room_id) => write!(f, "join:{}", room_id),
            Topic::RoomInfoRequest => write!(f, "get-room-info"),
            Topic::RoomInfo(room_id) => write!(f, "room-info:{}", room_id),
            Topic::SendMessageRequest => write!(f, "send-message"),
            Topic::MessageSent(room_id) => write!(f, "send-message:{}", room_id),
            Topic::InviteToRoom => write!(f, "invite-to-room"),
            Topic::CloseWindow => write!(f, "close-window"),
        }
    }
}

/// Wire envelope for every outbound request: `{id, payload}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub id: String,
    pub payload: T,
}

impl<T> RequestEnvelope<T> {
    pub fn new(room_id: impl Into<String>, payload: T) -> Self {
        Self {
            id: room_id.into(),
            payload,
        }
    }
}

/// Payload of the inbound `open-room` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomPayload {
    #[serde(alias = "jid")]
    pub address: String,
    #[serde(default, alias = "rawSubject")]
    pub subject_hint: Option<String>,
}
