use std::sync::Arc;
use std::time::Duration;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

use crate::config::ChatConfig;
use crate::entity::{EntityKind, EntityStore};
use crate::event::MessageBus;
use crate::navigation::Router;
use crate::room::{HistoryLoader, LifecycleState};

/// Shared collaborators every room component is built from
#[derive(Clone)]
pub struct ChatContext {
    pub bus: Arc<dyn MessageBus>,
    pub entity_store: Arc<dyn EntityStore>,
    pub history_loader: Arc<dyn HistoryLoader>,
    pub router: Arc<dyn Router>,
    pub config: ChatConfig,
}

impl ChatContext {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        entity_store: Arc<dyn EntityStore>,
        history_loader: Arc<dyn HistoryLoader>,
        router: Arc<dyn Router>,
        config: ChatConfig,
    ) -> Self {
        Self {
            bus,
            entity_store,
            history_loader,
            router,
            config,
        }
    }
}

/// Correlated operations issued against the realtime backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    Join,
    RoomInfo,
    SendMessage,
}

/// No reply arrived on the reply topic before the deadline
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} for room {room_id} timed out after {}ms", .timeout.as_millis())]
pub struct TimeoutError {
    pub operation: Operation,
    pub room_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("Failed to fetch {kind} {id}: {reason}")]
    EntityFetch {
        kind: EntityKind,
        id: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Room {room_id} cannot move from {from} to {to}")]
    InvalidTransition {
        room_id: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Malformed payload: {0}")]
    Payload(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Whether the backend never answered a correlated request
    pub fn is_timeout(&self) -> bool {
        matches!(self, ChatError::Timeout(_))
    }

    /// Whether a caller may reasonably try the same operation again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::Timeout(_) | ChatError::EntityFetch { .. } | ChatError::Bus(_)
        )
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Payload(err.to_string())
    }
}
