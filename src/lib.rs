// Library crate for the chat room engine
// This file exposes the public API for the demo binary and integration tests

pub mod config;
pub mod entity;
pub mod event;
pub mod loopback;
pub mod message;
pub mod navigation;
pub mod room;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use config::ChatConfig;
pub use event::{InMemoryMessageBus, MessageBus, SubscriptionHandle, Topic, TopicHandler};
pub use loopback::{LoopbackConfig, LoopbackRealtime};
pub use room::{CloseOutcome, LifecycleState, Room, RoomKind, RoomLifecycle, RoomRegistry};
pub use shared::{ChatContext, ChatError, Operation, TimeoutError};
