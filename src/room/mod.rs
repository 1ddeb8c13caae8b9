// Room lifecycle and registry
//
// Rooms are cached by id, set up at most once at a time, and driven through
// binding, entity fetch, join, metadata and history backfill to ACTIVE.

// Public API - what other modules can use
pub use handlers::{OccupantHandler, OpenRoomHandler, RoomMessageHandler};
pub use history::{HistoryLoader, InMemoryHistoryLoader};
pub use lifecycle::{RoomInfo, RoomLifecycle};
pub use models::{
    room_id_from_address, LifecycleState, OccupantEventType, OccupantPayload, PendingMessage,
    Room, RoomKind,
};
pub use registry::{CloseOutcome, RoomRegistry};

// Internal modules
mod handlers;
mod history;
mod lifecycle;
mod models;
mod registry;
