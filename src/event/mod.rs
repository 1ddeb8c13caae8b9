// Message bus adapter and correlated request/response
//
// This module abstracts the single asynchronous realtime channel into
// topic-scoped publish/subscribe with explicit per-subscription handles.

// Public API - what other modules can use
pub use bus::{InMemoryMessageBus, MessageBus};
pub use handler::TopicHandler;
pub use request::{ReplyRequest, RequestCorrelator};
pub use subscription::SubscriptionHandle;
pub use topics::{OpenRoomPayload, RequestEnvelope, Topic};

// Internal modules
mod bus;
mod handler;
mod request;
mod subscription;
mod topics;
