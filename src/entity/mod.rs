// Public API - what other modules can use
pub use models::{ChatInfo, Entity, EntityKind, Group, User, UserImage};
pub use store::{EntityStore, InMemoryEntityStore};

// Internal modules
mod models;
mod store;
