use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::models::{Entity, EntityKind, Group, User};
use crate::shared::ChatError;

/// Fetches user and group entities by identifier
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn find_entity(&self, kind: EntityKind, id: &str) -> Result<Entity, ChatError>;

    /// Convenience lookup for message senders and occupants
    async fn find_user(&self, id: &str) -> Result<Arc<User>, ChatError> {
        match self.find_entity(EntityKind::User, id).await? {
            Entity::User(user) => Ok(user),
            Entity::Group(_) => Err(ChatError::EntityFetch {
                kind: EntityKind::User,
                id: id.to_string(),
                reason: "store returned a group".to_string(),
            }),
        }
    }
}

/// In-memory implementation of EntityStore for development and testing
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<(EntityKind, String), Entity>>,
    fetches: RwLock<HashMap<(EntityKind, String), usize>>,
    latency: Duration,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            fetches: RwLock::new(HashMap::new()),
            latency: Duration::ZERO,
        }
    }

    /// Delay every lookup by `latency` to mimic a remote store
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn insert_user(&self, user: User) {
        let key = (EntityKind::User, user.id.clone());
        self.entities
            .write()
            .await
            .insert(key, Entity::User(Arc::new(user)));
    }

    pub async fn insert_group(&self, group: Group) {
        let key = (EntityKind::Group, group.id.clone());
        self.entities
            .write()
            .await
            .insert(key, Entity::Group(Arc::new(group)));
    }

    /// How many times `(kind, id)` has been looked up
    pub async fn fetch_count(&self, kind: EntityKind, id: &str) -> usize {
        self.fetches
            .read()
            .await
            .get(&(kind, id.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    #[instrument(skip(self))]
    async fn find_entity(&self, kind: EntityKind, id: &str) -> Result<Entity, ChatError> {
        let key = (kind, id.to_string());
        *self.fetches.write().await.entry(key.clone()).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let entity = self.entities.read().await.get(&key).cloned();
        match entity {
            Some(entity) => {
                debug!(kind = %kind, id = %id, "Entity found in memory");
                Ok(entity)
            }
            None => {
                debug!(kind = %kind, id = %id, "Entity not found in memory");
                Err(ChatError::EntityFetch {
                    kind,
                    id: id.to_string(),
                    reason: "not found".to_string(),
                })
            }
        }
    }
}
