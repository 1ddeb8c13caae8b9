use async_trait::async_trait;
use serde_json::Value;

use crate::shared::ChatError;

/// Trait for components that react to payloads published on a bus topic
///
/// Handlers run on the subscription's own task, so a slow handler only
/// delays later payloads on the same subscription.
#[async_trait]
pub trait TopicHandler: Send + Sync {
    /// Handle one payload delivered on `topic`
    ///
    /// Errors are logged by the subscription and never reach the publisher.
    async fn handle(&self, topic: &str, payload: Value) -> Result<(), ChatError>;

    /// Get a human-readable name for this handler (for logging/debugging)
    fn handler_name(&self) -> &'static str;
}
