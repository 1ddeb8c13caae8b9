use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::handler::TopicHandler;

/// Handle returned at subscribe time, used to tear the subscription down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl SubscriptionHandle {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How many payloads a subscription accepts before it releases itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Every,
    Once,
}

/// Receive loop for a single subscription
///
/// `release` removes the subscription from the bus registry and reports
/// whether it was still registered. A once-subscription releases itself
/// before running its handler, so whichever of delivery and cancellation
/// claims the registration first wins.
pub(super) async fn listen<F>(
    handle: SubscriptionHandle,
    topic: String,
    mut receiver: broadcast::Receiver<Value>,
    handler: Arc<dyn TopicHandler>,
    delivery: Delivery,
    release: F,
) where
    F: Fn(SubscriptionHandle) -> bool + Send + 'static,
{
    let handler_name = handler.handler_name();
    debug!(topic = %topic, handler = handler_name, subscription = %handle, "Subscription task started");

    loop {
        match receiver.recv().await {
            Ok(payload) => {
                if delivery == Delivery::Once {
                    if !release(handle) {
                        debug!(topic = %topic, subscription = %handle, "Once subscription already cancelled");
                        return;
                    }
                    dispatch(handler.as_ref(), &topic, payload).await;
                    return;
                }
                dispatch(handler.as_ref(), &topic, payload).await;
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    topic = %topic,
                    handler = handler_name,
                    skipped = skipped,
                    "Subscription lagged, payloads were dropped"
                );
            }
            Err(RecvError::Closed) => {
                release(handle);
                debug!(topic = %topic, handler = handler_name, "Topic closed - subscription ended");
                return;
            }
        }
    }
}

async fn dispatch(handler: &dyn TopicHandler, topic: &str, payload: Value) {
    if let Err(e) = handler.handle(topic, payload).await {
        warn!(
            topic = %topic,
            handler = handler.handler_name(),
            error = %e,
            "Topic handler failed"
        );
    }
}
