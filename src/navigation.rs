use tracing::info;

/// Route that displays a single room
pub const ROOM_ROUTE: &str = "chat.room";

/// Parameters for the room route
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouteParams {
    pub address: String,
    pub subject_hint: Option<String>,
}

impl RouteParams {
    pub fn room(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            subject_hint: None,
        }
    }

    pub fn with_subject_hint(mut self, subject_hint: Option<String>) -> Self {
        self.subject_hint = subject_hint;
        self
    }
}

/// Navigation collaborator used to bring a room into view
pub trait Router: Send + Sync {
    fn navigate_to(&self, route: &str, params: RouteParams);
}

/// Router that only records navigation in the trace log
pub struct TracingRouter;

impl Router for TracingRouter {
    fn navigate_to(&self, route: &str, params: RouteParams) {
        info!(
            route = %route,
            address = %params.address,
            subject_hint = ?params.subject_hint,
            "Navigating"
        );
    }
}
