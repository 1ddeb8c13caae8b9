use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

use super::handlers::OpenRoomHandler;
use super::lifecycle::RoomLifecycle;
use super::models::{room_id_from_address, Room};
use crate::event::{MessageBus, SubscriptionHandle, Topic};
use crate::navigation::{RouteParams, Router, ROOM_ROUTE};
use crate::shared::{ChatContext, ChatError};

type SetupFuture = Shared<BoxFuture<'static, Result<Arc<Room>, ChatError>>>;

const REGISTRY_OWNER: &str = "room-registry";

/// Result of closing a room
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    /// Another room is still open and was navigated to
    Navigated(Arc<Room>),
    /// That was the last open room
    NoRoomsOpen,
}

#[derive(Default)]
struct RegistryState {
    /// Fully set-up rooms: room_id -> room
    cache: HashMap<String, Arc<Room>>,
    /// Setups still running: room_id -> shared result
    in_flight: HashMap<String, SetupFuture>,
    /// Rooms currently open, most recently opened last
    open: Vec<Arc<Room>>,
}

/// Memoized rooms plus the ordered list of open ones
///
/// At most one setup runs per room id; concurrent callers share it. A failed
/// setup is forgotten, so the next request for that id starts over.
pub struct RoomRegistry {
    lifecycle: Arc<RoomLifecycle>,
    bus: Arc<dyn MessageBus>,
    router: Arc<dyn Router>,
    state: Arc<Mutex<RegistryState>>,
    open_room_subscription: Mutex<Option<SubscriptionHandle>>,
}

impl RoomRegistry {
    pub fn new(context: &ChatContext) -> Self {
        Self::with_lifecycle(context, Arc::new(RoomLifecycle::new(context)))
    }

    pub fn with_lifecycle(context: &ChatContext, lifecycle: Arc<RoomLifecycle>) -> Self {
        Self {
            lifecycle,
            bus: context.bus.clone(),
            router: context.router.clone(),
            state: Arc::new(Mutex::new(RegistryState::default())),
            open_room_subscription: Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        lock(&self.state)
    }

    pub fn lifecycle(&self) -> &Arc<RoomLifecycle> {
        &self.lifecycle
    }

    /// Returns the cached room for `address`, setting it up on first request
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, address: &str) -> Result<Arc<Room>, ChatError> {
        let room_id = room_id_from_address(address)?;

        let setup = {
            let mut state = self.state();
            if let Some(room) = state.cache.get(&room_id) {
                debug!(room_id = %room_id, "Room served from cache");
                return Ok(room.clone());
            }
            match state.in_flight.get(&room_id) {
                Some(in_flight) => {
                    debug!(room_id = %room_id, "Joining in-flight room setup");
                    in_flight.clone()
                }
                None => {
                    let room = Arc::new(Room::new(address)?);
                    let setup = self.spawn_setup(room);
                    state.in_flight.insert(room_id.clone(), setup.clone());
                    setup
                }
            }
        };

        setup.await
    }

    /// Runs setup on its own task so it completes even if every caller stops waiting
    fn spawn_setup(&self, room: Arc<Room>) -> SetupFuture {
        let lifecycle = self.lifecycle.clone();
        let state = self.state.clone();
        let room_id = room.id().to_string();
        info!(room_id = %room_id, kind = %room.kind(), "Starting room setup");

        // The caller holds the registry lock until the in-flight entry is
        // inserted, so the task cannot remove it first.
        let task = tokio::spawn({
            let state = state.clone();
            let room_id = room_id.clone();
            async move {
                let result = lifecycle.setup(&room).await;
                let mut registry = lock(&state);
                registry.in_flight.remove(&room_id);
                match result {
                    Ok(()) => {
                        registry.cache.insert(room_id, room.clone());
                        Ok(room)
                    }
                    Err(e) => {
                        drop(registry);
                        warn!(room_id = %room_id, error = %e, "Room setup failed");
                        lifecycle.release(&room);
                        Err(e)
                    }
                }
            }
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    lock(&state).in_flight.remove(&room_id);
                    Err(ChatError::Internal(format!(
                        "setup for room {} did not finish: {}",
                        room_id, join_error
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Gets or creates the room and marks it as the most recently opened
    pub async fn open(&self, address: &str) -> Result<Arc<Room>, ChatError> {
        let room = self.get_or_create(address).await?;

        let mut state = self.state();
        state.open.retain(|open| !Arc::ptr_eq(open, &room));
        state.open.push(room.clone());
        debug!(room_id = %room.id(), open_rooms = state.open.len(), "Room opened");
        Ok(room)
    }

    /// Closes `room`, releasing its subscriptions, and moves to the next open room
    #[instrument(skip(self, room), fields(room_id = %room.id()))]
    pub fn close(&self, room: &Arc<Room>) -> CloseOutcome {
        let next = {
            let mut state = self.state();
            state.open.retain(|open| !Arc::ptr_eq(open, room));
            if state
                .cache
                .get(room.id())
                .is_some_and(|cached| Arc::ptr_eq(cached, room))
            {
                state.cache.remove(room.id());
            }
            state.open.last().cloned()
        };

        self.lifecycle.release(room);

        match next {
            Some(next) => {
                info!(next_room_id = %next.id(), "Closed room, switching to most recent");
                self.router
                    .navigate_to(ROOM_ROUTE, RouteParams::room(next.address()));
                CloseOutcome::Navigated(next)
            }
            None => {
                info!("Closed last open room");
                self.bus
                    .publish(&Topic::CloseWindow.to_string(), Value::Null);
                CloseOutcome::NoRoomsOpen
            }
        }
    }

    /// Starts listening for `open-room` navigation requests
    pub fn bind_to_events(&self) {
        let handle = self.bus.subscribe(
            &Topic::OpenRoom.to_string(),
            REGISTRY_OWNER,
            Arc::new(OpenRoomHandler::new(self.router.clone())),
        );
        *lock(&self.open_room_subscription) = Some(handle);
    }

    /// Stops listening for `open-room`
    pub fn unbind_events(&self) -> bool {
        match lock(&self.open_room_subscription).take() {
            Some(handle) => self.bus.unsubscribe(handle),
            None => false,
        }
    }

    pub fn cached(&self, room_id: &str) -> Option<Arc<Room>> {
        self.state().cache.get(room_id).cloned()
    }

    pub fn is_setup_in_flight(&self, room_id: &str) -> bool {
        self.state().in_flight.contains_key(room_id)
    }

    pub fn open_rooms(&self) -> Vec<Arc<Room>> {
        self.state().open.clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
