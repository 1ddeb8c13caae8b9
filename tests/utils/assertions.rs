//! Test assertion helpers - fluent API for verifying room state
#![allow(dead_code)] // Test utilities may not all be used in every test

use chatroom::{LifecycleState, Room};

// ============================================================================
// Assertion Helpers
// ============================================================================

pub struct RoomAssertion<'a> {
    room: &'a Room,
}

impl<'a> RoomAssertion<'a> {
    pub fn for_room(room: &'a Room) -> Self {
        Self { room }
    }

    pub fn is_in(self, expected: LifecycleState) -> Self {
        assert_eq!(
            self.room.lifecycle(),
            expected,
            "room {} is in the wrong lifecycle state",
            self.room.id()
        );
        self
    }

    pub fn is_active(self) -> Self {
        assert!(
            self.room.is_activated(),
            "room {} should be active, is {}",
            self.room.id(),
            self.room.lifecycle()
        );
        self
    }

    pub fn has_subject(self, expected: Option<&str>) -> Self {
        assert_eq!(self.room.subject().as_deref(), expected);
        self
    }

    pub fn has_message_ids(self, expected: &[&str]) -> Self {
        let ids: Vec<String> = self.room.messages().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, expected, "room {} messages differ", self.room.id());
        self
    }

    pub fn has_occupants(self, expected: &[&str]) -> Self {
        let ids: Vec<String> = self
            .room
            .occupants()
            .iter()
            .map(|o| o.id.clone())
            .collect();
        assert_eq!(ids, expected, "room {} occupants differ", self.room.id());
        self
    }

    pub fn has_no_pending(self) -> Self {
        assert!(
            self.room.pending_messages().is_empty(),
            "room {} still has pending messages",
            self.room.id()
        );
        self
    }
}
