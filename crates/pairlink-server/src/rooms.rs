//! Active call-room tracking.
//!
//! A tracked room holds the occupants of one anonymous call. When an
//! occupant leaves, the oldest waiter (if any) is pulled in under the same
//! room id to keep the room populated; otherwise the room is torn down. A
//! room id never maps to an empty occupant list.

use std::collections::HashMap;

use crate::{
    matchmaker::{MatchQueue, WaitingEntry},
    registry::ConnectionId,
};

/// One occupant of a call room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupant {
    /// Connection participating in the call.
    pub connection_id: ConnectionId,
    /// Client-supplied user identifier.
    pub user_id: String,
}

impl From<WaitingEntry> for Occupant {
    fn from(entry: WaitingEntry) -> Self {
        Self { connection_id: entry.connection_id, user_id: entry.user_id }
    }
}

/// Outcome of removing an occupant from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VacateOutcome {
    /// The room id is not tracked; nothing changed.
    NotTracked,
    /// The connection was not an occupant of the room; nothing changed.
    NotOccupant,
    /// The departing occupant left a partner behind and a waiter was pulled
    /// in under the same room id.
    Backfilled {
        /// The occupant who stayed.
        remaining: Occupant,
        /// The waiter who took the vacated slot.
        joined: Occupant,
    },
    /// The room was deleted.
    Deleted {
        /// Occupant left alone when no waiter was available. The caller
        /// clears this connection's room binding.
        survivor: Option<Occupant>,
    },
}

/// Tracker of active call rooms and their occupants.
#[derive(Debug, Default)]
pub struct RoomTracker {
    rooms: HashMap<String, Vec<Occupant>>,
}

impl RoomTracker {
    /// Create a new empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly matched pair under a new room id.
    pub fn insert_pair(&mut self, room_id: String, pair: [Occupant; 2]) {
        self.rooms.insert(room_id, pair.into());
    }

    /// Occupants of a room. `None` if the room is not tracked.
    pub fn occupants(&self, room_id: &str) -> Option<&[Occupant]> {
        self.rooms.get(room_id).map(Vec::as_slice)
    }

    /// Whether a room id is tracked.
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of tracked rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether no room is tracked.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Remove one occupant from a room, backfilling or tearing down.
    ///
    /// When exactly one occupant remains and the queue is non-empty, the
    /// oldest waiter is assigned this room id and both parties are reported
    /// for notification. Otherwise the room is deleted - a room is never
    /// left tracked with fewer than two occupants between events.
    pub fn vacate(
        &mut self,
        room_id: &str,
        connection_id: ConnectionId,
        queue: &mut MatchQueue,
    ) -> VacateOutcome {
        let Some(occupants) = self.rooms.get_mut(room_id) else {
            return VacateOutcome::NotTracked;
        };
        let Some(index) = occupants.iter().position(|o| o.connection_id == connection_id) else {
            return VacateOutcome::NotOccupant;
        };
        occupants.remove(index);

        if let Some(remaining) = occupants.first().cloned() {
            if let Some(waiter) = queue.pop_front() {
                let joined = Occupant::from(waiter);
                occupants.push(joined.clone());
                return VacateOutcome::Backfilled { remaining, joined };
            }
            self.rooms.remove(room_id);
            return VacateOutcome::Deleted { survivor: Some(remaining) };
        }

        self.rooms.remove(room_id);
        VacateOutcome::Deleted { survivor: None }
    }
}
