use std::collections::HashMap;

use chat_core::{PeerId, RelationshipState, RelationshipStateMachine};

use crate::facade::TimelineHandle;

/// Bookkeeping for the single canonical room of one relationship.
#[derive(Debug, Clone)]
pub struct TrackedRoom {
    /// The canonical room ID.
    pub room_id: String,
    /// Live timeline handle, present once the history pipeline attached.
    pub timeline: Option<TimelineHandle>,
    /// Whether the counterparty's membership reached `Join`.
    pub peer_joined: bool,
    /// Lifecycle state of the relationship.
    pub machine: RelationshipStateMachine,
}

/// Outcome of registering a room for a relationship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// The relationship had no tracked room before.
    New,
    /// The same room was already tracked; existing state is kept.
    AlreadyTracked,
    /// A different room was tracked and has been displaced.
    Replaced {
        /// Room ID that was previously canonical.
        previous_room_id: String,
    },
}

/// In-memory map from relationship to its canonical room.
///
/// Owned exclusively by the engine task; holds at most one entry per
/// relationship at any time.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<PeerId, TrackedRoom>,
    by_room: HashMap<String, PeerId>,
}

impl RoomRegistry {
    /// Designate `room_id` as canonical for `peer_id`.
    pub fn track(&mut self, peer_id: PeerId, room_id: &str) -> TrackOutcome {
        if let Some(tracked) = self.rooms.get(&peer_id) {
            if tracked.room_id == room_id {
                return TrackOutcome::AlreadyTracked;
            }
        }

        let previous = self.remove(peer_id);
        self.by_room.insert(room_id.to_owned(), peer_id);
        self.rooms.insert(
            peer_id,
            TrackedRoom {
                room_id: room_id.to_owned(),
                timeline: None,
                peer_joined: false,
                machine: RelationshipStateMachine::default(),
            },
        );

        match previous {
            Some(tracked) => TrackOutcome::Replaced {
                previous_room_id: tracked.room_id,
            },
            None => TrackOutcome::New,
        }
    }

    pub fn get(&self, peer_id: PeerId) -> Option<&TrackedRoom> {
        self.rooms.get(&peer_id)
    }

    pub fn get_mut(&mut self, peer_id: PeerId) -> Option<&mut TrackedRoom> {
        self.rooms.get_mut(&peer_id)
    }

    /// Canonical room ID for `peer_id`, when one is tracked.
    pub fn room_for(&self, peer_id: PeerId) -> Option<&str> {
        self.rooms.get(&peer_id).map(|tracked| tracked.room_id.as_str())
    }

    /// Relationship a room belongs to, when the room is tracked.
    pub fn peer_for_room(&self, room_id: &str) -> Option<PeerId> {
        self.by_room.get(room_id).copied()
    }

    /// Drop the registry entry for `peer_id`.
    pub fn remove(&mut self, peer_id: PeerId) -> Option<TrackedRoom> {
        let tracked = self.rooms.remove(&peer_id)?;
        self.by_room.remove(&tracked.room_id);
        Some(tracked)
    }

    /// Drop the registry entry owning `room_id`.
    pub fn remove_room(&mut self, room_id: &str) -> Option<(PeerId, TrackedRoom)> {
        let peer_id = self.by_room.remove(room_id)?;
        let tracked = self.rooms.remove(&peer_id)?;
        Some((peer_id, tracked))
    }

    /// Lifecycle state of a relationship; `Idle` when untracked.
    pub fn state_of(&self, peer_id: PeerId) -> RelationshipState {
        self.rooms
            .get(&peer_id)
            .map(|tracked| tracked.machine.state())
            .unwrap_or(RelationshipState::Idle)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
