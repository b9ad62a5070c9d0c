use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-relationship room lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelationshipState {
    /// No room is tracked for the relationship.
    Idle,
    /// A canonical room is being derived/joined.
    RoomSyncing,
    /// The canonical room is resolved and its timeline attached.
    RoomReady,
    /// A live event could not be decrypted; waiting for an explicit
    /// room re-creation request.
    Broken,
}

/// Input driving a relationship lifecycle transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RelationshipInput {
    /// Match state became mutual.
    MatchFound,
    /// The backend pushed an invite or room-sync for this relationship.
    InvitePushed,
    /// The canonical room's live timeline was attached.
    RoomAttached,
    /// Match state left mutual.
    Unmatched,
    /// The counterparty left the room voluntarily.
    PeerLeft,
    /// The backend reported an unrecoverable decryption error for a
    /// live event.
    LiveDecryptionFailure,
    /// The application requested re-creation of a broken room.
    RecreateRequested,
}

/// Attempted transition that is not part of the lifecycle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot apply {input:?} while relationship is in state {state:?}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub state: RelationshipState,
    /// Rejected input.
    pub input: RelationshipInput,
}

/// Lifecycle state machine for one relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipStateMachine {
    state: RelationshipState,
}

impl Default for RelationshipStateMachine {
    fn default() -> Self {
        Self {
            state: RelationshipState::Idle,
        }
    }
}

impl RelationshipStateMachine {
    pub fn state(&self) -> RelationshipState {
        self.state
    }

    /// Apply one input, returning the new state.
    ///
    /// Repeated notifications of an already-reached state (a second
    /// `MatchFound` while syncing, a second `RoomAttached` while ready)
    /// are accepted as no-ops, since reconciliation is idempotent.
    pub fn apply(
        &mut self,
        input: RelationshipInput,
    ) -> Result<RelationshipState, InvalidTransition> {
        use RelationshipInput::*;
        use RelationshipState::*;

        let next = match (self.state, input) {
            (Idle, MatchFound) | (Idle, InvitePushed) => RoomSyncing,
            (RoomSyncing, MatchFound) | (RoomSyncing, InvitePushed) => RoomSyncing,
            (RoomSyncing, RoomAttached) => RoomReady,
            (RoomReady, MatchFound) | (RoomReady, RoomAttached) => RoomReady,
            (RoomSyncing, Unmatched) | (RoomSyncing, PeerLeft) => Idle,
            (RoomReady, Unmatched) | (RoomReady, PeerLeft) => Idle,
            (RoomReady, LiveDecryptionFailure) => Broken,
            (Broken, RecreateRequested) => RoomSyncing,
            (Broken, Unmatched) | (Broken, PeerLeft) => Idle,
            (Idle, Unmatched) => Idle,
            (state, input) => return Err(InvalidTransition { state, input }),
        };

        self.state = next;
        Ok(next)
    }
}
