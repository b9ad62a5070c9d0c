//! Core contract shared between the chat engine and its consumers.
//!
//! This crate defines the command/delegate protocol, the relationship
//! lifecycle model, peer identity mapping, catch-up merge helpers, and
//! common error/channel abstractions. It performs no I/O.

/// Async command/delegate channel primitives.
pub mod channel;
/// Engine-boundary and backend error types.
pub mod error;
/// Peer ID to backend user ID mapping.
pub mod identity;
/// Relationship lifecycle state machine.
pub mod state_machine;
/// Catch-up batch merge utilities.
pub mod transcript;
/// Protocol types (commands, delegate events, payloads).
pub mod types;

pub use channel::{DelegateStream, EngineChannelError, EngineChannels};
pub use error::{BackendError, CannotChatReason, ChatError};
pub use identity::{chat_user_id, peer_id_from};
pub use state_machine::{
    InvalidTransition, RelationshipInput, RelationshipState, RelationshipStateMachine,
};
pub use transcript::{CatchUpBatch, merge_catch_up};
pub use types::{
    CandidateRoom, DelegateEvent, EngineCommand, MatchEvent, MatchState, Membership,
    MessageDirection, PeerId, PushEvent, StoredEvent, StoredEventContent, Transcript,
};
