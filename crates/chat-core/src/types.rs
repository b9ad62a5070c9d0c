use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ChatError;

/// Opaque, stable identifier of the other party of a conversation.
///
/// Issued externally (by the account layer); never changes for the lifetime
/// of a relationship.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Generate a fresh random peer identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

/// Externally owned match state of a relationship.
///
/// Only `MutualMatch` justifies a room existing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchState {
    /// No pin in either direction.
    Unmatched,
    /// We pinned them, they have not pinned back.
    Pinned,
    /// Both parties pinned each other.
    MutualMatch,
}

/// Room membership status of one party, as reported by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Membership {
    Join,
    Invite,
    Leave,
    /// The backend has no membership state for this party yet.
    Unknown,
}

/// One direct room the backend associates with a counterparty, together
/// with both parties' membership. Several of these may exist concurrently
/// for the same relationship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateRoom {
    /// Backend room ID.
    pub room_id: String,
    /// Our own membership in the room.
    pub our_membership: Membership,
    /// The counterparty's membership in the room.
    pub their_membership: Membership,
}

/// Direction of a transcript entry relative to the local user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageDirection {
    Sent,
    Received,
}

/// One decrypted, display-ready message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcript {
    /// Whether the local user authored the message.
    pub direction: MessageDirection,
    /// Message body.
    pub message: String,
    /// Event timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
}

/// Content of a stored timeline event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StoredEventContent {
    /// Plain message event, decoded immediately.
    Plain {
        /// Message body.
        body: String,
    },
    /// Encrypted event, batched for bulk decryption.
    Encrypted,
}

/// One event from a room's stored history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredEvent {
    /// Backend event ID.
    pub event_id: String,
    /// Sender's backend user ID.
    pub sender: String,
    /// Event timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
    /// Plain or still-encrypted payload.
    pub content: StoredEventContent,
}

/// Event pushed by the chat backend through its sync stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PushEvent {
    /// A party's room membership changed.
    Membership {
        /// Room the change applies to.
        room_id: String,
        /// User whose membership changed.
        user_id: String,
        /// User who caused the change (inviter for invites).
        sender: String,
        /// New membership value.
        membership: Membership,
    },
    /// A live message event arrived in a room.
    Message {
        /// Room the message belongs to.
        room_id: String,
        /// Backend event ID.
        event_id: String,
        /// Sender's backend user ID.
        sender: String,
        /// Decrypted message body.
        body: String,
        /// Event timestamp in milliseconds since Unix epoch.
        timestamp_ms: u64,
    },
    /// A live event could not be decrypted.
    DecryptionFailure {
        /// Room the broken event belongs to.
        room_id: String,
        /// Sender's backend user ID.
        sender: String,
        /// Backend decryption error description.
        message: String,
    },
    /// The backend synced a room for the first time.
    RoomSync {
        /// Room that was synced.
        room_id: String,
        /// Direct-chat counterparty user ID, when the room is direct.
        direct_user_id: Option<String>,
    },
}

/// Match-state transition pushed by the external match-state source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEvent {
    /// Relationship the transition applies to.
    pub peer_id: PeerId,
    /// New match state.
    pub state: MatchState,
}

/// Command channel input accepted by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// Run a reconciliation pass for a relationship.
    Reconcile {
        /// Target relationship.
        peer_id: PeerId,
    },
    /// Ask whether a message to `peer_id` could currently be delivered.
    CanChat {
        /// Target relationship.
        peer_id: PeerId,
        /// `None` when chatting is possible, the blocking error otherwise.
        reply: oneshot::Sender<Option<ChatError>>,
    },
    /// Send a text message to the canonical room of a relationship.
    Send {
        /// Target relationship.
        peer_id: PeerId,
        /// Message body.
        message: String,
        /// Local echo event ID on success.
        reply: oneshot::Sender<Result<String, ChatError>>,
    },
    /// Send read receipts for all messages with a relationship.
    MarkAllRead {
        /// Target relationship.
        peer_id: PeerId,
    },
    /// Register the push token with the backend's push gateway.
    ConfigurePusher {
        /// Raw device token bytes.
        device_token: Vec<u8>,
    },
    /// Forget a broken room and derive a fresh one (after the delegate was
    /// informed of an unrecoverable decryption error).
    RecreateRoom {
        /// Target relationship.
        peer_id: PeerId,
    },
    /// Match-state transition pushed by the match-state source.
    MatchChanged(MatchEvent),
    /// Event pushed by the chat backend.
    Backend(PushEvent),
}

/// Delegate callback emitted by the engine toward the UI layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DelegateEvent {
    /// A message from the counterparty arrived.
    Received {
        /// Relationship the message belongs to.
        peer_id: PeerId,
        /// Message body.
        message: String,
        /// Event timestamp in milliseconds since Unix epoch.
        timestamp_ms: u64,
    },
    /// One of our own messages was echoed back through the timeline.
    Sent {
        /// Relationship the message belongs to.
        peer_id: PeerId,
        /// Message body.
        message: String,
        /// Event timestamp in milliseconds since Unix epoch.
        timestamp_ms: u64,
    },
    /// Missed history replayed once after attaching to a room.
    CatchUp {
        /// Relationship the batch belongs to.
        peer_id: PeerId,
        /// Chronologically ordered transcript entries.
        messages: Vec<Transcript>,
        /// Entries newer than the last read timestamp.
        unread_count: usize,
    },
    /// The counterparty joined the canonical room.
    ReadyToChat {
        /// Relationship that became ready.
        peer_id: PeerId,
    },
    /// A live event could not be decrypted; the room is broken until the
    /// application requests `EngineCommand::RecreateRoom`.
    DecryptionError {
        /// Relationship with the broken room.
        peer_id: PeerId,
        /// Backend decryption error description.
        message: String,
    },
    /// Joining a room we were invited to failed.
    CannotJoinRoom {
        /// Backend error description.
        message: String,
    },
    /// Registering the push token failed.
    PusherConfigurationFailed {
        /// Backend error description.
        message: String,
    },
    /// An engine-internal operation failed outside a user-initiated call.
    InternalError {
        /// Error description.
        message: String,
    },
}
