use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PeerId;

/// Why a relationship currently cannot chat.
///
/// All of these are recoverable by user action (re-pin, wait) rather than
/// by automatic retry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CannotChatReason {
    /// No canonical room is registered for the relationship.
    NotJoined,
    /// The counterparty has no chat profile on the backend.
    NoProfile,
    /// The backend cannot enable end-to-end encryption for the counterparty.
    NoEncryption,
    /// The relationship is no longer a mutual match.
    Unmatched,
}

impl fmt::Display for CannotChatReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            CannotChatReason::NotJoined => "not joined",
            CannotChatReason::NoProfile => "no chat profile",
            CannotChatReason::NoEncryption => "no encryption",
            CannotChatReason::Unmatched => "unmatched",
        };
        f.write_str(reason)
    }
}

/// Error reported by the chat backend facade.
///
/// The variants distinguish exactly the signals the recovery classifier
/// acts on; everything else is carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend rejected an operation in a room we are not entitled to.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Backend error description.
        message: String,
    },
    /// Sending hit encryption devices the session does not know yet.
    #[error("unknown encryption devices: {devices:?}")]
    UnknownDevices {
        /// Device IDs that need to be trusted before retrying.
        devices: Vec<String>,
    },
    /// The backend has no room with the given ID.
    #[error("room not found: {room_id}")]
    RoomNotFound {
        /// Requested room ID.
        room_id: String,
    },
    /// Transient network or transport failure.
    #[error("network failure: {message}")]
    Network {
        /// Transport error description.
        message: String,
    },
    /// Any other backend/protocol error, surfaced verbatim.
    #[error("backend error {code}: {message}")]
    Protocol {
        /// Stable backend error code.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Engine-boundary error taxonomy.
///
/// Reconciliation and recovery never throw past the engine boundary; all
/// failures are delivered through result channels carrying this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Chatting with `peer_id` is currently impossible for a
    /// human-actionable reason.
    #[error("cannot chat with {peer_id}: {reason}")]
    CannotChat {
        /// Affected relationship.
        peer_id: PeerId,
        /// Human-actionable reason.
        reason: CannotChatReason,
    },
    /// Opaque backend error, surfaced verbatim and not retried further.
    #[error(transparent)]
    Sdk(#[from] BackendError),
    /// Unexpected invariant violation; logged and surfaced, never swallowed.
    #[error("internal error: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_cannot_chat_with_reason() {
        let err = ChatError::CannotChat {
            peer_id: PeerId(uuid::Uuid::nil()),
            reason: CannotChatReason::NoEncryption,
        };
        assert_eq!(
            err.to_string(),
            "cannot chat with 00000000-0000-0000-0000-000000000000: no encryption"
        );
    }

    #[test]
    fn surfaces_backend_errors_transparently() {
        let err = ChatError::from(BackendError::Protocol {
            code: "M_LIMIT_EXCEEDED".into(),
            message: "slow down".into(),
        });
        assert_eq!(err.to_string(), "backend error M_LIMIT_EXCEEDED: slow down");
    }

    #[test]
    fn keeps_error_payloads_serializable() {
        let err = ChatError::CannotChat {
            peer_id: PeerId(uuid::Uuid::nil()),
            reason: CannotChatReason::Unmatched,
        };
        let json = serde_json::to_string(&err).expect("error should serialize");
        let back: ChatError = serde_json::from_str(&json).expect("error should deserialize");
        assert_eq!(back, err);
    }
}
