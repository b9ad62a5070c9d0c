//! Sends messages to the canonical room of a relationship.
//!
//! Sending never creates rooms; that is reconciliation's job. A failed
//! send is classified once and retried at most once, then surfaced. The
//! `Sent` transcript entry comes from the backend echoing the message
//! through the timeline, not from here, so ordering has a single source
//! of truth.

use tracing::debug;

use chat_core::{CannotChatReason, ChatError, PeerId};

use crate::{engine::ChatEngine, recovery::Recovery};

impl ChatEngine {
    /// Send `message` to the canonical room of `peer_id`, returning the
    /// local echo event ID.
    pub(crate) async fn send_message(
        &mut self,
        peer_id: PeerId,
        message: &str,
    ) -> Result<String, ChatError> {
        let Some(room_id) = self.registry.room_for(peer_id).map(str::to_owned) else {
            return Err(ChatError::CannotChat {
                peer_id,
                reason: CannotChatReason::NotJoined,
            });
        };

        let error = match self.backend.send_text(&room_id, message).await {
            Ok(echo_id) => return Ok(echo_id),
            Err(error) => error,
        };

        debug!(error = %error, %room_id, %peer_id, "send failed; classifying");
        let retry_room_id = match self.classify_failure(error, &room_id, peer_id).await {
            Recovery::Retry => room_id,
            Recovery::RetryAfterRecreate => {
                let Some(new_room_id) = self.registry.room_for(peer_id).map(str::to_owned) else {
                    return Err(ChatError::CannotChat {
                        peer_id,
                        reason: CannotChatReason::NotJoined,
                    });
                };
                new_room_id
            }
            Recovery::TreatAsUnmatched => {
                return Err(ChatError::CannotChat {
                    peer_id,
                    reason: CannotChatReason::Unmatched,
                })
            }
            Recovery::Fatal(err) => return Err(err),
        };

        // Exactly one retry; any further failure is surfaced.
        self.backend
            .send_text(&retry_room_id, message)
            .await
            .map_err(ChatError::Sdk)
    }
}
