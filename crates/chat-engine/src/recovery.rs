//! Classifies failed backend operations and applies their remedy.
//!
//! Only errors with a known, safe, automatic remedy are retried;
//! everything else is surfaced verbatim. The classifier runs at most once
//! per user-initiated operation, so there is no room for retry loops.

use tracing::{debug, warn};

use chat_core::{BackendError, ChatError, MatchState, PeerId};

use crate::engine::ChatEngine;

/// Remedy decided for one failed backend operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// The failure was repaired in place; retry against the same room.
    Retry,
    /// The offending room was forgotten and a fresh one reconciled;
    /// retry against the relationship's new canonical room.
    RetryAfterRecreate,
    /// The relationship is no longer a mutual match.
    TreatAsUnmatched,
    /// No automatic remedy; surface to the caller unmodified.
    Fatal(ChatError),
}

impl ChatEngine {
    /// Classify `error` from an operation in `room_id` and apply the
    /// remedy.
    pub(crate) async fn classify_failure(
        &mut self,
        error: BackendError,
        room_id: &str,
        peer_id: PeerId,
    ) -> Recovery {
        match error {
            BackendError::Forbidden { message } => {
                debug!(%room_id, %peer_id, %message, "forgetting room after forbidden error");
                self.forget_room_best_effort(room_id).await;

                match self.refresh_match_state(peer_id, true).await {
                    Ok(MatchState::MutualMatch) => match self.reconcile(peer_id).await {
                        Ok(()) => Recovery::RetryAfterRecreate,
                        Err(err) => Recovery::Fatal(err),
                    },
                    Ok(_) => Recovery::TreatAsUnmatched,
                    Err(err) => {
                        warn!(error = %err, %peer_id, "cannot re-validate match state");
                        Recovery::Fatal(ChatError::Sdk(err))
                    }
                }
            }
            BackendError::UnknownDevices { devices } => {
                // We trust all devices by default; not the best security,
                // but the product decision for now.
                match self.backend.trust_devices(&devices).await {
                    Ok(()) => Recovery::Retry,
                    Err(err) => Recovery::Fatal(ChatError::Sdk(err)),
                }
            }
            other => Recovery::Fatal(ChatError::Sdk(other)),
        }
    }
}
