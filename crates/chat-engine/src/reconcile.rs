//! Derives the canonical room of a relationship from backend state.
//!
//! The backend may hold zero, one, or several direct rooms for the same
//! counterparty (simultaneous creation on both sides, leftovers from a
//! previous match cycle). Each reconciliation pass collapses that set to
//! at most one room and prunes the rest.

use tracing::{debug, warn};

use chat_core::{
    chat_user_id, BackendError, CandidateRoom, CannotChatReason, ChatError, MatchState, Membership,
    PeerId, RelationshipInput, RelationshipState,
};

use crate::engine::ChatEngine;

/// How the winning candidate was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Selection {
    /// Both parties are joined; the room is ready as-is.
    BothJoined,
    /// The peer invited us; we still need to join.
    TheyInvitedUs,
    /// We invited the peer; keep listening for their join.
    WeInvitedThem,
}

/// Pick the canonical candidate by fixed policy priority:
/// both-joined > they-invited-us > we-invited-them. Ties within one
/// priority level keep backend enumeration order.
pub(crate) fn select_candidate(
    candidates: &[CandidateRoom],
) -> Option<(&CandidateRoom, Selection)> {
    if let Some(candidate) = candidates
        .iter()
        .find(|c| c.our_membership == Membership::Join && c.their_membership == Membership::Join)
    {
        return Some((candidate, Selection::BothJoined));
    }

    if let Some(candidate) = candidates
        .iter()
        .find(|c| c.our_membership == Membership::Invite)
    {
        // Very likely the peer is joined here, since they were when they
        // invited us.
        return Some((candidate, Selection::TheyInvitedUs));
    }

    if let Some(candidate) = candidates
        .iter()
        .find(|c| c.their_membership == Membership::Invite)
    {
        return Some((candidate, Selection::WeInvitedThem));
    }

    None
}

impl ChatEngine {
    /// Run one reconciliation pass for `peer_id`.
    ///
    /// Idempotent; calls for the same relationship are serialized by the
    /// engine queue.
    pub(crate) async fn reconcile(&mut self, peer_id: PeerId) -> Result<(), ChatError> {
        if self.matches.current(peer_id).await != MatchState::MutualMatch {
            self.forget_all_rooms(peer_id).await;
            return Ok(());
        }

        let user_id = chat_user_id(peer_id, &self.home_server);
        let infos = self
            .backend
            .direct_room_infos(&user_id)
            .await
            .map_err(|err| {
                warn!(error = %err, %peer_id, "listing candidate rooms failed");
                ChatError::CannotChat {
                    peer_id,
                    reason: CannotChatReason::NotJoined,
                }
            })?;

        // Rooms the peer already left are useless regardless of priority;
        // drop them right away.
        let mut candidates = Vec::new();
        for info in infos {
            let they_in = matches!(
                info.their_membership,
                Membership::Join | Membership::Invite | Membership::Unknown
            );
            if they_in {
                candidates.push(info);
            } else {
                debug!(room_id = %info.room_id, %peer_id, "pruning room the peer left");
                self.forget_room_best_effort(&info.room_id).await;
            }
        }

        let (room_id, selection, peer_joined) = match select_candidate(&candidates) {
            Some((candidate, selection)) => (
                candidate.room_id.clone(),
                Some(selection),
                candidate.their_membership == Membership::Join,
            ),
            None => (self.create_fresh_room(peer_id, &user_id).await?, None, false),
        };

        for candidate in &candidates {
            if candidate.room_id != room_id {
                self.forget_room_best_effort(&candidate.room_id).await;
            }
        }

        if selection == Some(Selection::TheyInvitedUs) {
            if let Err(err) = self.backend.join_room(&room_id).await {
                warn!(error = %err, %room_id, "cannot join room we were invited to");
                self.channels
                    .emit(chat_core::DelegateEvent::CannotJoinRoom {
                        message: err.to_string(),
                    });
                return Ok(());
            }
        }

        // A broken room stays broken until the application explicitly asks
        // for re-creation; do not silently re-attach it.
        if self.registry.state_of(peer_id) == RelationshipState::Broken
            && self.registry.room_for(peer_id) == Some(room_id.as_str())
        {
            debug!(%peer_id, "room is broken; waiting for explicit re-creation");
            return Ok(());
        }

        self.registry.track(peer_id, &room_id);
        if let Some(tracked) = self.registry.get_mut(peer_id) {
            tracked.peer_joined = peer_joined;
            if let Err(err) = tracked.machine.apply(RelationshipInput::MatchFound) {
                warn!(error = %err, %peer_id, "unexpected lifecycle state during reconciliation");
            }
        }

        self.attach_history(peer_id, &room_id).await
    }

    /// Create a fresh encrypted direct room with `peer_id`.
    async fn create_fresh_room(
        &mut self,
        peer_id: PeerId,
        user_id: &str,
    ) -> Result<String, ChatError> {
        if !self.backend.has_profile(user_id).await.map_err(ChatError::Sdk)? {
            return Err(ChatError::CannotChat {
                peer_id,
                reason: CannotChatReason::NoProfile,
            });
        }

        if !self
            .backend
            .can_enable_encryption(user_id)
            .await
            .map_err(ChatError::Sdk)?
        {
            return Err(ChatError::CannotChat {
                peer_id,
                reason: CannotChatReason::NoEncryption,
            });
        }

        let room_id = self
            .backend
            .create_direct_room(user_id, true)
            .await
            .map_err(ChatError::Sdk)?;
        debug!(%room_id, %peer_id, "created fresh direct room");
        Ok(room_id)
    }

    /// Leave a room and drop all bookkeeping tied to it.
    pub(crate) async fn forget_room(&mut self, room_id: &str) -> Result<(), BackendError> {
        if let Some((peer_id, _)) = self.registry.remove_room(room_id) {
            debug!(%room_id, %peer_id, "dropping canonical room");
        }
        self.backend.leave_room(room_id).await
    }

    /// Leave a room, logging instead of surfacing errors.
    pub(crate) async fn forget_room_best_effort(&mut self, room_id: &str) {
        if let Err(err) = self.forget_room(room_id).await {
            warn!(error = %err, %room_id, "leaving room failed");
        }
    }

    /// Action when a relationship is no longer a mutual match: drop the
    /// registry entry and leave every direct room with the peer.
    pub(crate) async fn forget_all_rooms(&mut self, peer_id: PeerId) {
        self.registry.remove(peer_id);

        let user_id = chat_user_id(peer_id, &self.home_server);
        match self.backend.direct_room_infos(&user_id).await {
            Ok(infos) => {
                for info in infos {
                    self.forget_room_best_effort(&info.room_id).await;
                }
            }
            Err(err) => warn!(error = %err, %peer_id, "listing rooms to forget failed"),
        }
    }

    /// Re-validate the match state with the origin server; a relationship
    /// that is no longer mutual loses all of its rooms.
    pub(crate) async fn refresh_match_state(
        &mut self,
        peer_id: PeerId,
        force: bool,
    ) -> Result<MatchState, BackendError> {
        let state = self.matches.refresh(peer_id, force).await?;
        if state != MatchState::MutualMatch {
            self.forget_all_rooms(peer_id).await;
        }
        Ok(state)
    }
}
