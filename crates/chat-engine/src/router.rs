//! Routes backend-pushed events and match-state transitions to the right
//! relationship.
//!
//! Events that do not match a tracked room or a known peer are logged and
//! dropped; unexpected backend state must never drive the engine.

use tracing::{debug, error, warn};

use chat_core::{
    peer_id_from, DelegateEvent, MatchEvent, MatchState, Membership, PeerId, PushEvent,
    RelationshipInput, RelationshipState,
};

use crate::engine::ChatEngine;

impl ChatEngine {
    pub(crate) async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Message {
                room_id,
                sender,
                body,
                timestamp_ms,
                ..
            } => self.route_message(&room_id, &sender, body, timestamp_ms),
            PushEvent::Membership {
                room_id,
                user_id,
                sender,
                membership,
            } => {
                self.route_membership(&room_id, &user_id, &sender, membership)
                    .await
            }
            PushEvent::DecryptionFailure {
                room_id, message, ..
            } => self.route_decryption_failure(&room_id, message),
            PushEvent::RoomSync {
                room_id,
                direct_user_id,
            } => self.route_room_sync(&room_id, direct_user_id).await,
        }
    }

    /// Match-state transitions pushed by the match-state source.
    pub(crate) async fn handle_match_event(&mut self, event: MatchEvent) {
        match event.state {
            MatchState::MutualMatch => {
                if let Err(err) = self.reconcile(event.peer_id).await {
                    self.report_internal(&err);
                }
            }
            _ => self.forget_all_rooms(event.peer_id).await,
        }
    }

    /// Application-requested re-creation of a broken room.
    pub(crate) async fn recreate_room(&mut self, peer_id: PeerId) {
        let Some(tracked) = self.registry.get_mut(peer_id) else {
            debug!(%peer_id, "re-creation requested without a tracked room");
            return;
        };

        if let Err(err) = tracked.machine.apply(RelationshipInput::RecreateRequested) {
            warn!(error = %err, %peer_id, "re-creation requested for a room that is not broken");
        }

        let room_id = tracked.room_id.clone();
        self.forget_room_best_effort(&room_id).await;
        if let Err(err) = self.reconcile(peer_id).await {
            self.report_internal(&err);
        }
    }

    fn route_message(&mut self, room_id: &str, sender: &str, body: String, timestamp_ms: u64) {
        let Some(peer_id) = self.registry.peer_for_room(room_id) else {
            debug!(%room_id, "message event for untracked room");
            return;
        };

        let event = if sender == self.own_user_id {
            DelegateEvent::Sent {
                peer_id,
                message: body,
                timestamp_ms,
            }
        } else {
            DelegateEvent::Received {
                peer_id,
                message: body,
                timestamp_ms,
            }
        };
        self.channels.emit(event);
    }

    async fn route_membership(
        &mut self,
        room_id: &str,
        user_id: &str,
        sender: &str,
        membership: Membership,
    ) {
        debug!(%room_id, %user_id, ?membership, "processing membership event");

        match membership {
            Membership::Join => {
                if user_id == self.own_user_id {
                    return;
                }
                let Some(peer_id) = peer_id_from(user_id) else {
                    warn!(%user_id, "join event from a non-peer user");
                    return;
                };
                if self.registry.peer_for_room(room_id) == Some(peer_id) {
                    if let Some(tracked) = self.registry.get_mut(peer_id) {
                        tracked.peer_joined = true;
                    }
                }
                self.channels.emit(DelegateEvent::ReadyToChat { peer_id });
            }
            Membership::Invite => {
                if user_id != self.own_user_id {
                    // We are only interested in invites for us.
                    debug!(%room_id, "invite event for another user");
                    return;
                }
                let Some(peer_id) = peer_id_from(sender) else {
                    warn!(%sender, "invite from a non-peer user");
                    return;
                };

                if self.matches.current(peer_id).await == MatchState::MutualMatch {
                    self.join_and_attach(room_id, peer_id).await;
                } else {
                    // A forced refresh may reveal the match; its push
                    // notification will then drive reconciliation.
                    if let Err(err) = self.refresh_match_state(peer_id, true).await {
                        warn!(error = %err, %peer_id, "match-state refresh after invite failed");
                    }
                }
            }
            Membership::Leave => {
                if user_id == self.own_user_id {
                    // We also receive our own leave state when first
                    // learning of a room; nothing to do.
                    debug!(%room_id, "own leave event");
                    return;
                }
                let Some(peer_id) = peer_id_from(user_id) else {
                    warn!(%user_id, "leave event from a non-peer user");
                    return;
                };

                self.forget_room_best_effort(room_id).await;
                if let Err(err) = self.refresh_match_state(peer_id, true).await {
                    warn!(error = %err, %peer_id, "match-state refresh after leave failed");
                }
            }
            Membership::Unknown => {
                warn!(%room_id, %user_id, "unexpected room membership");
            }
        }
    }

    async fn join_and_attach(&mut self, room_id: &str, peer_id: PeerId) {
        if let Err(err) = self.backend.join_room(room_id).await {
            error!(error = %err, %room_id, "cannot join room");
            self.channels.emit(DelegateEvent::CannotJoinRoom {
                message: err.to_string(),
            });
            return;
        }

        // A full pass settles which room is canonical and prunes the
        // rest, including a previously tracked room this invite displaces.
        if let Err(err) = self.reconcile(peer_id).await {
            self.report_internal(&err);
        }
    }

    fn route_decryption_failure(&mut self, room_id: &str, message: String) {
        let Some(peer_id) = self.registry.peer_for_room(room_id) else {
            warn!(%room_id, "decryption failure for untracked room");
            return;
        };
        let Some(tracked) = self.registry.get_mut(peer_id) else {
            return;
        };

        // Unrecoverable live decryption errors (for example unknown inbound
        // session IDs) leave the sender believing the message arrived. The
        // only way out is a new room, and that needs the user's consent.
        match tracked.machine.apply(RelationshipInput::LiveDecryptionFailure) {
            Ok(RelationshipState::Broken) => {
                self.channels
                    .emit(DelegateEvent::DecryptionError { peer_id, message });
            }
            Ok(state) => {
                warn!(%peer_id, ?state, "decryption failure left unexpected state");
            }
            Err(err) => {
                // Already broken or not yet attached; one delegate report
                // per broken room is enough.
                debug!(error = %err, %peer_id, "ignoring repeated decryption failure");
            }
        }
    }

    async fn route_room_sync(&mut self, room_id: &str, direct_user_id: Option<String>) {
        let Some(user_id) = direct_user_id else {
            debug!(%room_id, "synced non-direct room");
            return;
        };
        let Some(peer_id) = peer_id_from(&user_id) else {
            warn!(%user_id, "synced direct room with a non-peer user");
            return;
        };

        if self.registry.peer_for_room(room_id).is_some() {
            return;
        }
        if let Err(err) = self.reconcile(peer_id).await {
            self.report_internal(&err);
        }
    }
}
