//! Replays a room's missed history once after attaching to it.
//!
//! Stored events are partitioned into plain and encrypted ones, the
//! encrypted partition is bulk-decrypted, and everything is merged into a
//! single chronological catch-up batch. Later events arrive through the
//! live router path, never through this pipeline.

use tracing::{debug, error, warn};

use chat_core::{
    merge_catch_up, ChatError, DelegateEvent, MessageDirection, PeerId, RelationshipInput,
    StoredEvent, StoredEventContent, Transcript,
};

use crate::engine::ChatEngine;

impl ChatEngine {
    /// Attach the history pipeline to `room_id` and emit the catch-up
    /// batch exactly once.
    ///
    /// Attaching twice to the same tracked room is a no-op. Failure to
    /// obtain the stored history or the live timeline is fatal for this
    /// room: its tracking state is dropped so the next reconciliation
    /// starts from scratch.
    pub(crate) async fn attach_history(
        &mut self,
        peer_id: PeerId,
        room_id: &str,
    ) -> Result<(), ChatError> {
        if let Some(tracked) = self.registry.get(peer_id) {
            if tracked.room_id == room_id && tracked.timeline.is_some() {
                debug!(%room_id, %peer_id, "already listening on room");
                return Ok(());
            }
        }

        let last_read_ms = self.last_reads.get(&peer_id).copied().unwrap_or(0);

        let stored = match self.backend.stored_events(room_id).await {
            Ok(stored) => stored,
            Err(err) => {
                error!(error = %err, %room_id, "enumerating stored history failed");
                self.registry.remove_room(room_id);
                return Err(ChatError::Sdk(err));
            }
        };

        let timeline = match self.backend.live_timeline(room_id).await {
            Ok(timeline) => timeline,
            Err(err) => {
                error!(error = %err, %room_id, "no live timeline; dropping room tracking");
                self.registry.remove_room(room_id);
                return Err(ChatError::Sdk(err));
            }
        };

        let mut plain = Vec::new();
        let mut encrypted = Vec::new();
        for event in stored {
            match event.content {
                StoredEventContent::Plain { ref body } => {
                    let entry =
                        self.transcript_entry(&event.sender, body.clone(), event.timestamp_ms);
                    plain.push(entry);
                }
                StoredEventContent::Encrypted => encrypted.push(event),
            }
        }

        let decrypted = if encrypted.is_empty() {
            Vec::new()
        } else {
            self.decrypt_catch_up(room_id, &timeline, encrypted).await
        };

        let batch = merge_catch_up(plain, decrypted, last_read_ms);

        if let Some(tracked) = self.registry.get_mut(peer_id) {
            tracked.timeline = Some(timeline);
            if let Err(err) = tracked.machine.apply(RelationshipInput::RoomAttached) {
                warn!(error = %err, %peer_id, "attached in unexpected lifecycle state");
            }
        }

        self.channels.emit(DelegateEvent::CatchUp {
            peer_id,
            messages: batch.messages,
            unread_count: batch.unread_count,
        });
        Ok(())
    }

    /// Bulk-decrypt the encrypted partition of the stored history.
    ///
    /// Events that still fail to decrypt are reported per event and
    /// skipped; they never abort the batch.
    async fn decrypt_catch_up(
        &mut self,
        room_id: &str,
        timeline: &crate::facade::TimelineHandle,
        encrypted: Vec<StoredEvent>,
    ) -> Vec<Transcript> {
        let batch = match self.backend.decrypt_events(timeline, encrypted).await {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, %room_id, "bulk decryption failed; replaying plain only");
                return Vec::new();
            }
        };

        for event_id in &batch.failed {
            warn!(%event_id, %room_id, "could not decrypt stored event");
        }

        batch
            .decrypted
            .into_iter()
            .filter_map(|event| match event.content {
                StoredEventContent::Plain { body } => {
                    Some(self.transcript_entry(&event.sender, body, event.timestamp_ms))
                }
                StoredEventContent::Encrypted => None,
            })
            .collect()
    }

    pub(crate) fn transcript_entry(
        &self,
        sender: &str,
        message: String,
        timestamp_ms: u64,
    ) -> Transcript {
        let direction = if sender == self.own_user_id {
            MessageDirection::Sent
        } else {
            MessageDirection::Received
        };
        Transcript {
            direction,
            message,
            timestamp_ms,
        }
    }
}
