use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chat_core::{BackendError, CandidateRoom, StoredEvent};

/// Opaque handle for a room's live timeline, issued by the backend.
///
/// The engine owns every handle it obtains; no other component may open
/// or close one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineHandle(pub String);

/// Result of bulk-decrypting a batch of stored events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptedBatch {
    /// Events that decrypted successfully, still newest first.
    pub decrypted: Vec<StoredEvent>,
    /// Event IDs that failed to decrypt; reported, never retried.
    pub failed: Vec<String>,
}

/// Capability interface over the remote chat service.
///
/// The engine only specifies how this is used; transport, wire format,
/// and cryptography live behind the implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// User IDs of all direct-chat counterparties known to the session.
    async fn direct_chat_user_ids(&self) -> Result<Vec<String>, BackendError>;

    /// All rooms the backend associates with `user_id` as a direct-chat
    /// counterparty, with both parties' membership.
    async fn direct_room_infos(&self, user_id: &str) -> Result<Vec<CandidateRoom>, BackendError>;

    /// Whether `user_id` has a chat profile on the backend.
    async fn has_profile(&self, user_id: &str) -> Result<bool, BackendError>;

    /// Whether end-to-end encryption can be enabled in a fresh room
    /// with `user_id`.
    async fn can_enable_encryption(&self, user_id: &str) -> Result<bool, BackendError>;

    /// Create a private direct room with `user_id`, returning its room ID.
    async fn create_direct_room(
        &self,
        user_id: &str,
        encrypted: bool,
    ) -> Result<String, BackendError>;

    /// Join a room we were invited to.
    async fn join_room(&self, room_id: &str) -> Result<(), BackendError>;

    /// Leave (and forget) a room.
    async fn leave_room(&self, room_id: &str) -> Result<(), BackendError>;

    /// Obtain the live timeline handle for a room.
    async fn live_timeline(&self, room_id: &str) -> Result<TimelineHandle, BackendError>;

    /// Enumerate a room's stored history, newest first.
    async fn stored_events(&self, room_id: &str) -> Result<Vec<StoredEvent>, BackendError>;

    /// Bulk-decrypt stored events within a timeline.
    async fn decrypt_events(
        &self,
        timeline: &TimelineHandle,
        events: Vec<StoredEvent>,
    ) -> Result<DecryptedBatch, BackendError>;

    /// Send a text message, returning the local echo event ID.
    async fn send_text(&self, room_id: &str, body: &str) -> Result<String, BackendError>;

    /// Mark the listed encryption devices as trusted.
    async fn trust_devices(&self, devices: &[String]) -> Result<(), BackendError>;

    /// Send read receipts for every message in a room.
    async fn mark_all_read(&self, room_id: &str) -> Result<(), BackendError>;

    /// Register the push token with the backend's push gateway.
    async fn configure_pusher(&self, device_token: &[u8]) -> Result<(), BackendError>;
}
