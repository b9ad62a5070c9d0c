//! Mapping between peer identifiers and backend user identifiers.
//!
//! The backend user ID of a peer is derived deterministically from its
//! `PeerId` and the home server name, and is reversible by parsing.

use uuid::Uuid;

use crate::types::PeerId;

/// Backend user ID for `peer_id` on `home_server`.
pub fn chat_user_id(peer_id: PeerId, home_server: &str) -> String {
    format!("@{}:{}", peer_id.0.as_hyphenated(), home_server)
}

/// Recover the `PeerId` encoded in a backend user ID.
///
/// Returns `None` for user IDs that were not derived from a `PeerId`
/// (foreign accounts, malformed input).
pub fn peer_id_from(user_id: &str) -> Option<PeerId> {
    let localpart = user_id.strip_prefix('@')?.split(':').next()?;
    Uuid::try_parse(localpart).ok().map(PeerId)
}
