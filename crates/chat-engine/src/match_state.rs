use async_trait::async_trait;

use chat_core::{BackendError, MatchState, PeerId};

/// External, authoritative source of per-relationship match state.
///
/// State is eventually consistent; `refresh` with `force` re-queries the
/// origin server instead of answering from cache.
#[async_trait]
pub trait MatchStateSource: Send + Sync {
    /// Last known match state for `peer_id`.
    async fn current(&self, peer_id: PeerId) -> MatchState;

    /// Re-validate the match state, optionally bypassing caches.
    async fn refresh(&self, peer_id: PeerId, force: bool) -> Result<MatchState, BackendError>;
}
