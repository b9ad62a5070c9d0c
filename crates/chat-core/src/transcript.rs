use serde::{Deserialize, Serialize};

use crate::types::Transcript;

/// The catch-up batch emitted once after attaching to a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CatchUpBatch {
    /// Transcript entries in chronological order.
    pub messages: Vec<Transcript>,
    /// Entries with a timestamp strictly after the last read timestamp.
    pub unread_count: usize,
}

/// Merge the two catch-up partitions into one chronological batch.
///
/// Both inputs are expected in backend enumeration order, newest first:
/// `plain` holds message events that decoded immediately, `decrypted`
/// holds the events that went through bulk decryption. The result is
/// ordered by timestamp; entries with equal timestamps keep backend
/// event order.
pub fn merge_catch_up(
    plain: Vec<Transcript>,
    decrypted: Vec<Transcript>,
    last_read_ms: u64,
) -> CatchUpBatch {
    let mut messages = decrypted;
    messages.extend(plain);
    messages.reverse();
    messages.sort_by_key(|entry| entry.timestamp_ms);

    let unread_count = messages
        .iter()
        .filter(|entry| entry.timestamp_ms > last_read_ms)
        .count();

    CatchUpBatch {
        messages,
        unread_count,
    }
}
