//! A user's interest in one event source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Links a user to an [`super::EventSource`].
///
/// Only events strictly after `join_block` are delivered, so users are
/// never notified about history that predates their subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Row identifier.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Watched event source.
    pub event_source_id: i64,
    /// Chain height when the subscription was created.
    pub join_block: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Returns `true` if an event mined in `block_number` is new to this
    /// subscription.
    #[must_use]
    pub const fn covers_block(&self, block_number: u64) -> bool {
        block_number > self.join_block
    }
}
