//! Row shapes returned by the PostgreSQL queries and their conversion
//! into domain types.
//!
//! Block heights are `BIGINT` in the schema and `u64` in the domain; the
//! conversions reject values that do not fit instead of wrapping.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{EventSource, PendingNotification, Subscription};
use crate::error::StoreError;

/// `eventsources` row as selected by the scanner.
pub type EventSourceRow = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Value,
    bool,
    i64,
    Option<DateTime<Utc>>,
);

/// `subscriptions` row.
pub type SubscriptionRow = (i64, i64, i64, i64, DateTime<Utc>);

/// Unsent notification joined with user and event source columns.
pub type PendingNotificationRow = (
    i64,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    i64,
    Option<DateTime<Utc>>,
    Value,
    String,
    DateTime<Utc>,
);

/// Converts a stored block height.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] for negative heights.
pub fn block_from_db(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::InvalidValue(format!("negative block {value}")))
}

/// Converts a block height for storage.
///
/// # Errors
///
/// Returns [`StoreError::InvalidValue`] for heights above `i64::MAX`.
pub fn block_to_db(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidValue(format!("block {value} out of range")))
}

impl TryFrom<EventSourceRow> for EventSource {
    type Error = StoreError;

    fn try_from(row: EventSourceRow) -> Result<Self, Self::Error> {
        let (
            id,
            network,
            contract_address,
            event_name,
            app_name,
            ens_name,
            abi,
            enabled,
            from_block,
            last_poll,
        ) = row;
        Ok(Self {
            id,
            network,
            contract_address,
            event_name,
            app_name,
            ens_name,
            abi,
            enabled,
            from_block: block_from_db(from_block)?,
            last_poll,
        })
    }
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let (id, user_id, event_source_id, join_block, created_at) = row;
        Ok(Self {
            id,
            user_id,
            event_source_id,
            join_block: block_from_db(join_block)?,
            created_at,
        })
    }
}

impl TryFrom<PendingNotificationRow> for PendingNotification {
    type Error = StoreError;

    fn try_from(row: PendingNotificationRow) -> Result<Self, Self::Error> {
        let (
            notification_id,
            email,
            network,
            contract_address,
            event_name,
            app_name,
            ens_name,
            block_number,
            block_time,
            return_values,
            transaction_hash,
            created_at,
        ) = row;
        Ok(Self {
            notification_id,
            email,
            network,
            contract_address,
            event_name,
            app_name,
            ens_name,
            block_number: block_from_db(block_number)?,
            block_time,
            return_values,
            transaction_hash,
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_conversion_rejects_out_of_range() {
        assert!(matches!(block_from_db(-1), Err(StoreError::InvalidValue(_))));
        assert!(matches!(block_to_db(u64::MAX), Err(StoreError::InvalidValue(_))));
        assert_eq!(block_from_db(120).ok(), Some(120));
        assert_eq!(block_to_db(120).ok(), Some(120));
    }

    #[test]
    fn event_source_row_converts() {
        let row: EventSourceRow = (
            7,
            "mainnet".to_string(),
            "0xAbC".to_string(),
            "CastVote".to_string(),
            "voting.aragonpm.eth".to_string(),
            None,
            serde_json::json!([]),
            true,
            100,
            None,
        );
        let source = EventSource::try_from(row).ok();
        assert_eq!(source.map(|s| (s.id, s.from_block)), Some((7, 100)));
    }
}
