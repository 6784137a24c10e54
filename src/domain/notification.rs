//! Notification rows and the log → subscription matching rule.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ChainLog, EventSource, Subscription};

/// A notification the scanner is about to insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNotification {
    /// Subscription being notified.
    pub subscription_id: i64,
    /// Decoded event parameters.
    pub return_values: serde_json::Value,
    /// Hash of the emitting transaction.
    pub transaction_hash: String,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Block the log was mined in.
    pub block_number: u64,
    /// Timestamp of that block.
    pub block_time: Option<DateTime<Utc>>,
}

/// An unsent notification joined with everything needed to email it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    /// Notification row identifier.
    pub notification_id: i64,
    /// Recipient address.
    pub email: String,
    /// Network of the originating event source.
    pub network: String,
    /// Contract address of the originating event source.
    pub contract_address: String,
    /// Event name of the originating event source.
    pub event_name: String,
    /// App name of the originating event source.
    pub app_name: String,
    /// ENS name of the organization, if known.
    pub ens_name: Option<String>,
    /// Block the log was mined in.
    pub block_number: u64,
    /// Timestamp of that block.
    pub block_time: Option<DateTime<Utc>>,
    /// Decoded event parameters.
    pub return_values: serde_json::Value,
    /// Hash of the emitting transaction.
    pub transaction_hash: String,
    /// When the scanner created the row.
    pub created_at: DateTime<Utc>,
}

/// Pairs fetched logs with the subscriptions that should hear about them.
///
/// A log is delivered to a subscription when the log's event name equals
/// the subscription's event source event name and the log's block is
/// strictly above the subscription's join block. Blocks at or below the
/// source's own low-water-mark are skipped, since that range was already
/// scanned for it.
///
/// Output follows log order, then subscription order.
#[must_use]
pub fn match_logs(
    logs: &[ChainLog],
    sources: &[EventSource],
    subscriptions: &[Subscription],
) -> Vec<NewNotification> {
    let sources_by_id: HashMap<i64, &EventSource> = sources.iter().map(|s| (s.id, s)).collect();

    let mut matched = Vec::new();
    for log in logs {
        for subscription in subscriptions {
            let Some(source) = sources_by_id.get(&subscription.event_source_id) else {
                continue;
            };
            if source.event_name != log.event_name
                || log.block_number <= source.from_block
                || !subscription.covers_block(log.block_number)
            {
                continue;
            }
            matched.push(NewNotification {
                subscription_id: subscription.id,
                return_values: log.return_values.clone(),
                transaction_hash: log.transaction_hash.clone(),
                log_index: log.log_index,
                block_number: log.block_number,
                block_time: log.block_timestamp,
            });
        }
    }
    matched
}
