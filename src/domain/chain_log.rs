//! Decoded contract event log returned by the chain gateway.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One decoded event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainLog {
    /// Event name resolved from the ABI.
    pub event_name: String,
    /// Block the log was mined in.
    pub block_number: u64,
    /// Hash of the emitting transaction.
    pub transaction_hash: String,
    /// Position of the log within its block.
    pub log_index: u64,
    /// Decoded event parameters keyed by name.
    pub return_values: serde_json::Value,
    /// Timestamp of the block, when the node reported it.
    pub block_timestamp: Option<DateTime<Utc>>,
}
