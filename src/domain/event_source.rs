//! Watched (network, contract, event) triples.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One (network, contract address, event name) triple being watched.
///
/// `from_block` is the low-water-mark: the highest block already fully
/// scanned for this source. It only ever moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSource {
    /// Row identifier.
    pub id: i64,
    /// Network name (e.g. `"mainnet"`).
    pub network: String,
    /// Contract address as registered.
    pub contract_address: String,
    /// Event name as it appears in the ABI.
    pub event_name: String,
    /// Human-readable app name (e.g. `"voting.aragonpm.eth"`).
    pub app_name: String,
    /// ENS name of the organization the contract belongs to.
    pub ens_name: Option<String>,
    /// Contract ABI (JSON array) used to decode logs.
    pub abi: serde_json::Value,
    /// Disabled sources are never polled.
    pub enabled: bool,
    /// Highest block already scanned.
    pub from_block: u64,
    /// Timestamp of the last successful poll.
    pub last_poll: Option<DateTime<Utc>>,
}

impl EventSource {
    /// Key of the contract group this source is polled with.
    #[must_use]
    pub fn contract_key(&self) -> ContractKey {
        ContractKey::new(&self.network, &self.contract_address)
    }

    /// Returns `true` if the source is due for polling at `repoll_before`.
    #[must_use]
    pub fn is_due(&self, repoll_before: DateTime<Utc>) -> bool {
        self.enabled && self.last_poll.is_none_or(|polled| polled <= repoll_before)
    }
}

/// Identifies one contract on one network.
///
/// Addresses are compared case-insensitively, so checksummed and
/// lower-case registrations of the same contract share a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContractKey {
    /// Network name.
    pub network: String,
    /// Lower-case contract address.
    pub contract_address: String,
}

impl ContractKey {
    /// Creates a key, normalizing the address to lower case.
    #[must_use]
    pub fn new(network: &str, contract_address: &str) -> Self {
        Self {
            network: network.to_string(),
            contract_address: contract_address.to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.contract_address, self.network)
    }
}
