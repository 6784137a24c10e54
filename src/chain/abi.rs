//! Contract ABI handling: topic filters and log decoding.
//!
//! ABIs are stored per event source as raw JSON and only parsed when a
//! contract group is scanned. Decoding is done at runtime with
//! `alloy`'s dynamic ABI support since the contracts are not known at
//! compile time.

use std::collections::HashMap;

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::{Event, JsonAbi};
use alloy::primitives::{B256, hex};
use serde_json::{Map, Value};

use crate::error::ChainError;

/// Error decoding a single raw log.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The log carries no topics, so its event cannot be identified.
    #[error("log has no topics")]
    NoTopics,

    /// The first topic does not match any event in the ABI.
    #[error("unknown event selector {0}")]
    UnknownSelector(B256),

    /// Topics or data do not fit the event definition.
    #[error("cannot decode {event}: {message}")]
    Malformed {
        /// Event name resolved from the selector.
        event: String,
        /// Decoder message.
        message: String,
    },
}

/// Non-anonymous events of a contract indexed by their topic-0 selector.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    events: HashMap<B256, Event>,
}

impl ContractAbi {
    /// Parses a JSON ABI array.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::InvalidAbi`] if the JSON is not a valid ABI.
    pub fn parse(contract: &str, abi: &Value) -> Result<Self, ChainError> {
        let parsed: JsonAbi =
            serde_json::from_value(abi.clone()).map_err(|e| ChainError::InvalidAbi {
                contract: contract.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::from(&parsed))
    }

    /// Adds events from `other` that are not known yet.
    pub fn merge(&mut self, other: Self) {
        for (selector, event) in other.events {
            self.events.entry(selector).or_insert(event);
        }
    }

    /// Returns the selectors of the named events, sorted.
    #[must_use]
    pub fn selectors_for(&self, event_names: &[String]) -> Vec<B256> {
        let mut selectors: Vec<B256> = self
            .events
            .iter()
            .filter(|(_, event)| event_names.contains(&event.name))
            .map(|(selector, _)| *selector)
            .collect();
        selectors.sort_unstable();
        selectors
    }

    /// Decodes a raw log into its event name and a JSON object of
    /// parameters keyed by name (position for unnamed parameters).
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if the log does not belong to a known
    /// event or does not match its definition.
    pub fn decode(&self, topics: &[B256], data: &[u8]) -> Result<(String, Value), DecodeError> {
        let selector = topics.first().ok_or(DecodeError::NoTopics)?;
        let event = self
            .events
            .get(selector)
            .ok_or(DecodeError::UnknownSelector(*selector))?;

        let decoded = event
            .decode_log_parts(topics.iter().copied(), data)
            .map_err(|e| DecodeError::Malformed {
                event: event.name.clone(),
                message: e.to_string(),
            })?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut values = Map::new();
        for (position, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let Some(value) = value else {
                break;
            };
            let key = if input.name.is_empty() {
                position.to_string()
            } else {
                input.name.clone()
            };
            values.insert(key, sol_value_to_json(&value));
        }

        Ok((event.name.clone(), Value::Object(values)))
    }
}

impl From<&JsonAbi> for ContractAbi {
    fn from(abi: &JsonAbi) -> Self {
        let events = abi
            .events()
            .filter(|event| !event.anonymous)
            .map(|event| (event.selector(), event.clone()))
            .collect();
        Self { events }
    }
}

/// Converts a decoded Solidity value into JSON.
///
/// Integers become decimal strings so 256-bit values survive the round
/// trip through JavaScript-based consumers.
#[must_use]
pub fn sol_value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(i, _) => Value::String(i.to_string()),
        DynSolValue::Uint(u, _) => Value::String(u.to_string()),
        DynSolValue::FixedBytes(word, size) => {
            let bytes = word.get(..*size).unwrap_or(word.as_slice());
            Value::String(hex::encode_prefixed(bytes))
        }
        DynSolValue::Address(address) => Value::String(address.to_checksum(None)),
        DynSolValue::Function(function) => Value::String(hex::encode_prefixed(function)),
        DynSolValue::Bytes(bytes) => Value::String(hex::encode_prefixed(bytes)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(sol_value_to_json).collect())
        }
        #[allow(unreachable_patterns)]
        _ => Value::Null,
    }
}
