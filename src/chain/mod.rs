//! Chain gateway: the scanner's view of a blockchain node.
//!
//! [`ChainGateway`] exposes the two calls the scanner needs per network:
//! the current block height and the decoded event logs of one contract
//! between two heights. [`JsonRpcGateway`] implements it over plain
//! Ethereum JSON-RPC; tests substitute an in-memory fake.

pub mod abi;
pub mod json_rpc;

use std::fmt;

use async_trait::async_trait;

pub use abi::ContractAbi;
pub use json_rpc::JsonRpcGateway;

use crate::domain::ChainLog;
use crate::error::ChainError;

/// Parameters of one log query against a single contract.
#[derive(Debug, Clone, Copy)]
pub struct LogQuery<'a> {
    /// Network to query.
    pub network: &'a str,
    /// Contract address.
    pub contract_address: &'a str,
    /// Parsed ABI used to build the topic filter and decode results.
    pub abi: &'a ContractAbi,
    /// Event names to return. Other events of the contract are ignored.
    pub event_names: &'a [String],
    /// First block to include.
    pub from_block: u64,
    /// Last block to include.
    pub to_block: u64,
}

/// Per-network access to a blockchain node.
#[async_trait]
pub trait ChainGateway: Send + Sync + fmt::Debug {
    /// Returns `true` if an endpoint is configured for `network`.
    fn supports_network(&self, network: &str) -> bool;

    /// Returns the latest block number of `network`.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] on connectivity or RPC failure.
    async fn current_height(&self, network: &str) -> Result<u64, ChainError>;

    /// Returns the decoded logs matching `query`, ordered by block number
    /// and log index.
    ///
    /// # Errors
    ///
    /// Returns a [`ChainError`] on connectivity or RPC failure.
    async fn get_logs(&self, query: LogQuery<'_>) -> Result<Vec<ChainLog>, ChainError>;
}
