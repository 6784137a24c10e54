//! [`ChainGateway`] over Ethereum JSON-RPC.
//!
//! One shared `reqwest` client serves every configured network. Logs are
//! fetched with `eth_getLogs` filtered on the contract address and the
//! selectors of the requested events, decoded against the contract ABI,
//! and stamped with their block time via `eth_getBlockByNumber` (one call
//! per distinct block).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::primitives::{B256, hex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{ChainGateway, LogQuery};
use crate::domain::ChainLog;
use crate::error::ChainError;

/// JSON-RPC client keyed by network name.
#[derive(Debug, Clone)]
pub struct JsonRpcGateway {
    client: reqwest::Client,
    endpoints: BTreeMap<String, String>,
    next_id: Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    timestamp: String,
}

impl JsonRpcGateway {
    /// Creates a gateway for the given `network → url` map.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoints: BTreeMap<String, String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport {
                network: "*".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoints,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Configured network names.
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        network: &str,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let url = self
            .endpoints
            .get(network)
            .ok_or_else(|| ChainError::UnknownNetwork(network.to_string()))?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let transport = |e: reqwest::Error| ChainError::Transport {
            network: network.to_string(),
            message: e.to_string(),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::MalformedResponse {
                network: network.to_string(),
                message: format!("{method}: {e}"),
            })?;

        if let Some(error) = envelope.error {
            return Err(ChainError::Rpc {
                network: network.to_string(),
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(envelope.result).map_err(|e| ChainError::MalformedResponse {
            network: network.to_string(),
            message: format!("{method}: {e}"),
        })
    }

    async fn block_timestamp(
        &self,
        network: &str,
        block: u64,
    ) -> Result<Option<DateTime<Utc>>, ChainError> {
        let block: Option<RpcBlock> = self
            .call(network, "eth_getBlockByNumber", json!([quantity(block), false]))
            .await?;
        Ok(block
            .and_then(|b| parse_quantity(&b.timestamp))
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)))
    }
}

#[async_trait]
impl ChainGateway for JsonRpcGateway {
    fn supports_network(&self, network: &str) -> bool {
        self.endpoints.contains_key(network)
    }

    async fn current_height(&self, network: &str) -> Result<u64, ChainError> {
        let height: String = self.call(network, "eth_blockNumber", json!([])).await?;
        parse_quantity(&height).ok_or_else(|| ChainError::MalformedResponse {
            network: network.to_string(),
            message: format!("eth_blockNumber: invalid quantity {height}"),
        })
    }

    async fn get_logs(&self, query: LogQuery<'_>) -> Result<Vec<ChainLog>, ChainError> {
        if !self.supports_network(query.network) {
            return Err(ChainError::UnknownNetwork(query.network.to_string()));
        }
        let selectors = query.abi.selectors_for(query.event_names);
        if selectors.is_empty() || query.from_block > query.to_block {
            return Ok(Vec::new());
        }

        let topics: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
        let filter = json!([{
            "address": query.contract_address,
            "fromBlock": quantity(query.from_block),
            "toBlock": quantity(query.to_block),
            "topics": [topics],
        }]);
        let raw: Vec<RpcLog> = self.call(query.network, "eth_getLogs", filter).await?;

        let mut logs = Vec::with_capacity(raw.len());
        for log in raw.into_iter().filter(|log| !log.removed) {
            let (Some(block_number), Some(transaction_hash), Some(log_index)) = (
                log.block_number.as_deref().and_then(parse_quantity),
                log.transaction_hash.clone(),
                log.log_index.as_deref().and_then(parse_quantity),
            ) else {
                tracing::debug!(contract = query.contract_address, "skipping pending log");
                continue;
            };

            let decoded = decode_raw(&log).and_then(|(topics, data)| {
                query.abi.decode(&topics, &data).map_err(|e| e.to_string())
            });
            match decoded {
                Ok((event_name, return_values)) => logs.push(ChainLog {
                    event_name,
                    block_number,
                    transaction_hash,
                    log_index,
                    return_values,
                    block_timestamp: None,
                }),
                Err(error) => {
                    tracing::warn!(
                        network = query.network,
                        contract = query.contract_address,
                        block = block_number,
                        tx = %transaction_hash,
                        %error,
                        "skipping undecodable log"
                    );
                }
            }
        }
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let blocks: BTreeSet<u64> = logs.iter().map(|log| log.block_number).collect();
        let mut timestamps = HashMap::with_capacity(blocks.len());
        for block in blocks {
            timestamps.insert(block, self.block_timestamp(query.network, block).await?);
        }
        for log in &mut logs {
            log.block_timestamp = timestamps.get(&log.block_number).copied().flatten();
        }

        Ok(logs)
    }
}

fn decode_raw(log: &RpcLog) -> Result<(Vec<B256>, Vec<u8>), String> {
    let topics = log
        .topics
        .iter()
        .map(|t| t.parse::<B256>().map_err(|e| format!("topic {t}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let data = hex::decode(&log.data).map_err(|e| format!("data: {e}"))?;
    Ok((topics, data))
}

fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}

fn parse_quantity(value: &str) -> Option<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}
