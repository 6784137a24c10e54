//! Notification scanner: turns new contract events into notification rows.
//!
//! One pass:
//!
//! 1. Load enabled event sources not polled within the re-poll interval.
//! 2. Fetch the current height of every network involved. Any failure
//!    aborts the pass so no low-water-mark moves on a stale height.
//! 3. Group sources by contract so each contract is queried once.
//! 4. Per group, fetch logs above the lowest low-water-mark, match them
//!    against subscriptions and commit the new rows together with the
//!    advanced mark. A failing group is left untouched for the next pass
//!    and never blocks the others.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::chain::{ChainGateway, ContractAbi, LogQuery};
use crate::domain::{ContractKey, EventSource, match_logs};
use crate::error::ChainError;
use crate::metrics::MetricsSink;
use crate::persistence::EventSourceStore;

/// Scanner tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Minimum time between two polls of the same event source.
    pub repoll_interval: Duration,
    /// Contract groups processed concurrently within a pass.
    pub max_concurrent_contracts: usize,
    /// Maximum number of blocks queried per group per pass; `0` means
    /// unbounded.
    pub max_block_span: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            repoll_interval: Duration::from_secs(300),
            max_concurrent_contracts: 4,
            max_block_span: 0,
        }
    }
}

/// Summary of one scanner pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScanReport {
    /// Correlates the pass with its log lines.
    pub pass_id: Uuid,
    /// Event sources due for polling on a configured network.
    pub eligible_sources: usize,
    /// Contract groups processed.
    pub contract_groups: usize,
    /// Notification rows inserted.
    pub notifications_created: u64,
    /// Groups left untouched because of a node or store error.
    pub failed_groups: usize,
    /// The pass stopped before processing any group.
    pub aborted: bool,
}

impl ScanReport {
    fn new(pass_id: Uuid) -> Self {
        Self {
            pass_id,
            eligible_sources: 0,
            contract_groups: 0,
            notifications_created: 0,
            failed_groups: 0,
            aborted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupOutcome {
    Advanced,
    Committed(u64),
    Failed,
}

/// Polls contract events and records notifications.
#[derive(Debug)]
pub struct NotificationScanner {
    store: Arc<dyn EventSourceStore>,
    gateway: Arc<dyn ChainGateway>,
    metrics: Arc<dyn MetricsSink>,
    config: ScannerConfig,
    gate: Mutex<()>,
}

impl NotificationScanner {
    /// Creates a scanner over its capabilities.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventSourceStore>,
        gateway: Arc<dyn ChainGateway>,
        metrics: Arc<dyn MetricsSink>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            metrics,
            config,
            gate: Mutex::new(()),
        }
    }

    /// Runs one scan pass. Concurrent callers are serialized.
    pub async fn scan(&self) -> ScanReport {
        let _pass = self.gate.lock().await;
        let pass_id = Uuid::new_v4();
        self.run_pass(pass_id)
            .instrument(tracing::info_span!("scan_pass", %pass_id))
            .await
    }

    async fn run_pass(&self, pass_id: Uuid) -> ScanReport {
        self.metrics.scan_pass();
        let mut report = ScanReport::new(pass_id);

        let repoll_before = repoll_cutoff(Utc::now(), self.config.repoll_interval);
        let sources = match self.store.eligible_event_sources(repoll_before).await {
            Ok(sources) => sources,
            Err(error) => {
                self.metrics.store_error();
                tracing::error!(%error, "failed to load event sources");
                report.aborted = true;
                return report;
            }
        };

        let (sources, unsupported): (Vec<_>, Vec<_>) = sources
            .into_iter()
            .partition(|source| self.gateway.supports_network(&source.network));
        for source in &unsupported {
            tracing::warn!(
                event_source_id = source.id,
                network = %source.network,
                "no rpc endpoint for network, skipping event source"
            );
        }
        report.eligible_sources = sources.len();

        let mut groups: BTreeMap<ContractKey, Vec<EventSource>> = BTreeMap::new();
        for source in sources {
            groups.entry(source.contract_key()).or_default().push(source);
        }

        let networks: BTreeSet<&str> = groups.keys().map(|key| key.network.as_str()).collect();
        let mut heights = HashMap::with_capacity(networks.len());
        for network in networks {
            match self.gateway.current_height(network).await {
                Ok(height) => {
                    heights.insert(network.to_string(), height);
                }
                Err(error) => {
                    self.metrics.node_error(network);
                    tracing::error!(
                        network,
                        %error,
                        "failed to fetch current height, aborting pass"
                    );
                    report.aborted = true;
                    return report;
                }
            }
        }

        report.contract_groups = groups.len();
        self.metrics.contracts_scanned(groups.len());
        tracing::debug!(
            sources = report.eligible_sources,
            groups = report.contract_groups,
            "scanning contract groups"
        );

        let heights = &heights;
        let outcomes: Vec<GroupOutcome> = stream::iter(groups)
            .map(|(key, sources)| async move {
                match heights.get(&key.network) {
                    Some(&height) => self.scan_group(&key, &sources, height).await,
                    None => GroupOutcome::Failed,
                }
            })
            .buffer_unordered(self.config.max_concurrent_contracts.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                GroupOutcome::Advanced => {}
                GroupOutcome::Committed(created) => report.notifications_created += created,
                GroupOutcome::Failed => report.failed_groups += 1,
            }
        }

        tracing::info!(
            groups = report.contract_groups,
            created = report.notifications_created,
            failed = report.failed_groups,
            "scan pass finished"
        );
        report
    }

    async fn scan_group(
        &self,
        key: &ContractKey,
        sources: &[EventSource],
        height: u64,
    ) -> GroupOutcome {
        let ids: Vec<i64> = sources.iter().map(|source| source.id).collect();
        let polled_at = Utc::now();
        let from_block = sources
            .iter()
            .map(|source| source.from_block)
            .min()
            .unwrap_or(height);
        let to_block = self.range_end(from_block, height);

        let subscriptions = match self.store.subscriptions_for(&ids).await {
            Ok(subscriptions) => subscriptions,
            Err(error) => {
                self.metrics.store_error();
                tracing::error!(contract = %key, %error, "failed to load subscriptions");
                return GroupOutcome::Failed;
            }
        };
        if subscriptions.is_empty() {
            tracing::debug!(contract = %key, height, "no subscriptions, advancing");
            return self.advance(key, &ids, height, polled_at).await;
        }
        if from_block >= to_block {
            return self.advance(key, &ids, to_block, polled_at).await;
        }

        let abi = match group_abi(key, sources) {
            Ok(abi) => abi,
            Err(error) => {
                self.metrics.invalid_abi(&key.network);
                tracing::error!(contract = %key, %error, "cannot decode logs for contract");
                return GroupOutcome::Failed;
            }
        };
        let event_names: Vec<String> = sources
            .iter()
            .map(|source| source.event_name.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let query = LogQuery {
            network: &key.network,
            contract_address: &key.contract_address,
            abi: &abi,
            event_names: &event_names,
            from_block: from_block.saturating_add(1),
            to_block,
        };
        let logs = match self.gateway.get_logs(query).await {
            Ok(logs) => logs,
            Err(error) => {
                self.metrics.node_error(&key.network);
                tracing::warn!(
                    contract = %key,
                    from_block,
                    to_block,
                    %error,
                    "failed to fetch logs"
                );
                return GroupOutcome::Failed;
            }
        };

        let matched = match_logs(&logs, sources, &subscriptions);
        if matched.is_empty() {
            tracing::debug!(
                contract = %key,
                logs = logs.len(),
                to_block,
                "no matching logs, advancing"
            );
            return self.advance(key, &ids, to_block, polled_at).await;
        }

        match self
            .store
            .commit_notifications(&matched, &ids, to_block, polled_at)
            .await
        {
            Ok(created) => {
                self.metrics.notifications_created(created);
                tracing::info!(contract = %key, to_block, created, "notifications created");
                GroupOutcome::Committed(created)
            }
            Err(error) => {
                self.metrics.store_error();
                tracing::error!(
                    contract = %key,
                    matched = matched.len(),
                    %error,
                    "failed to commit notifications, low-water-mark unchanged"
                );
                GroupOutcome::Failed
            }
        }
    }

    async fn advance(
        &self,
        key: &ContractKey,
        ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> GroupOutcome {
        match self
            .store
            .advance_event_sources(ids, to_block, polled_at)
            .await
        {
            Ok(()) => GroupOutcome::Advanced,
            Err(error) => {
                self.metrics.store_error();
                tracing::error!(
                    contract = %key,
                    to_block,
                    %error,
                    "failed to advance low-water-mark"
                );
                GroupOutcome::Failed
            }
        }
    }

    const fn range_end(&self, from_block: u64, height: u64) -> u64 {
        if self.config.max_block_span == 0 {
            return height;
        }
        let capped = from_block.saturating_add(self.config.max_block_span);
        if capped < height { capped } else { height }
    }
}

fn repoll_cutoff(now: DateTime<Utc>, repoll_interval: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(repoll_interval)
        .ok()
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn group_abi(key: &ContractKey, sources: &[EventSource]) -> Result<ContractAbi, ChainError> {
    let mut abi = ContractAbi::default();
    for source in sources {
        abi.merge(ContractAbi::parse(&key.contract_address, &source.abi)?);
    }
    Ok(abi)
}
