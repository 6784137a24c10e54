//! In-memory fakes shared by unit tests, with failure injection.
#![allow(clippy::panic)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};

use crate::chain::{ChainGateway, LogQuery};
use crate::domain::{ChainLog, EventSource, NewNotification, PendingNotification, Subscription};
use crate::error::{ChainError, MailError, StoreError};
use crate::mail::{MailDelivery, TemplateKind};
use crate::metrics::PrometheusMetrics;
use crate::persistence::{EventSourceStore, NotificationQueue};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn test_metrics() -> Arc<PrometheusMetrics> {
    let Ok(metrics) = PrometheusMetrics::new() else {
        panic!("metrics registry setup failed");
    };
    Arc::new(metrics)
}

pub(crate) fn event_source(id: i64, contract: &str, event: &str, from_block: u64) -> EventSource {
    EventSource {
        id,
        network: "mainnet".to_string(),
        contract_address: contract.to_string(),
        event_name: event.to_string(),
        app_name: "voting.aragonpm.eth".to_string(),
        ens_name: Some("mydao.aragonid.eth".to_string()),
        abi: crate::chain::abi::tests::voting_abi(),
        enabled: true,
        from_block,
        last_poll: None,
    }
}

pub(crate) fn subscription(id: i64, event_source_id: i64, join_block: u64) -> Subscription {
    Subscription {
        id,
        user_id: id,
        event_source_id,
        join_block,
        created_at: epoch(),
    }
}

fn log(event_name: &str, block_number: u64, log_index: u64, return_values: Value) -> ChainLog {
    ChainLog {
        event_name: event_name.to_string(),
        block_number,
        transaction_hash: format!("0x{block_number:060x}{log_index:04x}"),
        log_index,
        return_values,
        block_timestamp: epoch().checked_add_signed(TimeDelta::seconds(
            i64::try_from(block_number).unwrap_or_default() * 15,
        )),
    }
}

pub(crate) fn cast_vote_log(block_number: u64, log_index: u64) -> ChainLog {
    log(
        "CastVote",
        block_number,
        log_index,
        json!({
            "voteId": "1",
            "voter": "0x0000000000000000000000000000000000000022",
            "supports": true,
            "stake": "5",
        }),
    )
}

pub(crate) fn start_vote_log(block_number: u64, log_index: u64) -> ChainLog {
    log(
        "StartVote",
        block_number,
        log_index,
        json!({
            "voteId": "2",
            "creator": "0x0000000000000000000000000000000000000033",
            "metadata": "Fund the grants program?",
        }),
    )
}

pub(crate) fn pending_notification(id: i64) -> PendingNotification {
    PendingNotification {
        notification_id: id,
        email: format!("user{id}@example.org"),
        network: "mainnet".to_string(),
        contract_address: "0x00000000000000000000000000000000000000aa".to_string(),
        event_name: "CastVote".to_string(),
        app_name: "voting.aragonpm.eth".to_string(),
        ens_name: Some("mydao.aragonid.eth".to_string()),
        block_number: 110,
        block_time: Some(epoch()),
        return_values: json!({ "voteId": "1", "supports": true }),
        transaction_hash: format!("0x{id:064x}"),
        created_at: epoch(),
    }
}

#[derive(Debug, Default)]
struct StoreState {
    sources: BTreeMap<i64, EventSource>,
    subscriptions: Vec<Subscription>,
    notifications: Vec<NewNotification>,
    queue: Vec<(PendingNotification, bool)>,
    clock: i64,
    fail_eligible: bool,
    fail_commit: bool,
    fail_unsent: bool,
    fail_mark_sent: BTreeSet<i64>,
}

/// Subscription store kept in memory. Enforces the notification unique
/// key and applies commits all-or-nothing.
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub(crate) fn add_source(&self, source: EventSource) {
        lock(&self.state).sources.insert(source.id, source);
    }

    pub(crate) fn add_subscription(&self, subscription: Subscription) {
        lock(&self.state).subscriptions.push(subscription);
    }

    /// Queues an unsent row. Rows are stamped in insertion order.
    pub(crate) fn add_pending(&self, mut notification: PendingNotification) {
        let mut state = lock(&self.state);
        state.clock += 1;
        notification.created_at = epoch() + TimeDelta::seconds(state.clock);
        state.queue.push((notification, false));
    }

    pub(crate) fn from_block(&self, id: i64) -> Option<u64> {
        lock(&self.state).sources.get(&id).map(|s| s.from_block)
    }

    pub(crate) fn last_poll(&self, id: i64) -> Option<DateTime<Utc>> {
        lock(&self.state).sources.get(&id).and_then(|s| s.last_poll)
    }

    /// Rewinds a source as if the previous pass never advanced it.
    pub(crate) fn reset_source(&self, id: i64, from_block: u64) {
        if let Some(source) = lock(&self.state).sources.get_mut(&id) {
            source.from_block = from_block;
            source.last_poll = None;
        }
    }

    pub(crate) fn notifications(&self) -> Vec<NewNotification> {
        lock(&self.state).notifications.clone()
    }

    pub(crate) fn notifications_for_source(&self, event_source_id: i64) -> Vec<NewNotification> {
        let state = lock(&self.state);
        let subscriptions: HashSet<i64> = state
            .subscriptions
            .iter()
            .filter(|s| s.event_source_id == event_source_id)
            .map(|s| s.id)
            .collect();
        state
            .notifications
            .iter()
            .filter(|n| subscriptions.contains(&n.subscription_id))
            .cloned()
            .collect()
    }

    pub(crate) fn sent_ids(&self) -> Vec<i64> {
        self.queue_ids(true)
    }

    pub(crate) fn unsent_ids(&self) -> Vec<i64> {
        self.queue_ids(false)
    }

    fn queue_ids(&self, sent: bool) -> Vec<i64> {
        lock(&self.state)
            .queue
            .iter()
            .filter(|(_, s)| *s == sent)
            .map(|(n, _)| n.notification_id)
            .collect()
    }

    pub(crate) fn fail_eligible(&self, fail: bool) {
        lock(&self.state).fail_eligible = fail;
    }

    pub(crate) fn fail_commit(&self, fail: bool) {
        lock(&self.state).fail_commit = fail;
    }

    pub(crate) fn fail_unsent(&self, fail: bool) {
        lock(&self.state).fail_unsent = fail;
    }

    pub(crate) fn fail_mark_sent(&self, notification_id: i64) {
        lock(&self.state).fail_mark_sent.insert(notification_id);
    }
}

fn advance_in(state: &mut StoreState, ids: &[i64], to_block: u64, polled_at: DateTime<Utc>) {
    for id in ids {
        if let Some(source) = state.sources.get_mut(id) {
            source.from_block = source.from_block.max(to_block);
            source.last_poll = Some(polled_at);
        }
    }
}

#[async_trait]
impl EventSourceStore for MemoryStore {
    async fn eligible_event_sources(
        &self,
        repoll_before: DateTime<Utc>,
    ) -> Result<Vec<EventSource>, StoreError> {
        let state = lock(&self.state);
        if state.fail_eligible {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(state
            .sources
            .values()
            .filter(|s| s.is_due(repoll_before))
            .cloned()
            .collect())
    }

    async fn subscriptions_for(
        &self,
        event_source_ids: &[i64],
    ) -> Result<Vec<Subscription>, StoreError> {
        Ok(lock(&self.state)
            .subscriptions
            .iter()
            .filter(|s| event_source_ids.contains(&s.event_source_id))
            .cloned()
            .collect())
    }

    async fn advance_event_sources(
        &self,
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        advance_in(&mut lock(&self.state), event_source_ids, to_block, polled_at);
        Ok(())
    }

    async fn commit_notifications(
        &self,
        notifications: &[NewNotification],
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = lock(&self.state);
        if state.fail_commit {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut inserted = 0;
        for notification in notifications {
            let duplicate = state.notifications.iter().any(|n| {
                n.subscription_id == notification.subscription_id
                    && n.transaction_hash == notification.transaction_hash
                    && n.log_index == notification.log_index
            });
            if !duplicate {
                state.notifications.push(notification.clone());
                inserted += 1;
            }
        }
        advance_in(&mut state, event_source_ids, to_block, polled_at);
        Ok(inserted)
    }
}

#[async_trait]
impl NotificationQueue for MemoryStore {
    async fn unsent_notifications(&self) -> Result<Vec<PendingNotification>, StoreError> {
        let state = lock(&self.state);
        if state.fail_unsent {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut pending: Vec<PendingNotification> = state
            .queue
            .iter()
            .filter(|(_, sent)| !sent)
            .map(|(n, _)| n.clone())
            .collect();
        pending.sort_by_key(|n| (n.created_at, n.notification_id));
        Ok(pending)
    }

    async fn mark_sent(&self, notification_id: i64) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.fail_mark_sent.contains(&notification_id) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        for (notification, sent) in &mut state.queue {
            if notification.notification_id == notification_id {
                *sent = true;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    heights: HashMap<String, u64>,
    failing_heights: HashSet<String>,
    logs: HashMap<String, Vec<ChainLog>>,
    failing_logs: HashSet<String>,
    queries: Vec<(String, u64, u64)>,
}

/// Chain gateway answering from canned heights and logs.
#[derive(Debug, Default)]
pub(crate) struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub(crate) fn set_height(&self, network: &str, height: u64) {
        lock(&self.state).heights.insert(network.to_string(), height);
    }

    pub(crate) fn fail_height(&self, network: &str) {
        lock(&self.state).failing_heights.insert(network.to_string());
    }

    pub(crate) fn push_log(&self, contract: &str, log: ChainLog) {
        lock(&self.state)
            .logs
            .entry(contract.to_ascii_lowercase())
            .or_default()
            .push(log);
    }

    pub(crate) fn fail_logs(&self, contract: &str) {
        lock(&self.state).failing_logs.insert(contract.to_ascii_lowercase());
    }

    /// `(contract, from_block, to_block)` of every log query, in call order.
    pub(crate) fn log_queries(&self) -> Vec<(String, u64, u64)> {
        lock(&self.state).queries.clone()
    }
}

#[async_trait]
impl ChainGateway for FakeGateway {
    fn supports_network(&self, network: &str) -> bool {
        let state = lock(&self.state);
        state.heights.contains_key(network) || state.failing_heights.contains(network)
    }

    async fn current_height(&self, network: &str) -> Result<u64, ChainError> {
        let state = lock(&self.state);
        if state.failing_heights.contains(network) {
            return Err(ChainError::Transport {
                network: network.to_string(),
                message: "connection refused".to_string(),
            });
        }
        state
            .heights
            .get(network)
            .copied()
            .ok_or_else(|| ChainError::UnknownNetwork(network.to_string()))
    }

    async fn get_logs(&self, query: LogQuery<'_>) -> Result<Vec<ChainLog>, ChainError> {
        let mut state = lock(&self.state);
        let contract = query.contract_address.to_ascii_lowercase();
        state
            .queries
            .push((contract.clone(), query.from_block, query.to_block));
        if state.failing_logs.contains(&contract) {
            return Err(ChainError::Rpc {
                network: query.network.to_string(),
                code: -32005,
                message: "query returned more than 10000 results".to_string(),
            });
        }
        let mut logs: Vec<ChainLog> = state
            .logs
            .get(&contract)
            .map(|logs| {
                logs.iter()
                    .filter(|log| {
                        (query.from_block..=query.to_block).contains(&log.block_number)
                            && query.event_names.contains(&log.event_name)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }
}

#[derive(Debug, Default)]
struct MailerState {
    sent: Vec<(TemplateKind, String, Value)>,
    failing: HashSet<String>,
}

/// Mail capability that records deliveries and fails on demand.
#[derive(Debug, Default)]
pub(crate) struct RecordingMailer {
    state: Mutex<MailerState>,
}

impl RecordingMailer {
    pub(crate) fn fail_for(&self, recipient: &str) {
        lock(&self.state).failing.insert(recipient.to_string());
    }

    pub(crate) fn recover(&self, recipient: &str) {
        lock(&self.state).failing.remove(recipient);
    }

    pub(crate) fn recipients(&self) -> Vec<String> {
        lock(&self.state)
            .sent
            .iter()
            .map(|(_, to, _)| to.clone())
            .collect()
    }

    pub(crate) fn sent(&self) -> Vec<(TemplateKind, String, Value)> {
        lock(&self.state).sent.clone()
    }
}

#[async_trait]
impl MailDelivery for RecordingMailer {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        model: &Value,
    ) -> Result<(), MailError> {
        let mut state = lock(&self.state);
        if state.failing.contains(recipient) {
            return Err(MailError::Rejected {
                status: 503,
                message: "provider unavailable".to_string(),
            });
        }
        state
            .sent
            .push((template, recipient.to_string(), model.clone()));
        Ok(())
    }
}
