//! PostgreSQL implementation of the subscription store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use super::models::{EventSourceRow, PendingNotificationRow, SubscriptionRow, block_to_db};
use super::{EventSourceStore, NotificationQueue};
use crate::domain::{EventSource, NewNotification, PendingNotification, Subscription};
use crate::error::StoreError;

/// Subscription store backed by `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn advance<'e>(
    executor: impl PgExecutor<'e>,
    event_source_ids: &[i64],
    to_block: i64,
    polled_at: DateTime<Utc>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE eventsources SET from_block = GREATEST(from_block, $1), last_poll = $2 \
         WHERE eventsource_id = ANY($3)",
    )
    .bind(to_block)
    .bind(polled_at)
    .bind(event_source_ids)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl EventSourceStore for PostgresStore {
    async fn eligible_event_sources(
        &self,
        repoll_before: DateTime<Utc>,
    ) -> Result<Vec<EventSource>, StoreError> {
        let rows = sqlx::query_as::<_, EventSourceRow>(
            "SELECT eventsource_id, network, contract_address, event_name, app_name, ens_name, \
             abi, enabled, from_block, last_poll FROM eventsources \
             WHERE enabled AND (last_poll IS NULL OR last_poll <= $1) \
             ORDER BY eventsource_id",
        )
        .bind(repoll_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventSource::try_from).collect()
    }

    async fn subscriptions_for(
        &self,
        event_source_ids: &[i64],
    ) -> Result<Vec<Subscription>, StoreError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT subscription_id, user_id, eventsource_id, join_block, created_at \
             FROM subscriptions WHERE eventsource_id = ANY($1) ORDER BY subscription_id",
        )
        .bind(event_source_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn advance_event_sources(
        &self,
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        advance(&self.pool, event_source_ids, block_to_db(to_block)?, polled_at).await
    }

    async fn commit_notifications(
        &self,
        notifications: &[NewNotification],
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let to_block = block_to_db(to_block)?;
        let mut tx = self.pool.begin().await?;

        let mut inserted = 0;
        for notification in notifications {
            let result = sqlx::query(
                "INSERT INTO notifications \
                 (subscription_id, return_values, transaction_hash, log_index, block, block_time) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (subscription_id, transaction_hash, log_index) DO NOTHING",
            )
            .bind(notification.subscription_id)
            .bind(&notification.return_values)
            .bind(&notification.transaction_hash)
            .bind(block_to_db(notification.log_index)?)
            .bind(block_to_db(notification.block_number)?)
            .bind(notification.block_time)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        advance(&mut *tx, event_source_ids, to_block, polled_at).await?;
        tx.commit().await?;
        Ok(inserted)
    }
}

#[async_trait]
impl NotificationQueue for PostgresStore {
    async fn unsent_notifications(&self) -> Result<Vec<PendingNotification>, StoreError> {
        let rows = sqlx::query_as::<_, PendingNotificationRow>(
            "SELECT n.notification_id, u.email, e.network, e.contract_address, e.event_name, \
             e.app_name, e.ens_name, n.block, n.block_time, n.return_values, \
             n.transaction_hash, n.created_at \
             FROM notifications n \
             JOIN subscriptions s ON s.subscription_id = n.subscription_id \
             JOIN users u ON u.user_id = s.user_id \
             JOIN eventsources e ON e.eventsource_id = s.eventsource_id \
             WHERE NOT n.sent \
             ORDER BY n.created_at ASC, n.notification_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PendingNotification::try_from).collect()
    }

    async fn mark_sent(&self, notification_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET sent = TRUE, updated_at = NOW() WHERE notification_id = $1",
        )
        .bind(notification_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(notification_id, "mark_sent matched no notification row");
        }
        Ok(())
    }
}
