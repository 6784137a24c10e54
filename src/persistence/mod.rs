//! Persistence layer: the subscription store.
//!
//! The store is split into two narrow capabilities so each pipeline
//! component only sees what it writes:
//!
//! - [`EventSourceStore`] for the scanner (event sources, subscriptions,
//!   notification creation and low-water-mark advances).
//! - [`NotificationQueue`] for the mailer (unsent rows and the `sent` flag).
//!
//! [`PostgresStore`] implements both over `sqlx::PgPool`.

pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use postgres::PostgresStore;

use crate::domain::{EventSource, NewNotification, PendingNotification, Subscription};
use crate::error::StoreError;

/// Store operations used by the notification scanner.
#[async_trait]
pub trait EventSourceStore: Send + Sync + fmt::Debug {
    /// Enabled event sources never polled or last polled at or before
    /// `repoll_before`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    async fn eligible_event_sources(
        &self,
        repoll_before: DateTime<Utc>,
    ) -> Result<Vec<EventSource>, StoreError>;

    /// Subscriptions attached to any of the given event sources, ordered
    /// by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    async fn subscriptions_for(
        &self,
        event_source_ids: &[i64],
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Moves the low-water-mark of the given sources to `to_block` (never
    /// backwards) and records `polled_at` as their last poll.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    async fn advance_event_sources(
        &self,
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts `notifications` and advances the given sources in one
    /// transaction. Returns the number of rows actually inserted; rows
    /// already present for the same (subscription, transaction, log index)
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure, in which case nothing
    /// was written.
    async fn commit_notifications(
        &self,
        notifications: &[NewNotification],
        event_source_ids: &[i64],
        to_block: u64,
        polled_at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Store operations used by the notification mailer.
#[async_trait]
pub trait NotificationQueue: Send + Sync + fmt::Debug {
    /// Unsent notifications joined with recipient and source details,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    async fn unsent_notifications(&self) -> Result<Vec<PendingNotification>, StoreError>;

    /// Flags a notification as sent.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    async fn mark_sent(&self, notification_id: i64) -> Result<(), StoreError>;
}
