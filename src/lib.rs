//! # chain-event-notifier
//!
//! Emails users when smart-contract events they subscribed to are mined.
//!
//! Two scheduled passes share a PostgreSQL store:
//!
//! - the **scanner** polls blockchain nodes for new logs of every watched
//!   contract, matches them against subscriptions and records one
//!   notification per match together with the advanced low-water-mark in a
//!   single transaction;
//! - the **mailer** drains unsent notifications oldest first and marks each
//!   row sent only after the provider accepted it.
//!
//! ## Architecture
//!
//! ```text
//! Scheduler ──► NotificationScanner ──► ChainGateway (JSON-RPC)
//!     │                 │
//!     │                 └──► EventSourceStore ─┐
//!     │                                        ├── PostgreSQL
//!     └───► NotificationMailer ──► NotificationQueue ─┘
//!                       │
//!                       └──► MailDelivery (Postmark)
//!
//! Operators ──► axum (health, metrics, status, admin triggers)
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod mail;
pub mod metrics;
pub mod persistence;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;
