//! Domain layer: watched event sources, subscriptions, and notifications.
//!
//! These are plain value types shared by the scanner, the mailer, and the
//! store implementations. The only logic here is the matching rule that
//! decides which subscriptions a fetched log is delivered to.

pub mod chain_log;
pub mod event_source;
pub mod notification;
pub mod subscription;

pub use chain_log::ChainLog;
pub use event_source::{ContractKey, EventSource};
pub use notification::{NewNotification, PendingNotification, match_logs};
pub use subscription::Subscription;
