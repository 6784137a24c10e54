//! Service layer: the scheduled notification pipeline.
//!
//! [`Scheduler`] drives two independent passes:
//!
//! - [`NotificationScanner`] polls nodes for new contract events and
//!   records one notification per matching subscription.
//! - [`NotificationMailer`] drains unsent notifications through the mail
//!   provider.
//!
//! Neither pass returns an error. Failures are logged, counted through the
//! injected [`crate::metrics::MetricsSink`], and retried on the next run.

pub mod mailer;
pub mod scanner;
pub mod scheduler;

pub use mailer::{MailerReport, NotificationMailer};
pub use scanner::{NotificationScanner, ScanReport, ScannerConfig};
pub use scheduler::{ScheduleHandle, Scheduler};
