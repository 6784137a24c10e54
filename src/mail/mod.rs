//! Email delivery capability and notification rendering.
//!
//! The mailer hands a rendered template model to a [`MailDelivery`]
//! implementation. [`PostmarkMailer`] sends through the Postmark template
//! API; [`LogMailer`] only logs, for local development.

pub mod log_mailer;
pub mod postmark;
pub mod template;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

pub use log_mailer::LogMailer;
pub use postmark::PostmarkMailer;
pub use template::NotificationRenderer;

use crate::error::MailError;

/// Provider-side templates the service sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Contract event notification.
    Notification,
}

impl TemplateKind {
    /// Template alias registered with the provider.
    #[must_use]
    pub const fn alias(self) -> &'static str {
        match self {
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

/// Sends one templated email.
#[async_trait]
pub trait MailDelivery: Send + Sync + fmt::Debug {
    /// Delivers `template` to `recipient` with the given template model.
    ///
    /// # Errors
    ///
    /// Returns a [`MailError`] if the provider could not accept the message.
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        model: &Value,
    ) -> Result<(), MailError>;
}
