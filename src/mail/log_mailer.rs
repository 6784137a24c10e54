//! Development mail sink.

use async_trait::async_trait;
use serde_json::Value;

use super::{MailDelivery, TemplateKind};
use crate::error::MailError;

/// Logs every message at `info` instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    /// Creates a sink that reports `from` as the sender.
    #[must_use]
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl MailDelivery for LogMailer {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        model: &Value,
    ) -> Result<(), MailError> {
        tracing::info!(
            from = %self.from,
            to = recipient,
            template = %template,
            model = %model,
            "email not sent (log transport)"
        );
        Ok(())
    }
}
