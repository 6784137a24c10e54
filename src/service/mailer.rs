//! Notification mailer: delivers unsent notifications oldest first.
//!
//! A failed send leaves the row unsent and moves on to the next one. A
//! failure to record a successful send halts the batch: continuing while
//! the store is failing could deliver the same backlog again on every
//! pass.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::mail::{MailDelivery, NotificationRenderer, TemplateKind};
use crate::metrics::MetricsSink;
use crate::persistence::NotificationQueue;

/// Summary of one mailer pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MailerReport {
    /// Correlates the pass with its log lines.
    pub pass_id: Uuid,
    /// Rows a send was attempted for.
    pub attempted: usize,
    /// Rows delivered and marked sent.
    pub sent: usize,
    /// Rows whose rendering or delivery failed.
    pub failed: usize,
    /// The pass stopped early on a store error.
    pub halted: bool,
}

/// Sends queued notification emails.
#[derive(Debug)]
pub struct NotificationMailer {
    queue: Arc<dyn NotificationQueue>,
    delivery: Arc<dyn MailDelivery>,
    renderer: NotificationRenderer,
    metrics: Arc<dyn MetricsSink>,
    gate: Mutex<()>,
}

impl NotificationMailer {
    /// Creates a mailer over its capabilities.
    #[must_use]
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        delivery: Arc<dyn MailDelivery>,
        renderer: NotificationRenderer,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            queue,
            delivery,
            renderer,
            metrics,
            gate: Mutex::new(()),
        }
    }

    /// Runs one mailer pass. Concurrent callers are serialized.
    pub async fn run(&self) -> MailerReport {
        let _pass = self.gate.lock().await;
        let pass_id = Uuid::new_v4();
        self.run_pass(pass_id)
            .instrument(tracing::info_span!("mailer_pass", %pass_id))
            .await
    }

    async fn run_pass(&self, pass_id: Uuid) -> MailerReport {
        self.metrics.mailer_pass();
        let mut report = MailerReport {
            pass_id,
            attempted: 0,
            sent: 0,
            failed: 0,
            halted: false,
        };

        let pending = match self.queue.unsent_notifications().await {
            Ok(pending) => pending,
            Err(error) => {
                self.metrics.store_error();
                tracing::error!(%error, "failed to load unsent notifications");
                report.halted = true;
                return report;
            }
        };
        if pending.is_empty() {
            return report;
        }
        tracing::debug!(pending = pending.len(), "sending notifications");

        for notification in &pending {
            report.attempted += 1;
            let notification_id = notification.notification_id;

            let delivered = match self.renderer.render(notification) {
                Ok(model) => {
                    self.delivery
                        .send(TemplateKind::Notification, &notification.email, &model)
                        .await
                }
                Err(error) => Err(error),
            };
            if let Err(error) = delivered {
                self.metrics.mail_error();
                report.failed += 1;
                tracing::warn!(notification_id, %error, "failed to send notification email");
                continue;
            }
            self.metrics.mail_sent();

            if let Err(error) = self.queue.mark_sent(notification_id).await {
                self.metrics.store_error();
                tracing::error!(
                    notification_id,
                    %error,
                    "failed to mark notification as sent, halting batch"
                );
                report.halted = true;
                return report;
            }
            report.sent += 1;
        }

        tracing::info!(
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failed,
            "mailer pass finished"
        );
        report
    }
}
