//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::metrics::PrometheusMetrics;
use crate::service::{NotificationMailer, NotificationScanner};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Metrics rendered at `/metrics` and `/status`.
    pub metrics: Arc<PrometheusMetrics>,
    /// Scanner, for manual passes.
    pub scanner: Arc<NotificationScanner>,
    /// Mailer, for manual passes.
    pub mailer: Arc<NotificationMailer>,
}
