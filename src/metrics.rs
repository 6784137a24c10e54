//! Health signals emitted by the scanner and the mailer.
//!
//! Components receive an `Arc<dyn MetricsSink>` at construction instead of
//! reaching for process-wide counters. [`PrometheusMetrics`] is the
//! production sink; it owns a private [`prometheus::Registry`] rendered at
//! `GET /metrics`.

use std::fmt;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;
use utoipa::ToSchema;

/// Named counters and gauges the pipeline reports through.
pub trait MetricsSink: Send + Sync + fmt::Debug {
    /// A scanner pass started.
    fn scan_pass(&self);
    /// Number of contract groups considered in the current pass.
    fn contracts_scanned(&self, count: usize);
    /// Notification rows committed.
    fn notifications_created(&self, count: u64);
    /// A node call failed on `network`.
    fn node_error(&self, network: &str);
    /// A store operation failed.
    fn store_error(&self);
    /// A contract group on `network` was skipped because its stored ABI
    /// does not parse.
    fn invalid_abi(&self, network: &str);
    /// A mailer pass started.
    fn mailer_pass(&self);
    /// An email was accepted by the provider.
    fn mail_sent(&self);
    /// An email could not be delivered.
    fn mail_error(&self);
}

/// Point-in-time copy of the scalar counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct MetricsSnapshot {
    /// Scanner passes started.
    pub scan_passes: u64,
    /// Contract groups in the most recent pass.
    pub contracts_scanned: i64,
    /// Notification rows committed.
    pub notifications_created: u64,
    /// Store failures.
    pub store_errors: u64,
    /// Mailer passes started.
    pub mailer_passes: u64,
    /// Emails accepted by the provider.
    pub mail_sent: u64,
    /// Emails that failed to send.
    pub mail_errors: u64,
}

/// [`MetricsSink`] backed by the `prometheus` crate.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    scan_passes: IntCounter,
    contracts_scanned: IntGauge,
    notifications_created: IntCounter,
    node_errors: IntCounterVec,
    invalid_abis: IntCounterVec,
    store_errors: IntCounter,
    mailer_passes: IntCounter,
    mail_sent: IntCounter,
    mail_errors: IntCounter,
}

impl PrometheusMetrics {
    /// Creates the collectors and registers them in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a [`prometheus::Error`] if a collector cannot be created or
    /// registered (e.g. duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let scan_passes = counter(
            &registry,
            "notification_scanner_passes_total",
            "The number of notification scanner passes",
        )?;
        let contracts_scanned = IntGauge::with_opts(Opts::new(
            "notification_scanner_contracts",
            "Contract groups considered in the latest scanner pass",
        ))?;
        registry.register(Box::new(contracts_scanned.clone()))?;
        let notifications_created = counter(
            &registry,
            "notification_scanner_notifications_created_total",
            "The number of notification rows created",
        )?;
        let node_errors = IntCounterVec::new(
            Opts::new(
                "notification_scanner_node_errors_total",
                "The number of blockchain node errors",
            ),
            &["network"],
        )?;
        registry.register(Box::new(node_errors.clone()))?;
        let invalid_abis = IntCounterVec::new(
            Opts::new(
                "notification_scanner_invalid_abi_total",
                "The number of contract groups skipped because of an unparsable abi",
            ),
            &["network"],
        )?;
        registry.register(Box::new(invalid_abis.clone()))?;
        let store_errors = counter(
            &registry,
            "store_errors_total",
            "The number of database errors",
        )?;
        let mailer_passes = counter(
            &registry,
            "notification_mailer_passes_total",
            "The number of notification mailer passes",
        )?;
        let mail_sent = counter(
            &registry,
            "notification_emails_sent_total",
            "The number of notification emails sent",
        )?;
        let mail_errors = counter(
            &registry,
            "notification_email_errors_total",
            "The number of notification emails that failed to send",
        )?;

        Ok(Self {
            registry,
            scan_passes,
            contracts_scanned,
            notifications_created,
            node_errors,
            invalid_abis,
            store_errors,
            mailer_passes,
            mail_sent,
            mail_errors,
        })
    }

    /// Renders every collector in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns a [`prometheus::Error`] if encoding fails.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Returns the node error count for one network.
    #[must_use]
    pub fn node_errors(&self, network: &str) -> u64 {
        self.node_errors.with_label_values(&[network]).get()
    }

    /// Returns the invalid ABI count for one network.
    #[must_use]
    pub fn invalid_abis(&self, network: &str) -> u64 {
        self.invalid_abis.with_label_values(&[network]).get()
    }

    /// Copies the scalar counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            scan_passes: self.scan_passes.get(),
            contracts_scanned: self.contracts_scanned.get(),
            notifications_created: self.notifications_created.get(),
            store_errors: self.store_errors.get(),
            mailer_passes: self.mailer_passes.get(),
            mail_sent: self.mail_sent.get(),
            mail_errors: self.mail_errors.get(),
        }
    }
}

impl fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn scan_pass(&self) {
        self.scan_passes.inc();
    }

    fn contracts_scanned(&self, count: usize) {
        self.contracts_scanned
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    fn notifications_created(&self, count: u64) {
        self.notifications_created.inc_by(count);
    }

    fn node_error(&self, network: &str) {
        self.node_errors.with_label_values(&[network]).inc();
    }

    fn store_error(&self) {
        self.store_errors.inc();
    }

    fn invalid_abi(&self, network: &str) {
        self.invalid_abis.with_label_values(&[network]).inc();
    }

    fn mailer_pass(&self) {
        self.mailer_passes.inc();
    }

    fn mail_sent(&self) {
        self.mail_sent.inc();
    }

    fn mail_error(&self) {
        self.mail_errors.inc();
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn metrics() -> PrometheusMetrics {
        let Ok(metrics) = PrometheusMetrics::new() else {
            panic!("registry setup failed");
        };
        metrics
    }

    #[test]
    fn counters_start_at_zero() {
        let m = metrics();
        assert_eq!(
            m.snapshot(),
            MetricsSnapshot {
                scan_passes: 0,
                contracts_scanned: 0,
                notifications_created: 0,
                store_errors: 0,
                mailer_passes: 0,
                mail_sent: 0,
                mail_errors: 0,
            }
        );
    }

    #[test]
    fn sink_methods_update_snapshot() {
        let m = metrics();
        m.scan_pass();
        m.scan_pass();
        m.contracts_scanned(3);
        m.notifications_created(5);
        m.store_error();
        m.mailer_pass();
        m.mail_sent();
        m.mail_error();

        let snap = m.snapshot();
        assert_eq!(snap.scan_passes, 2);
        assert_eq!(snap.contracts_scanned, 3);
        assert_eq!(snap.notifications_created, 5);
        assert_eq!(snap.store_errors, 1);
        assert_eq!(snap.mailer_passes, 1);
        assert_eq!(snap.mail_sent, 1);
        assert_eq!(snap.mail_errors, 1);
    }

    #[test]
    fn node_errors_are_per_network() {
        let m = metrics();
        m.node_error("mainnet");
        m.node_error("mainnet");
        m.node_error("rinkeby");
        assert_eq!(m.node_errors("mainnet"), 2);
        assert_eq!(m.node_errors("rinkeby"), 1);
        assert_eq!(m.node_errors("xdai"), 0);
    }

    #[test]
    fn invalid_abis_are_per_network() {
        let m = metrics();
        m.invalid_abi("xdai");
        assert_eq!(m.invalid_abis("xdai"), 1);
        assert_eq!(m.invalid_abis("mainnet"), 0);
        let Ok(text) = m.render() else {
            panic!("render failed");
        };
        assert!(text.contains("notification_scanner_invalid_abi_total{network=\"xdai\"} 1"));
    }

    #[test]
    fn render_uses_text_exposition_format() {
        let m = metrics();
        m.scan_pass();
        m.node_error("mainnet");
        let Ok(text) = m.render() else {
            panic!("render failed");
        };
        assert!(text.contains("notification_scanner_passes_total 1"));
        assert!(text.contains("notification_scanner_node_errors_total{network=\"mainnet\"} 1"));
    }
}
