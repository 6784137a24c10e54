//! chain-event-notifier entry point.
//!
//! Wires the store, node gateway, mail transport and metrics together,
//! schedules the scanner and the mailer, and serves the operator
//! endpoints until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use chain_event_notifier::api;
use chain_event_notifier::app_state::AppState;
use chain_event_notifier::chain::{ChainGateway, JsonRpcGateway};
use chain_event_notifier::config::{MailTransport, NotifierConfig};
use chain_event_notifier::error::NotifierError;
use chain_event_notifier::mail::{LogMailer, MailDelivery, NotificationRenderer, PostmarkMailer};
use chain_event_notifier::metrics::{MetricsSink, PrometheusMetrics};
use chain_event_notifier::persistence::{EventSourceStore, NotificationQueue, PostgresStore};
use chain_event_notifier::service::{
    NotificationMailer, NotificationScanner, ScannerConfig, Scheduler,
};

const MAIL_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = NotifierConfig::from_env().map_err(fatal)?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting chain-event-notifier");

    // Persistence
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(fatal)?;
        tracing::info!("database migrations applied");
    }
    let store = Arc::new(PostgresStore::new(pool));

    // Capabilities
    let metrics = Arc::new(PrometheusMetrics::new().map_err(fatal)?);
    let gateway =
        JsonRpcGateway::new(config.rpc_endpoints.clone(), config.rpc_timeout()).map_err(fatal)?;
    tracing::info!(
        networks = ?gateway.networks().collect::<Vec<_>>(),
        "rpc endpoints configured"
    );
    let delivery: Arc<dyn MailDelivery> = match &config.mail_transport {
        MailTransport::Postmark { api_token, api_url } => Arc::new(
            PostmarkMailer::new(
                api_url.as_str(),
                api_token.as_str(),
                config.mail_from.as_str(),
                MAIL_TIMEOUT,
            )
            .map_err(fatal)?,
        ),
        MailTransport::Log => {
            tracing::warn!("MAIL_TRANSPORT=log, notification emails will only be logged");
            Arc::new(LogMailer::new(config.mail_from.as_str()))
        }
    };

    // Pipeline
    let scanner = Arc::new(NotificationScanner::new(
        Arc::clone(&store) as Arc<dyn EventSourceStore>,
        Arc::new(gateway) as Arc<dyn ChainGateway>,
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        ScannerConfig {
            repoll_interval: config.scan_repoll_interval(),
            max_concurrent_contracts: config.scan_max_concurrent_contracts,
            max_block_span: config.scan_max_block_span,
        },
    ));
    let mailer = Arc::new(NotificationMailer::new(
        Arc::clone(&store) as Arc<dyn NotificationQueue>,
        delivery,
        NotificationRenderer::new(config.management_url_template.as_str()),
        Arc::clone(&metrics) as Arc<dyn MetricsSink>,
    ));

    let scan_schedule = {
        let scanner = Arc::clone(&scanner);
        Scheduler::schedule("notification_scanner", config.scan_interval(), move || {
            let scanner = Arc::clone(&scanner);
            async move {
                scanner.scan().await;
            }
        })
    };
    let mailer_schedule = {
        let mailer = Arc::clone(&mailer);
        Scheduler::schedule("notification_mailer", config.mailer_interval(), move || {
            let mailer = Arc::clone(&mailer);
            async move {
                mailer.run().await;
            }
        })
    };

    // HTTP
    let app_state = AppState {
        metrics,
        scanner,
        mailer,
    };
    let app = api::build_router(config.admin_routes_enabled)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(HTTP_REQUEST_TIMEOUT)),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    for schedule in [scan_schedule, mailer_schedule] {
        tracing::info!(task = schedule.name(), "waiting for in-flight pass");
        schedule.shutdown().await;
    }
    tracing::info!("shutdown complete");

    Ok(())
}

/// Logs a bootstrap failure with its category before it ends the process.
fn fatal(error: impl Into<NotifierError>) -> anyhow::Error {
    let error = error.into();
    tracing::error!(category = error.category(), %error, "bootstrap failed");
    error.into()
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
