//! Operator HTTP surface: health, metrics, status and manual triggers.

pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::metrics::MetricsSnapshot;
use crate::service::{MailerReport, ScanReport};

/// OpenAPI description of the operator endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "chain-event-notifier",
        description = "Operator endpoints of the notification pipeline"
    ),
    paths(
        handlers::system::health_handler,
        handlers::system::metrics_handler,
        handlers::system::status_handler,
        handlers::admin::scan_handler,
        handlers::admin::mailer_handler,
    ),
    components(schemas(handlers::system::HealthResponse, MetricsSnapshot, ScanReport, MailerReport))
)]
pub struct ApiDoc;

/// Builds the router. Admin triggers are only mounted when
/// `admin_routes_enabled` is set.
pub fn build_router(admin_routes_enabled: bool) -> Router<AppState> {
    let router = Router::new().merge(handlers::system::routes());
    let router = if admin_routes_enabled {
        router.merge(handlers::admin::routes())
    } else {
        router
    };

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );
    #[cfg(not(feature = "swagger-ui"))]
    let router = router.route(
        "/api-docs/openapi.json",
        axum::routing::get(|| async { axum::Json(ApiDoc::openapi()) }),
    );

    router
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::chain::ChainGateway;
    use crate::mail::{MailDelivery, NotificationRenderer};
    use crate::metrics::MetricsSink;
    use crate::persistence::{EventSourceStore, NotificationQueue};
    use crate::service::{NotificationMailer, NotificationScanner, ScannerConfig};
    use crate::test_helpers::{
        FakeGateway, MemoryStore, RecordingMailer, event_source, pending_notification,
        test_metrics,
    };

    fn app(admin: bool) -> (Router, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let gateway = Arc::new(FakeGateway::default());
        gateway.set_height("mainnet", 120);
        let metrics = test_metrics();

        let scanner = NotificationScanner::new(
            Arc::clone(&store) as Arc<dyn EventSourceStore>,
            gateway as Arc<dyn ChainGateway>,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            ScannerConfig::default(),
        );
        let mailer = NotificationMailer::new(
            Arc::clone(&store) as Arc<dyn NotificationQueue>,
            Arc::new(RecordingMailer::default()) as Arc<dyn MailDelivery>,
            NotificationRenderer::new("https://{network}.aragon.org/#/{ens_name}"),
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        );
        let state = AppState {
            metrics,
            scanner: Arc::new(scanner),
            mailer: Arc::new(mailer),
        };
        (build_router(admin).with_state(state), store)
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
        let Ok(request) = Request::builder().method(method).uri(uri).body(Body::empty()) else {
            panic!("request should build");
        };
        let Ok(response) = app.oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body should read");
        };
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (app, _) = app(false);
        let (status, body) = call(app, "GET", "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("healthy"));
        assert!(body.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn metrics_are_exposed_as_text() {
        let (app, _) = app(false);
        let (status, body) = call(app, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("notification_scanner_passes_total"));
    }

    #[tokio::test]
    async fn admin_routes_are_hidden_unless_enabled() {
        let (app, _) = app(false);
        let (status, _) = call(app, "POST", "/admin/scan").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn manual_scan_runs_a_pass_and_updates_status() {
        let (app, store) = app(true);
        store.add_source(event_source(1, "0xvoting", "CastVote", 100));

        let (status, body) = call(app.clone(), "POST", "/admin/scan").await;
        assert_eq!(status, StatusCode::OK);
        let Ok(report) = serde_json::from_str::<serde_json::Value>(&body) else {
            panic!("report should be json");
        };
        assert_eq!(report["contract_groups"], 1);
        assert_eq!(store.from_block(1), Some(120));

        let (_, status_body) = call(app, "GET", "/status").await;
        assert!(status_body.contains("\"scan_passes\":1"));
    }

    #[tokio::test]
    async fn manual_mailer_drains_queue() {
        let (app, store) = app(true);
        store.add_pending(pending_notification(1));

        let (status, body) = call(app, "POST", "/admin/mailer").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"sent\":1"));
        assert!(store.unsent_ids().is_empty());
    }
}
