//! `MeshtapServer`: Axum HTTP + WebSocket server around a [`BroadcastHub`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::Uri;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use meshtap_core::PacketSource;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::{Result, ServerError};
use crate::health;
use crate::ingest::{IngestReport, Ingestor};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::BroadcastHub;
use crate::websocket::gateway;
use crate::websocket::slots::ConnectionSlots;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Subscriber set.
    pub hub: Arc<BroadcastHub>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
    /// `max_connections` budget.
    pub slots: Arc<ConnectionSlots>,
    /// Cancelled when shutdown begins.
    pub shutdown: CancellationToken,
}

/// The meshtap server.
pub struct MeshtapServer {
    config: Arc<ServerConfig>,
    hub: Arc<BroadcastHub>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: PrometheusHandle,
    slots: Arc<ConnectionSlots>,
    start_time: Instant,
}

impl MeshtapServer {
    /// Create a new server.
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Self {
        let hub = BroadcastHub::new(config.send_timeout(), config.queue_capacity);
        let slots = ConnectionSlots::new(config.max_connections);
        Self {
            config: Arc::new(config),
            hub: Arc::new(hub),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics,
            slots: Arc::new(slots),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            config: Arc::clone(&self.config),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            slots: Arc::clone(&self.slots),
            shutdown: self.shutdown.token(),
        };

        Router::new()
            .route("/ws", get(gateway::ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(gateway::reject_path)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and start serving in the background.
    ///
    /// The returned task stops accepting connections once the shutdown
    /// token is cancelled.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = self.config.bind_addr();
        let bind_err = |source: std::io::Error| ServerError::Bind {
            addr: addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&addr).await.map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        info!(%local_addr, "meshtap server listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "http server failed");
            }
        });
        Ok((local_addr, handle))
    }

    /// Ingest from `source` until it ends or shutdown is requested, then
    /// shut down in order: stop accepting, close every subscriber, wait
    /// for the HTTP task, close the source.
    pub async fn run(&self, mut source: Box<dyn PacketSource>, http: JoinHandle<()>) -> IngestReport {
        let cancel = self.shutdown.token();
        let report = Ingestor::run(source.as_mut(), self.hub.as_ref(), &cancel).await;

        self.shutdown.shutdown();
        let _ = self.hub.close_all();
        let drained = self
            .shutdown
            .graceful_shutdown(vec![http], Some(self.config.shutdown_timeout()))
            .await;
        if !drained {
            warn!("http server did not stop within the shutdown timeout");
        }
        if let Err(e) = source.close().await {
            warn!(error = %e, "failed to close packet source");
        }
        info!(
            packets = report.packets,
            rx_logs = report.rx_logs,
            published = self.hub.packets_published(),
            "meshtap server stopped"
        );
        report
    }

    /// The broadcast hub.
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Connection slots held by live sessions.
    pub fn slots(&self) -> &Arc<ConnectionSlots> {
        &self.slots
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(
    State(state): State<AppState>,
    uri: Uri,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Ok(ws) = upgrade {
        return gateway::refuse(ws, uri.path());
    }
    let resp = health::health_check(
        state.start_time,
        state.hub.len(),
        state.hub.packets_published(),
    );
    Json(resp).into_response()
}

/// GET /metrics
async fn metrics_handler(
    State(state): State<AppState>,
    uri: Uri,
    upgrade: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Ok(ws) = upgrade {
        return gateway::refuse(ws, uri.path());
    }
    crate::metrics::render(&state.metrics).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server() -> MeshtapServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        MeshtapServer::new(ServerConfig::default(), handle)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.hub().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_counters() {
        let server = make_server();
        let (_id, _rx) = server.hub().subscribe("127.0.0.1:1".parse().unwrap());

        let (status, body) = get_body(server.router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["subscribers"], 1);
        assert_eq!(parsed["packets_published"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server();
        let (status, _body) = get_body(server.router(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/nonexistent").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn plain_get_on_ws_is_rejected() {
        let server = make_server();
        let (status, _) = get_body(server.router(), "/ws").await;
        assert!(status.is_client_error());
        assert!(server.hub().is_empty());
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn listen_reports_bind_failure() {
        let first = make_server();
        let (addr, _handle) = first.listen().await.unwrap();

        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let second = MeshtapServer::new(config, handle);
        let err = second.listen().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        first.shutdown().shutdown();
    }
}
