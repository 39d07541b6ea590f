//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use s4_core::{Role, TelemetryRecord};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, ClientCounts, HealthResponse, StatusResponse};
use crate::metrics;
use crate::relay::Relay;
use crate::shutdown::{ShutdownCoordinator, ShutdownReport};
use crate::websocket::ConnectionRegistry;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Relay service.
    pub relay: Arc<Relay>,
    /// When the server started.
    pub start_time: Instant,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    relay: Arc<Relay>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a new server. Connections are torn down when the server's
    /// shutdown token fires.
    pub fn new(config: ServerConfig) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let registry = Arc::new(ConnectionRegistry::with_root(shutdown.token()));
        let relay = Arc::new(Relay::with_registry(config.relay.clone(), registry));
        Self {
            config,
            relay,
            shutdown,
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: Arc::clone(&self.relay),
            start_time: self.start_time,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/", get(index_handler))
            .route("/health", get(health_handler))
            .route("/status", get(status_handler))
            .route("/telemetry/history", get(history_handler))
            .route("/telemetry/clear", post(clear_history_handler))
            .route("/stats/reset", post(reset_stats_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind, start the liveness monitor and serve until shutdown.
    ///
    /// Returns the bound address and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let monitor = self.relay.spawn_liveness_monitor(self.shutdown.token());
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
            let _ = monitor.await;
        });

        info!(
            %local_addr,
            heartbeat_ms = self.config.relay.heartbeat_interval.as_millis(),
            history_capacity = self.config.relay.history_capacity,
            "relay server listening"
        );
        Ok((local_addr, handle))
    }

    /// Close every client, wait briefly for them to go, then stop all tasks.
    pub async fn shutdown_gracefully(
        &self,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> ShutdownReport {
        self.shutdown.shutdown(&self.relay, handles, timeout).await
    }

    /// Relay service.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /
///
/// Existing robot and dashboard clients connect to the bare host, so an
/// upgrade request here opens a relay session; anything else gets the
/// service banner.
async fn index_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    match upgrade {
        Ok(ws) => upgrade_session(ws, addr, &state),
        Err(_) => Json(serde_json::json!({
            "service": "S4 Relay",
            "version": env!("CARGO_PKG_VERSION"),
            "status": "running",
        }))
        .into_response(),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.relay.registry().count().await;
    Json(health::health_check(state.start_time, connections))
}

/// GET /status
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let registry = state.relay.registry();
    let clients = ClientCounts {
        connections: registry.count().await,
        producers: registry.count_by_role(Role::Producer).await,
        consumers: registry.count_by_role(Role::Consumer).await,
        unclassified: registry.count_by_role(Role::Unclassified).await,
    };
    Json(StatusResponse::new(clients, state.relay.stats()))
}

/// Query for `GET /telemetry/history`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Records wanted; missing, unparsable or zero uses the configured default.
    pub limit: Option<String>,
}

impl HistoryQuery {
    /// Effective limit.
    pub fn resolve(&self, default: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(default)
    }
}

/// `GET /telemetry/history` response body.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Records, oldest first.
    pub history: Vec<TelemetryRecord>,
}

/// GET /telemetry/history?limit=N
async fn history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    let limit = query.resolve(state.relay.config().default_history_limit);
    Json(HistoryResponse {
        history: state.relay.recent_telemetry(limit),
    })
}

/// POST /telemetry/clear
async fn clear_history_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.relay.clear_history();
    Json(serde_json::json!({ "cleared": removed }))
}

/// POST /stats/reset
async fn reset_stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.relay.reset_stats();
    Json(serde_json::json!({ "reset": true }))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    upgrade_session(ws, addr, &state)
}

fn upgrade_session(ws: WebSocketUpgrade, addr: SocketAddr, state: &AppState) -> Response {
    let relay = Arc::clone(&state.relay);
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, relay, Some(addr)))
}
