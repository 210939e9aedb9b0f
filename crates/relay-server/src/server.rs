//! `RelayServer`: axum HTTP + WebSocket server.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::StreamExt;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::identity::{ConnectRequest, IdentityResolver};
use crate::metrics::CONNECTIONS_REJECTED_TOTAL;
use crate::registry::Registry;
use crate::relay::Relay;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::{self, SessionContext};

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Identity → handles.
    pub registry: Arc<Registry>,
    /// Resolves the identity of each upgrade request.
    pub resolver: Arc<dyn IdentityResolver>,
    /// Handed to every session.
    pub session: SessionContext,
    /// Shutdown coordinator; sessions are tracked by it.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// One permit per admitted connection, taken before the upgrade.
    pub slots: Arc<Semaphore>,
    /// Connection limit.
    pub max_connections: usize,
    /// Largest accepted WebSocket message.
    pub max_message_size: usize,
    /// Prometheus handle, if a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The signaling relay server.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<Registry>,
    relay: Relay,
    resolver: Arc<dyn IdentityResolver>,
    shutdown: Arc<ShutdownCoordinator>,
    slots: Arc<Semaphore>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server with an empty registry.
    pub fn new(config: ServerConfig, resolver: Arc<dyn IdentityResolver>) -> Self {
        let registry = Arc::new(Registry::new());
        let relay = Relay::new(registry.clone(), config.target_field.as_str());
        let slots = Arc::new(Semaphore::new(
            config.max_connections.min(Semaphore::MAX_PERMITS),
        ));
        Self {
            config,
            registry,
            relay,
            resolver,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            slots,
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            session: SessionContext {
                relay: self.relay.clone(),
                shutdown: self.shutdown.token(),
                send_queue_capacity: self.config.send_queue_capacity,
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
            shutdown: self.shutdown.clone(),
            slots: self.slots.clone(),
            start_time: self.start_time,
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            // Legacy path used by existing browser clients.
            .route("/ws/call/", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the configured address and serve until shutdown.
    ///
    /// Returns the bound address and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "signal relay listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server terminated with error");
            }
        });
        Ok((addr, handle))
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The frame router.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws: resolve the identity, then upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    // Held until the session ends, so concurrent handshakes cannot overshoot.
    let Ok(slot) = state.slots.clone().try_acquire_owned() else {
        counter!(CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(limit = state.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let request = ConnectRequest::new(headers, query);
    let identity = match session::accept(&request, state.resolver.as_ref()).await {
        Ok(identity) => identity,
        Err(e) => return (StatusCode::UNAUTHORIZED, e.to_string()).into_response(),
    };

    let ctx = state.session;
    let shutdown = state.shutdown;
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| async move {
            let (ws_tx, ws_rx) = socket.split();
            let _ = shutdown.track(async move {
                let end = session::run_session(ws_tx, ws_rx, identity, ctx).await;
                drop(slot);
                end
            });
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.is_shutting_down(),
        state.registry.connection_count(),
        state.registry.identity_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
