use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use huddle_core::model::PhaseName;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::actor::{Inbound, SessionActor};
use crate::client::{self, ClientRegistry};
use crate::config::ServerConfig;
use crate::metrics::WS_CONNECTIONS_TOTAL;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub client_registry: Arc<ClientRegistry>,
    pub inbound_tx: mpsc::Sender<Inbound>,
    pub phase_rx: watch::Receiver<PhaseName>,
    pub metrics: Option<PrometheusHandle>,
    pub heartbeat: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(&config.allowed_origins))
}

/// CORS for the configured origins. An empty list allows any origin.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    metrics: Option<PrometheusHandle>,
) -> Result<ServerHandle, std::io::Error> {
    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    // Session actor owns all session state
    let (inbound_tx, inbound_rx) = mpsc::channel::<Inbound>(config.command_queue);
    let (actor, phase_rx) =
        SessionActor::new(Arc::clone(&client_registry), config.auto_review_on_deadline);
    let actor_handle = actor.spawn(inbound_rx);

    // Dead-client cleanup runs once per heartbeat
    let cleanup_handle = client::start_cleanup_task(
        Arc::clone(&client_registry),
        config.heartbeat_interval(),
        config.client_timeout(),
        inbound_tx.clone(),
    );

    let app_state = AppState {
        client_registry,
        inbound_tx,
        phase_rx,
        metrics,
        heartbeat: config.heartbeat_interval(),
    };
    let router = build_router(app_state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        auto_review = config.auto_review_on_deadline,
        "huddle server started"
    );

    let shutdown = CancellationToken::new();
    let server_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!(error = %e, "server stopped with error");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        local_addr,
        shutdown,
        server: server_handle,
        actor: actor_handle,
        cleanup: cleanup_handle,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    pub local_addr: SocketAddr,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    actor: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and stop the background tasks.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.cleanup.abort();
        let _ = self.server.await;
        self.actor.abort();
        tracing::info!("huddle server stopped");
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection_id, rx) = state.client_registry.register();
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    tracing::info!(connection_id = %connection_id, "client connected");

    client::handle_ws_connection(
        socket,
        connection_id,
        rx,
        state.client_registry,
        state.inbound_tx,
        state.heartbeat,
    )
    .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let phase = *state.phase_rx.borrow();
    Json(serde_json::json!({
        "status": "healthy",
        "connections": state.client_registry.count(),
        "phase": phase,
    }))
}

/// Prometheus text exposition.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0, // Random port
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(test_config(), None).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
        assert_eq!(body["phase"], "lobby");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let handle = start(test_config(), None).await.unwrap();
        let url = format!("http://127.0.0.1:{}/metrics", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 404);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn metrics_renders_with_local_recorder() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = start(test_config(), Some(recorder.handle())).await.unwrap();
        let url = format!("http://127.0.0.1:{}/metrics", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        handle.shutdown().await;
    }

    #[test]
    fn cors_layer_accepts_empty_and_listed_origins() {
        let _permissive = cors_layer(&[]);
        let _listed = cors_layer(&["http://localhost:5173".into(), "bad\norigin".into()]);
    }

    #[tokio::test]
    async fn build_router_creates_routes() {
        let config = test_config();
        let (inbound_tx, _inbound_rx) = mpsc::channel(8);
        let (_phase_tx, phase_rx) = watch::channel(PhaseName::Lobby);
        let state = AppState {
            client_registry: Arc::new(ClientRegistry::new(32)),
            inbound_tx,
            phase_rx,
            metrics: None,
            heartbeat: config.heartbeat_interval(),
        };
        let _router = build_router(state, &config);
    }
}
