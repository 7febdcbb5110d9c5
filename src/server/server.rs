// ABOUTME: Main stereospin server implementation
// ABOUTME: Provides the WebSocket endpoint, library HTTP surface, and session API

use crate::server::clock::ServerClock;
use crate::server::config::ServerConfig;
use crate::server::handler::handle_client;
use crate::server::session::{SessionStore, SessionView};
use axum::{
    extract::ws::WebSocketUpgrade,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, services::ServeDir};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// Session store
    pub store: SessionStore,
    /// Server clock
    pub clock: Arc<ServerClock>,
}

/// stereospin server
pub struct StereoServer {
    config: Arc<ServerConfig>,
    store: SessionStore,
    clock: Arc<ServerClock>,
}

impl StereoServer {
    /// Create a new server with default configuration
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create a new server with custom configuration
    pub fn with_config(config: ServerConfig) -> Self {
        let clock = Arc::new(ServerClock::new());
        let store = SessionStore::new(
            Arc::clone(&clock),
            config.state_path.clone(),
            Duration::from_secs(config.reap_delay_secs),
        );

        Self {
            config: Arc::new(config),
            store,
            clock,
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the session store
    pub fn store(&self) -> SessionStore {
        self.store.clone()
    }

    /// Build the axum application: the WebSocket endpoint, byte-range
    /// artifact delivery under `/audio`, and the read-only session API.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: Arc::clone(&self.config),
            store: self.store.clone(),
            clock: Arc::clone(&self.clock),
        };

        Router::new()
            .route(&self.config.ws_path, any(ws_handler))
            .route("/api/session/{id}", get(session_info))
            .nest_service("/audio", ServeDir::new(&self.config.audio_root))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&self.config.audio_root)?;
        self.store.rehydrate();

        let config = Arc::clone(&self.config);
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
        log::info!(
            "stereospin server listening on {} (endpoint: {})",
            config.bind_addr,
            config.ws_path
        );

        let shutdown_signal = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for Ctrl-C");
            log::info!("Received shutdown signal");
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        log::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for StereoServer {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_client(socket, state))
}

/// `GET /api/session/:id`
async fn session_info(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionView>, StatusCode> {
    state.store.view(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}
