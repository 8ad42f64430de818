//! TCP listener, routes, and server main loop

use super::connection::ws_handler;
use super::session::{
    create_event, create_session, get_session, health, list_events, websocket_test_page,
};
use super::state::AppState;
use crate::hub::CloseReason;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the router with every HTTP and WebSocket route
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", post(create_session))
        .route("/sessions/", post(create_session))
        .route("/sessions/{session_id}", get(get_session))
        .route("/sessions/{session_id}/events", get(list_events))
        .route("/events", post(create_event))
        .route("/events/", post(create_event))
        .route("/ws/{client_id}", get(ws_handler))
        .route("/websocket_test", get(websocket_test_page))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// HTTP/WebSocket server
pub struct Server {
    addr: SocketAddr,
    state: AppState,
}

impl Server {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve on an already bound listener until a shutdown signal arrives
    pub async fn serve(&self, listener: TcpListener, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, build_router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        self.cleanup().await;
        Ok(())
    }

    /// Close every connection that is still live and let their sessions
    /// finish recording
    async fn cleanup(&self) {
        let hub = &self.state.hub;
        let live = hub.registry().snapshot().await;
        tracing::info!(connections = live.len(), "Closing remaining connections");
        for connection in live {
            hub.leave(&connection, CloseReason::Server).await;
        }
        hub.flush_recording().await;
    }
}
