//! Vitrum Server
//!
//! HTTP/JSON and WebSocket surface for the Vitrum workspace engine.
//!
//! ## Features
//!
//! - **Document API**: list, read, write, search, and graph the workspace
//! - **Live channel**: `/ws` streams index and federation events as JSON
//! - **Federation**: peer-facing shared endpoints plus cross-peer fan-out
//!
//! ## Environment Variables
//!
//! - `PORT`: Server port (default: 3847)
//! - `ORG_ROOT`: Workspace root (default: current working directory)
//! - `TLS_CERT` / `TLS_KEY`: Optional certificate paths for a TLS-
//!   terminating deployment in front of the server

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use config::Config;
pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(|| async { "Vitrum Server" }))
        .route("/ws", get(handlers::ws::ws_handler))
        .nest("/api", handlers::api_routes())
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
