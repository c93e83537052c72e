//! HTTP handlers.

pub mod federation;
pub mod files;
pub mod projects;
pub mod ws;

use axum::Router;

use crate::state::AppState;

/// All routes under `/api`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(files::routes())
        .nest("/projects", projects::routes())
        .nest("/federation", federation::routes())
}
