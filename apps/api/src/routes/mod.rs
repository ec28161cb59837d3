pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::analysis::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/run",
            delete(handlers::handle_cancel_run),
        )
        .route(
            "/api/v1/sessions/:id/analyze",
            post(handlers::handle_analyze).layer(upload_limit),
        )
        // Stateless helpers
        .route("/api/v1/checklist", post(handlers::handle_checklist))
        .route("/api/v1/metrics", get(handlers::handle_get_metrics))
        .with_state(state)
}
