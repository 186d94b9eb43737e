pub mod health;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::domain;
use crate::extraction;
use crate::session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Form sessions
        .route("/api/v1/sessions", post(session::handlers::handle_create_session))
        .route("/api/v1/sessions/:id", get(session::handlers::handle_get_session))
        .route(
            "/api/v1/sessions/:id/fields/:key",
            patch(session::handlers::handle_set_field),
        )
        // Chat extraction
        .route(
            "/api/v1/sessions/:id/chat",
            post(extraction::handlers::handle_chat),
        )
        // Submission to the persistence backend
        .route(
            "/api/v1/sessions/:id/einreichen",
            post(session::handlers::handle_einreichen),
        )
        // Dropdown domain data
        .route("/api/v1/domain/:domain_id", get(domain::handle_domain_data))
        .with_state(state)
}
