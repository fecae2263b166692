pub mod admin;
pub mod docs;
pub mod health;
pub mod session;

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::middleware::auth::{require_admin, require_user};
use crate::middleware::rate_limit::{rps_middleware, RateLimiter};
use crate::AppState;

/// Every HTTP route of the service, without transport-level layers.
pub fn api_router(state: AppState) -> Router {
    let entrant_api = Router::new()
        .route("/api/assessments/:id/window", get(session::evaluate_window))
        .route("/api/assessments/:id/start", post(session::start_or_resume))
        .route("/api/assessments/:id/attempts", get(session::list_attempts))
        .route("/api/attempts/:id/answer", patch(session::record_answer))
        .route("/api/attempts/:id/flag", post(session::toggle_flag))
        .route("/api/attempts/:id/heartbeat", post(session::heartbeat))
        .route("/api/attempts/:id/submit", post(session::submit))
        .route("/api/attempts/:id/force-submit", post(session::force_submit))
        .route("/api/attempts/:id/status", get(session::session_status))
        .route("/api/attempts/:id/result", get(session::get_result))
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_user,
        ))
        .layer(axum::middleware::from_fn_with_state(
            RateLimiter::per_second(state.public_rps),
            rps_middleware,
        ));

    let admin_api = Router::new()
        .route("/api/admin/assessments/:id/activate", post(admin::activate))
        .route("/api/admin/assessments/:id/deactivate", post(admin::deactivate))
        .route("/api/admin/assessments/:id/master", post(admin::set_master))
        .route("/api/admin/sweep", post(admin::sweep))
        .layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/docs/openapi.json", get(docs::openapi_json))
        .merge(entrant_api)
        .merge(admin_api)
        .with_state(state)
}
