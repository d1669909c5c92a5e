// Route modules
pub mod batches;
pub mod schedules;

use crate::{
    app_state::AppState,
    middleware::{jwt_auth_middleware, logging_middleware},
};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// CSV uploads may exceed axum's default body limit
const CSV_UPLOAD_LIMIT: usize = 16 * 1024 * 1024;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);

    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// API v1 routes; all of them are company-scoped and require a JWT
fn api_v1_routes(state: AppState) -> Router<AppState> {
    let schedule_routes = Router::new()
        .route(
            "/retirement-schedules",
            post(schedules::create_schedule).get(schedules::list_schedules),
        )
        .route(
            "/retirement-schedules/{id}",
            get(schedules::get_schedule)
                .patch(schedules::update_schedule)
                .delete(schedules::delete_schedule),
        )
        .route(
            "/retirement-schedules/{id}/pause",
            post(schedules::pause_schedule),
        )
        .route(
            "/retirement-schedules/{id}/resume",
            post(schedules::resume_schedule),
        )
        .route(
            "/retirement-schedules/{id}/execute",
            post(schedules::execute_schedule_now),
        )
        .route(
            "/retirement-schedules/{id}/executions",
            get(schedules::list_executions),
        );

    let batch_routes = Router::new()
        .route(
            "/retirement-batches",
            post(batches::create_batch).get(batches::list_batches),
        )
        .route(
            "/retirement-batches/csv",
            post(batches::create_batch_from_csv).layer(DefaultBodyLimit::max(CSV_UPLOAD_LIMIT)),
        )
        .route("/retirement-batches/{id}", get(batches::get_batch));

    Router::new()
        .merge(schedule_routes)
        .merge(batch_routes)
        .layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
        .layer(middleware::from_fn(logging_middleware))
}
