//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
///
/// `/api/loan` enforces its own size and time bounds so the counterparty always gets an XML
/// answer; the JSON endpoints use the tower-http layers.
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    // Counterparty documents
    let document_routes = Router::new().route("/loan", post(handlers::receive_message));

    let json_routes = Router::new()
        // Banking engine events
        .route("/webhook/mifos", post(handlers::banking_webhook))
        // Operator triggers
        .route(
            "/loans/:application_number/disbursement-notification",
            post(handlers::disbursement_notification),
        )
        .route(
            "/loans/:application_number/disbursement-failure-notification",
            post(handlers::disbursement_failure_notification),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
        .layer(RequestBodyLimitLayer::new(server.max_body_size));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", document_routes.merge(json_routes))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::disable())
        .with_state(state.with_limits(server))
}
