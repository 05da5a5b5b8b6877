pub mod dashboard;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{config::ForwardingMode, server::AppState};

/// Provider-facing webhook routes for the given mode
pub fn create_webhook_router(mode: ForwardingMode) -> Router<AppState> {
    let router = Router::new()
        .route("/inbound", post(webhooks::inbound))
        .route("/outbound", post(webhooks::outbound))
        .route(
            "/static/hangup.xml",
            get(webhooks::hangup_fragment).post(webhooks::hangup_fragment),
        )
        .route(
            "/static/not_available.xml",
            get(webhooks::not_available_fragment).post(webhooks::not_available_fragment),
        );

    match mode {
        ForwardingMode::Conference => {
            router.route("/inbound_ended", post(webhooks::inbound_ended))
        }
        ForwardingMode::TaskRouter => router
            .route("/assign", post(webhooks::assign))
            .route("/trevents", post(webhooks::task_router_events))
            .route("/dashboard/status", post(dashboard::update_presence)),
    }
}

/// Create the API router with all dashboard endpoint routes
pub fn create_api_router(mode: ForwardingMode) -> Router<AppState> {
    let router = Router::new().route(
        "/settings",
        get(dashboard::get_settings).post(dashboard::update_settings),
    );

    match mode {
        ForwardingMode::Conference => router,
        ForwardingMode::TaskRouter => router.route("/agents", get(dashboard::list_agents)),
    }
}
