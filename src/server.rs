use axum::{
    extract::State,
    http::Method,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    api::{create_api_router, create_webhook_router},
    config::{Config, ForwardingMode, ForwardingSettings},
    error::Result,
    orchestrator::{CallbackUrls, Orchestrator, WorkerRescheduler},
    provider::{CallControl, RestCallControl},
    registry::PendingCallRegistry,
    sse::{sse_handler, EventBroadcaster},
    tunnel,
    workspace::WorkspaceSnapshot,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub event_broadcaster: EventBroadcaster,
    pub settings: Arc<ForwardingSettings>,
}

/// Assemble the router for the configured mode.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::CACHE_CONTROL,
            axum::http::header::HeaderName::from_static("last-event-id"),
        ])
        .allow_origin(axum::http::header::HeaderValue::from_static("*"));

    let mode = state.config.mode;
    Router::new()
        .route("/health", get(health_check))
        .route("/events", get(sse_handler))
        .merge(create_webhook_router(mode))
        .nest("/api", create_api_router(mode))
        .layer(RequestBodyLimitLayer::new(256 * 1024))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Resolve where the provider should call back.
async fn resolve_public_url(config: &Config) -> String {
    if let Some(url) = &config.public_url {
        return url.clone();
    }
    match tunnel::discover(tunnel::NGROK_API_URL).await {
        Some(url) => url,
        None => {
            let url = config.local_url();
            info!("No public URL configured or discovered, using {}", url);
            url
        }
    }
}

/// Wire the orchestrator and its collaborators from configuration.
pub async fn build_state(config: Config) -> Result<AppState> {
    config.validate()?;

    let client = RestCallControl::new(config.credentials.clone(), config.endpoints.clone())?;
    let public_url = resolve_public_url(&config).await;
    let urls = CallbackUrls::new(&public_url)?;
    info!("Callback base URL: {}", urls.base());

    let event_broadcaster = EventBroadcaster::new();
    let registry = Arc::new(PendingCallRegistry::new());
    let settings = Arc::new(ForwardingSettings::from_config(&config));

    let orchestrator = match config.mode {
        ForwardingMode::Conference => {
            let control: Arc<dyn CallControl> = Arc::new(client);
            Orchestrator::new(
                control,
                registry,
                Arc::new(event_broadcaster.clone()),
                urls,
                settings.clone(),
            )
        }
        ForwardingMode::TaskRouter => {
            let name = config.workspace_name.as_deref().unwrap_or_default();
            let workspace = Arc::new(WorkspaceSnapshot::discover(&client, name).await?);
            let control: Arc<dyn CallControl> =
                Arc::new(client.with_workspace(workspace.sid.clone()));
            let rescheduler = WorkerRescheduler::new(
                control.clone(),
                workspace.activities.idle.clone(),
                config.cooldown(),
                config.reschedule,
            );
            Orchestrator::new(
                control,
                registry,
                Arc::new(event_broadcaster.clone()),
                urls,
                settings.clone(),
            )
            .with_task_router(workspace, rescheduler)
        }
    };

    Ok(AppState {
        config,
        orchestrator: Arc::new(orchestrator),
        event_broadcaster,
        settings,
    })
}

pub async fn run_server(config: Config) -> Result<()> {
    let address = config.server_address();
    let state = build_state(config).await?;
    let app = build_router(state);

    info!("Server listening on {}", address);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    match axum::serve(listener, app).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => error!("Server error: {}", e),
    }

    Ok(())
}

async fn health_check(State(state): State<AppState>) -> Result<Json<Value>> {
    Ok(Json(json!({
        "status": "healthy",
        "service": "forward-amd",
        "mode": state.config.mode.as_str(),
        "pending_calls": state.orchestrator.registry().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
