//! Router configuration and route composition.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::{
    Router,
    routing::{get, post},
};
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::handlers::{batch, health, images, sync};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// API routes without middleware, relative to `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/sync/batch",
            get(batch::batch_overview).post(batch::start_batch),
        )
        .route("/sync/batch/:id", get(batch::get_batch))
        .route("/sync/batch/:id/pause", post(batch::pause_batch))
        .route("/sync/batch/:id/resume", post(batch::resume_batch))
        .route("/sync/batch/:id/cancel", post(batch::cancel_batch))
        .route("/sync", post(sync::trigger_sync))
        .route("/status", get(sync::get_status))
        .route("/runs", get(sync::list_runs))
        .route("/images", get(images::list_images))
        .route("/images/filters", get(images::get_filters))
}

/// Creates the main application router with all routes and middleware.
///
/// # Errors
///
/// Fails when the rate limit settings are zero.
pub fn create_router(state: AppState, config: &ServerConfig) -> anyhow::Result<Router> {
    // Configure rate limiting (Arc required for cloning in layers)
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(config.rate_limit_rps.into())
            .burst_size(config.rate_limit_burst)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    let cors_layer = build_cors_layer(&config.cors_origins);

    Ok(Router::new()
        .nest("/api/v1", api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware layers (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .layer(GovernorLayer {
            config: governor_config,
        })
        .with_state(state))
}

/// Build CORS layer from configuration.
///
/// If `origins` is "*", allows any origin (for development).
/// Otherwise, parses comma-separated origins.
fn build_cors_layer(origins: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
        ])
        .max_age(Duration::from_secs(3600));

    if origins.trim() == "*" {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        let allowed: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors.allow_origin(allowed)
    }
}
