//! HTTP route handlers for the CAPTCHA API.

use axum::{
    Router,
    middleware,
    routing::{any, get},
};
use tower::Layer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::trace::TraceLayer;

use crate::proxy;
use crate::state::AppState;

mod captcha;
mod docs;
mod error;
mod health;
mod index;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let prefix = state.settings().api_prefix();
    tracing::info!(prefix = %prefix, "Registering API");

    let app = Router::new()
        // Root
        .route("/", any(index::index))
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Versioned API
        .nest(&prefix, api_routes())
        .with_state(state.clone());

    // `/captcha/` and `/captcha` hit the same handler
    let app = NormalizePathLayer::trim_trailing_slash().layer(app);

    // Swagger UI stays outside path normalization: it redirects
    // `/swagger-ui` to `/swagger-ui/` itself.
    Router::new()
        .merge(docs::swagger_ui(state.settings()))
        .fallback_service(app)
        .layer(middleware::from_fn(proxy::normalize_forwarded_headers))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
}

/// Resources mounted under `/api/{API_VERSION}`
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/captcha",
            get(captcha::create_captcha).post(captcha::validate_captcha),
        )
        .route("/captcha/{id}/image", get(captcha::captcha_image))
}

/// Every origin, method and header is allowed
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
