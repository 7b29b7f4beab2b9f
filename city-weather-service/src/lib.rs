//! City weather refresh service.
//!
//! A background [`scheduler::RefreshScheduler`] walks the city directory on a
//! fixed interval, fetches current conditions through a
//! [`api_client::WeatherSource`] and keeps the latest reading per city in a
//! [`store::ReadingStore`]. The HTTP API only ever reads from the store.

pub mod api_client;
pub mod config;
pub mod directory;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod query;
pub mod scheduler;
pub mod store;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use handlers::AppState;

pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/readings", get(handlers::list_readings))
        .route("/api/readings/search", get(handlers::search_readings))
        .route("/api/readings/{id}", get(handlers::get_reading));

    // Admin routes (require JWT + admin role)
    let admin_routes = Router::new()
        .route("/api/admin/refresh", post(handlers::trigger_refresh))
        .route("/api/admin/refresh/status", get(handlers::refresh_status))
        .layer(axum_middleware::from_fn(middleware::require_admin))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    public_routes
        .merge(admin_routes)
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
