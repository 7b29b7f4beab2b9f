use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use common::errors::AppError;
use common::models::{CityReading, EntityId, PassOutcome, ReadingsResponse, RefreshStatus};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::IntoParams;

use crate::query::QueryFacade;
use crate::scheduler::RefreshScheduler;

const MAX_QUERY_LEN: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub query: QueryFacade,
    pub scheduler: Arc<RefreshScheduler>,
    pub jwt_secret: Option<Arc<str>>,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health check")
    )
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "city-weather-service" }))
}

#[utoipa::path(
    get,
    path = "/api/readings",
    responses(
        (status = 200, description = "Latest reading for every city", body = ReadingsResponse),
        (status = 503, description = "Storage unavailable")
    ),
    tag = "readings"
)]
pub async fn list_readings(
    State(state): State<AppState>,
) -> Result<Json<ReadingsResponse>, AppError> {
    let readings = state.query.all_readings().await?;

    Ok(Json(ReadingsResponse::new(readings)))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Case-insensitive fragment of the city name
    #[serde(default)]
    pub q: String,
}

#[utoipa::path(
    get,
    path = "/api/readings/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Readings for matching cities", body = ReadingsResponse),
        (status = 400, description = "Query too long")
    ),
    tag = "readings"
)]
pub async fn search_readings(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ReadingsResponse>, AppError> {
    if params.q.chars().count() > MAX_QUERY_LEN {
        return Err(AppError::validation(format!(
            "Search query must be at most {} characters",
            MAX_QUERY_LEN
        )));
    }

    info!(query = %params.q, "Search request received");
    let readings = state.query.filter(&params.q).await?;

    Ok(Json(ReadingsResponse::new(readings)))
}

#[utoipa::path(
    get,
    path = "/api/readings/{id}",
    params(
        ("id" = i64, Path, description = "City ID")
    ),
    responses(
        (status = 200, description = "Latest reading for the city", body = CityReading),
        (status = 404, description = "No reading for this city yet")
    ),
    tag = "readings"
)]
pub async fn get_reading(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CityReading>, AppError> {
    let entity_id = EntityId(id);

    state
        .query
        .reading(entity_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("No reading for city {}", entity_id)))
}

#[utoipa::path(
    post,
    path = "/api/admin/refresh",
    responses(
        (status = 200, description = "Pass completed, or skipped because one was already running", body = PassOutcome),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn trigger_refresh(
    State(state): State<AppState>,
) -> Result<Json<PassOutcome>, AppError> {
    info!("Manual refresh requested");

    let outcome = state.scheduler.run_refresh_pass().await?;

    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/api/admin/refresh/status",
    responses(
        (status = 200, description = "Scheduler state and last pass summary", body = RefreshStatus),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn refresh_status(State(state): State<AppState>) -> Json<RefreshStatus> {
    Json(state.scheduler.status().await)
}
