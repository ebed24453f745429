use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::health::{ConsumerHealthResponse, HealthResponse},
    error::AppError,
    services::health_service,
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/healthcheck",
    tag = "health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
/// Return the current health status of the backend and ping storage.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<HealthResponse> {
    let status = health_service::health_status(&state).await;
    Json(status)
}

#[utoipa::path(
    get,
    path = "/health/consumer",
    tag = "health",
    responses((status = 200, description = "Consumer heartbeat and backlog", body = ConsumerHealthResponse))
)]
/// Report the stream consumer's heartbeat freshness and backlog metrics.
pub async fn consumer_health(
    State(state): State<SharedState>,
) -> Result<Json<ConsumerHealthResponse>, AppError> {
    let response = health_service::consumer_health(&state).await?;
    Ok(Json(response))
}

/// Configure the health routes subtree.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/healthcheck", get(healthcheck))
        .route("/health/consumer", get(consumer_health))
}
