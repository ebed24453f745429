use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        leaderboard::{LeaderboardQuery, LeaderboardViewResponse},
        quiz::ActivateQuizRequest,
        stats::StatsProjectionResponse,
    },
    error::AppError,
    services::quiz_service,
    state::SharedState,
};

/// Routes handling quiz activation, eviction, and live projections.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/quizzes/{id}/activate", post(activate_quiz))
        .route("/quizzes/{id}/reset", post(reset_quiz))
        .route("/quizzes/{id}", delete(delete_quiz))
        .route(
            "/quizzes/{id}/stats/{question_index}",
            get(stats_projection),
        )
        .route("/quizzes/{id}/leaderboard", get(leaderboard_view))
}

/// Prime caches and schedule lifecycle timers for a quiz going live.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/activate",
    tag = "quizzes",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    request_body = ActivateQuizRequest,
    responses(
        (status = 204, description = "Quiz activated"),
        (status = 410, description = "Quiz already expired")
    )
)]
pub async fn activate_quiz(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ActivateQuizRequest>>,
) -> Result<StatusCode, AppError> {
    quiz_service::activate_quiz(&state, id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Evict all cached state of the quiz so it re-primes from storage.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/reset",
    tag = "quizzes",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    responses((status = 204, description = "Quiz state evicted"))
)]
pub async fn reset_quiz(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    quiz_service::reset_quiz(&state, id);
    StatusCode::NO_CONTENT
}

/// Evict all cached state of a deleted quiz and cancel its timers.
#[utoipa::path(
    delete,
    path = "/quizzes/{id}",
    tag = "quizzes",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    responses((status = 204, description = "Quiz state evicted"))
)]
pub async fn delete_quiz(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    quiz_service::delete_quiz(&state, id);
    StatusCode::NO_CONTENT
}

/// Current vote percentages for one question.
#[utoipa::path(
    get,
    path = "/quizzes/{id}/stats/{question_index}",
    tag = "quizzes",
    params(
        ("id" = Uuid, Path, description = "Identifier of the quiz"),
        ("question_index" = usize, Path, description = "Zero-based question position")
    ),
    responses((status = 200, description = "Vote percentages", body = StatsProjectionResponse))
)]
pub async fn stats_projection(
    State(state): State<SharedState>,
    Path((id, question_index)): Path<(Uuid, usize)>,
) -> Result<Json<StatsProjectionResponse>, AppError> {
    let response = quiz_service::stats_projection(&state, id, question_index).await?;
    Ok(Json(response))
}

/// Leaderboard view centered on the requesting player.
#[utoipa::path(
    get,
    path = "/quizzes/{id}/leaderboard",
    tag = "quizzes",
    params(
        ("id" = Uuid, Path, description = "Identifier of the quiz"),
        LeaderboardQuery
    ),
    responses((status = 200, description = "Leaderboard view", body = LeaderboardViewResponse))
)]
pub async fn leaderboard_view(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardViewResponse>, AppError> {
    let response =
        quiz_service::leaderboard_view(&state, id, query.actor_id, query.limit).await?;
    Ok(Json(response))
}
