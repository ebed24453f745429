use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::answer::{
        CompleteAttemptRequest, CompleteAttemptResponse, SubmitAnswerRequest, SubmitAnswerResponse,
    },
    error::AppError,
    services::quiz_service,
    state::SharedState,
};

/// Routes handling answer submission and attempt completion.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/quizzes/{id}/answers", post(submit_answer))
        .route("/quizzes/{id}/complete", post(complete_attempt))
        .route("/quizzes/{id}/finalize", post(finalize_quiz))
}

/// Submit one answer into the ingestion pipeline.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/answers",
    tag = "answers",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Submission outcome", body = SubmitAnswerResponse),
        (status = 503, description = "Answer not accepted, please retry")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<SubmitAnswerRequest>>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let response = quiz_service::submit_answer(&state, id, payload).await?;
    Ok(Json(response))
}

/// Complete the caller's attempt, blocking until its answers are durable.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/complete",
    tag = "answers",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    request_body = CompleteAttemptRequest,
    responses(
        (status = 200, description = "Completion outcome", body = CompleteAttemptResponse)
    )
)]
pub async fn complete_attempt(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<CompleteAttemptRequest>>,
) -> Result<Json<CompleteAttemptResponse>, AppError> {
    let response = quiz_service::complete_attempt(&state, id, payload).await?;
    Ok(Json(response))
}

/// Drain every pending answer of the quiz into durable storage.
#[utoipa::path(
    post,
    path = "/quizzes/{id}/finalize",
    tag = "answers",
    params(("id" = Uuid, Path, description = "Identifier of the quiz")),
    responses((status = 204, description = "All pending answers are durable"))
)]
pub async fn finalize_quiz(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, AppError> {
    quiz_service::finalize_quiz(&state, id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
