use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Answer submission as validated and enriched by the upstream request path.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Identifier of the quiz attempt the answer belongs to.
    pub attempt_id: Uuid,
    /// Identifier of the answering player.
    pub actor_id: Uuid,
    /// Identifier of the answered question.
    pub question_id: Uuid,
    /// Zero-based position of the question within the quiz.
    #[validate(range(max = 499))]
    pub question_index: usize,
    /// Index of the chosen option.
    #[validate(range(max = 9))]
    pub option_index: u32,
    /// Whether the chosen option is the correct one.
    pub is_correct: bool,
    /// Seconds left on the question timer at submission.
    #[validate(range(max = 3600))]
    pub time_left: u32,
    /// Display name used for activity and leaderboard events.
    #[validate(length(min = 1, max = 64))]
    pub player_name: String,
}

/// Outcome of an answer submission.
///
/// A duplicate is a defined outcome, not an error; transient backend
/// failures surface as HTTP 503 instead so the client can retry.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Whether the answer was admitted into the pipeline.
    pub accepted: bool,
    /// Whether the answer was rejected as already recorded.
    pub is_duplicate: bool,
    /// Echo of the correctness flag, present when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    /// Awarded score, present when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    /// Current vote percentages for the question, present when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Vec<u32>>,
}

impl SubmitAnswerResponse {
    /// Response for an answer rejected as a duplicate.
    pub fn duplicate() -> Self {
        Self {
            accepted: false,
            is_duplicate: true,
            is_correct: None,
            score: None,
            stats: None,
        }
    }

    /// Response for an accepted answer.
    pub fn accepted(is_correct: bool, score: i32, stats: Vec<u32>) -> Self {
        Self {
            accepted: true,
            is_duplicate: false,
            is_correct: Some(is_correct),
            score: Some(score),
            stats: Some(stats),
        }
    }
}

/// Request to complete the caller's attempt at a quiz.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CompleteAttemptRequest {
    /// Identifier of the completing player.
    pub actor_id: Uuid,
    /// Display name to record on the leaderboard.
    #[validate(length(min = 1, max = 64))]
    pub player_name: String,
}

/// Result of completing an attempt.
#[derive(Debug, Serialize, ToSchema)]
pub struct CompleteAttemptResponse {
    /// Whether this completion created the actor's first attempt.
    pub is_first_attempt: bool,
    /// The actor's rank after the completion.
    pub rank: usize,
    /// Number of ranked players.
    pub total_players: usize,
}
