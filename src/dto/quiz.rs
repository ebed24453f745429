use serde::Deserialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Activation payload announcing a quiz has gone live.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ActivateQuizRequest {
    /// When the quiz stops accepting answers.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub expires_at: OffsetDateTime,
    /// The quiz's questions in play order, used to prime the stats cache.
    #[validate(nested)]
    pub questions: Vec<QuestionRef>,
}

/// Reference to one question of an activating quiz.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuestionRef {
    /// Question identifier.
    pub id: Uuid,
    /// Zero-based position of the question within the quiz.
    #[validate(range(max = 499))]
    pub position: usize,
}
