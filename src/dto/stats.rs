use serde::Serialize;
use utoipa::ToSchema;

/// Vote percentage projection for one question.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsProjectionResponse {
    /// Zero-based question position.
    pub question_index: usize,
    /// Vote percentage per option; all zeros when nobody answered yet.
    pub stats: Vec<u32>,
    /// Number of recorded answers for the question.
    pub total_answers: u64,
}
