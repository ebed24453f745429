use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

/// A single validated answer as it travels through the ingestion pipeline.
///
/// Immutable once created; duplicates are collapsed by the unique
/// (actor, question) constraint on the durable store, so replaying a record
/// is always harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Identifier of the quiz attempt this answer belongs to.
    pub attempt_id: Uuid,
    /// Identifier of the answering player.
    pub actor_id: Uuid,
    /// Identifier of the answered question.
    pub question_id: Uuid,
    /// Identifier of the quiz the question belongs to.
    pub quiz_id: Uuid,
    /// Index of the chosen option.
    pub option_index: i32,
    /// Whether the chosen option was the correct one.
    pub is_correct: bool,
    /// Seconds left on the question timer when the answer was submitted.
    pub time_left: i32,
    /// Score awarded for this answer.
    pub score: i32,
}

impl AnswerRecord {
    /// Serialize the record into the flat string fields of a stream entry.
    pub fn to_stream_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("attempt_id", self.attempt_id.to_string()),
            ("actor_id", self.actor_id.to_string()),
            ("question_id", self.question_id.to_string()),
            ("quiz_id", self.quiz_id.to_string()),
            ("option_index", self.option_index.to_string()),
            ("is_correct", if self.is_correct { "1" } else { "0" }.into()),
            ("time_left", self.time_left.to_string()),
            ("score", self.score.to_string()),
        ]
    }

    /// Rebuild a record from stream entry fields.
    ///
    /// Malformed or missing numeric fields are coerced to 0 so a single bad
    /// entry can never fail a whole batch; missing identifiers collapse to
    /// the nil UUID and are absorbed by the store's insert-or-ignore write.
    pub fn from_stream_fields(fields: &HashMap<String, String>) -> Self {
        let field_uuid = |name: &str| {
            fields
                .get(name)
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .unwrap_or_default()
        };
        let field_i32 = |name: &str| {
            fields
                .get(name)
                .and_then(|raw| raw.parse::<i32>().ok())
                .unwrap_or(0)
                .max(0)
        };
        let field_score = |name: &str| {
            fields
                .get(name)
                .and_then(|raw| raw.parse::<i32>().ok())
                .unwrap_or(0)
        };

        Self {
            attempt_id: field_uuid("attempt_id"),
            actor_id: field_uuid("actor_id"),
            question_id: field_uuid("question_id"),
            quiz_id: field_uuid("quiz_id"),
            option_index: field_i32("option_index"),
            is_correct: matches!(
                fields.get("is_correct").map(String::as_str),
                Some("1") | Some("true")
            ),
            time_left: field_i32("time_left"),
            score: field_score("score"),
        }
    }
}

/// A completed quiz attempt as stored durably, used to seed the leaderboard.
#[derive(Debug, Clone)]
pub struct AttemptRow {
    /// Identifier of the player who completed the attempt.
    pub actor_id: Uuid,
    /// Display name captured at completion time.
    pub display_name: String,
    /// Sum of the per-answer scores of the attempt.
    pub total_score: i64,
    /// When the attempt was completed.
    pub completed_at: OffsetDateTime,
}

/// Payload for recording a freshly completed attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    /// Identifier assigned to the attempt.
    pub id: Uuid,
    /// Quiz the attempt belongs to.
    pub quiz_id: Uuid,
    /// Player who completed the attempt.
    pub actor_id: Uuid,
    /// Display name captured at completion time.
    pub display_name: String,
    /// Sum of the per-answer scores.
    pub total_score: i64,
    /// Number of correctly answered questions.
    pub correct_count: i64,
    /// Number of questions in the quiz at completion time.
    pub total_questions: i64,
    /// Whether this is the actor's first completion of the quiz.
    pub is_first_attempt: bool,
}

/// Vote count for one (question, option) pair, used to prime the stats cache.
#[derive(Debug, Clone)]
pub struct VoteAggregateRow {
    /// Question the votes belong to.
    pub question_id: Uuid,
    /// Chosen option index.
    pub option_index: i32,
    /// Number of recorded answers for the option.
    pub votes: i64,
}

/// Position of a question within its quiz.
#[derive(Debug, Clone)]
pub struct QuestionPositionRow {
    /// Question identifier.
    pub question_id: Uuid,
    /// Zero-based position of the question in the quiz.
    pub position: i32,
}

/// Per-actor aggregate over the durably stored answers of one quiz.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActorTotals {
    /// Sum of the actor's answer scores.
    pub score_sum: i64,
    /// Number of the actor's correct answers.
    pub correct_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn stream_fields_round_trip() {
        let record = AnswerRecord {
            attempt_id: Uuid::new_v4(),
            actor_id: Uuid::new_v4(),
            question_id: Uuid::new_v4(),
            quiz_id: Uuid::new_v4(),
            option_index: 2,
            is_correct: true,
            time_left: 17,
            score: 270,
        };

        let encoded: HashMap<String, String> = record
            .to_stream_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        assert_eq!(AnswerRecord::from_stream_fields(&encoded), record);
    }

    #[test]
    fn malformed_numeric_fields_coerce_to_zero() {
        let quiz_id = Uuid::new_v4();
        let decoded = AnswerRecord::from_stream_fields(&fields(&[
            ("quiz_id", quiz_id.to_string().as_str()),
            ("option_index", "not-a-number"),
            ("time_left", "NaN"),
            ("is_correct", "1"),
        ]));

        assert_eq!(decoded.quiz_id, quiz_id);
        assert_eq!(decoded.option_index, 0);
        assert_eq!(decoded.time_left, 0);
        assert_eq!(decoded.score, 0);
        assert!(decoded.is_correct);
    }

    #[test]
    fn negative_counters_are_clamped() {
        let decoded = AnswerRecord::from_stream_fields(&fields(&[
            ("option_index", "-3"),
            ("time_left", "-10"),
        ]));

        assert_eq!(decoded.option_index, 0);
        assert_eq!(decoded.time_left, 0);
        assert!(!decoded.is_correct);
        assert_eq!(decoded.actor_id, Uuid::nil());
    }
}
