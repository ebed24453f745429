use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::dto::leaderboard::RankedPlayer;

#[derive(Clone, Debug)]
/// Dispatched payload carried across room channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Build an event from a name and pre-serialized data.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<T>(event: &str, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: Some(event.to_string()),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the vote percentages of a question changed.
pub struct StatsUpdatedEvent {
    /// Zero-based question position.
    pub question_index: usize,
    /// Vote percentage per option.
    pub stats: Vec<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Whether the answering player picked the correct option.
pub enum AnswerAction {
    Correct,
    Wrong,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
/// One entry of the batched per-answer activity feed.
pub struct PlayerAnsweredEvent {
    /// Display name of the answering player.
    pub player_name: String,
    /// Outcome of the answer.
    pub action: AnswerAction,
    /// Zero-based question position.
    pub question_index: usize,
    /// RFC 3339 timestamp of the submission.
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Unthrottled per-answer event for privileged observers.
pub struct AdminAnswerEvent {
    /// Display name of the answering player.
    pub player_name: String,
    /// Zero-based question position.
    pub question_index: usize,
    /// Index of the chosen option.
    pub option_index: u32,
    /// Whether the chosen option was correct.
    pub is_correct: bool,
    /// Awarded score.
    pub score: i32,
    /// RFC 3339 timestamp of the submission.
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast of the refreshed leaderboard after completions.
pub struct LeaderboardUpdatedEvent {
    /// Rank of the most recently completing player.
    pub rank: usize,
    /// Number of ranked players.
    pub total_players: usize,
    /// Leading players, best first.
    pub top_players: Vec<RankedPlayer>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Periodic viewer-count push for a quiz room.
pub struct PlayersCountEvent {
    /// Number of connected room members.
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
/// Which of a quiz's rooms an event stream joins.
pub enum StreamRole {
    /// Public viewer room with throttled projections.
    #[default]
    Viewer,
    /// Privileged room that also receives per-answer events.
    Admin,
}

#[derive(Debug, Deserialize, IntoParams)]
/// Query parameters of the quiz event stream endpoint.
pub struct EventsQuery {
    /// Room to join; defaults to the viewer room.
    pub role: Option<StreamRole>,
}
