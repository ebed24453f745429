use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// One ranked row of a leaderboard view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RankedPlayer {
    /// Display name recorded at completion time.
    pub name: String,
    /// Total score of the player's first attempt.
    pub score: i64,
    /// One-based rank.
    pub rank: usize,
}

/// Query parameters of the leaderboard view endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct LeaderboardQuery {
    /// Player requesting the view; used to compute `my_rank`.
    pub actor_id: Uuid,
    /// Maximum number of rows to return (default 50).
    pub limit: Option<usize>,
}

/// Leaderboard view centered on the requesting player.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardViewResponse {
    /// Leading players, best first, up to the requested limit.
    pub players: Vec<RankedPlayer>,
    /// Rank of the requesting player; one past the end when unranked.
    pub my_rank: usize,
    /// Number of ranked players.
    pub total_players: usize,
}
