use std::collections::HashMap;

use dashmap::DashMap;
use time::OffsetDateTime;
use uuid::Uuid;

/// One player's best standing on a quiz leaderboard.
#[derive(Debug, Clone)]
pub struct BoardEntry {
    /// Identifier of the player.
    pub actor_id: Uuid,
    /// Display name captured at completion time.
    pub name: String,
    /// Total score of the ranked attempt.
    pub score: i64,
    /// When the attempt was completed; earlier wins ties.
    pub completed_at: OffsetDateTime,
}

#[derive(Default)]
struct BoardState {
    by_actor: HashMap<Uuid, BoardEntry>,
    sorted: Vec<BoardEntry>,
    dirty: bool,
}

impl BoardState {
    fn resort(&mut self) {
        if !self.dirty {
            return;
        }
        let mut entries: Vec<BoardEntry> = self.by_actor.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.completed_at.cmp(&b.completed_at))
        });
        self.sorted = entries;
        self.dirty = false;
    }
}

/// Per-quiz competitive ranking with dirty-flag invalidation.
///
/// Writes only upsert the entry map and mark the sorted view stale; the
/// re-sort is deferred to the next read, which keeps high write rates cheap
/// between broadcasts.
pub struct LeaderboardCache {
    quizzes: DashMap<Uuid, BoardState>,
}

impl LeaderboardCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            quizzes: DashMap::new(),
        }
    }

    /// Upsert a player's entry and invalidate the sorted view.
    pub fn record_attempt(&self, quiz_id: Uuid, entry: BoardEntry) {
        let mut board = self.quizzes.entry(quiz_id).or_default();
        board.by_actor.insert(entry.actor_id, entry);
        board.dirty = true;
    }

    /// Whether the quiz already has any cached entries.
    pub fn has_entries(&self, quiz_id: Uuid) -> bool {
        self.quizzes
            .get(&quiz_id)
            .map(|board| !board.by_actor.is_empty())
            .unwrap_or(false)
    }

    /// Replace the quiz's state with entries already in rank order, as
    /// loaded from durable storage.
    pub fn replace(&self, quiz_id: Uuid, ordered: Vec<BoardEntry>) {
        let by_actor = ordered
            .iter()
            .map(|entry| (entry.actor_id, entry.clone()))
            .collect();
        self.quizzes.insert(
            quiz_id,
            BoardState {
                by_actor,
                sorted: ordered,
                dirty: false,
            },
        );
    }

    /// Run `read` against the up-to-date sorted view, re-sorting first if a
    /// write invalidated it.
    pub fn with_sorted<R>(&self, quiz_id: Uuid, read: impl FnOnce(&[BoardEntry]) -> R) -> R {
        let mut board = self.quizzes.entry(quiz_id).or_default();
        board.resort();
        read(&board.sorted)
    }

    /// One-based rank of the actor and the number of ranked players.
    ///
    /// An unranked actor is placed one past the end, matching what a view
    /// shows while the actor's own completion is still in flight.
    pub fn rank_of(&self, quiz_id: Uuid, actor_id: Uuid) -> (usize, usize) {
        self.with_sorted(quiz_id, |sorted| {
            let total = sorted.len();
            let rank = sorted
                .iter()
                .position(|entry| entry.actor_id == actor_id)
                .map(|index| index + 1)
                .unwrap_or(total + 1);
            (rank, total)
        })
    }

    /// The top `limit` entries in rank order.
    pub fn top_n(&self, quiz_id: Uuid, limit: usize) -> Vec<BoardEntry> {
        self.with_sorted(quiz_id, |sorted| {
            sorted.iter().take(limit).cloned().collect()
        })
    }

    /// Drop all cached state of a quiz.
    pub fn clear_quiz(&self, quiz_id: Uuid) {
        self.quizzes.remove(&quiz_id);
    }
}

impl Default for LeaderboardCache {
    fn default() -> Self {
        Self::new()
    }
}
