use std::{
    collections::{HashMap, HashSet},
    mem,
    sync::Mutex,
};

use tokio::sync::watch;
use tokio::time::interval;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::events::{PlayerAnsweredEvent, PlayersCountEvent, ServerEvent, StatsUpdatedEvent},
    services::quiz_service,
    state::{
        SharedState,
        rooms::{admin_room, quiz_room},
    },
};

/// Dirty-tracking state accumulated between fanout ticks.
///
/// Marking is cheap and happens on the request path; each throttle loop
/// drains its own category once per tick and recomputes every dirty key
/// exactly once, regardless of how many events touched it.
pub struct FanoutDirty {
    stats: Mutex<HashMap<Uuid, HashSet<usize>>>,
    answered: Mutex<HashMap<Uuid, Vec<PlayerAnsweredEvent>>>,
    leaderboard: Mutex<HashMap<Uuid, Uuid>>,
    viewer_count: Mutex<HashSet<Uuid>>,
}

impl FanoutDirty {
    /// Create empty dirty-tracking state.
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(HashMap::new()),
            answered: Mutex::new(HashMap::new()),
            leaderboard: Mutex::new(HashMap::new()),
            viewer_count: Mutex::new(HashSet::new()),
        }
    }

    /// Mark a question's vote stats as needing a broadcast.
    pub fn mark_stats_dirty(&self, quiz_id: Uuid, question_index: usize) {
        let mut stats = self.stats.lock().expect("stats lock poisoned");
        stats.entry(quiz_id).or_default().insert(question_index);
    }

    /// Queue a per-answer activity event for the next batched push.
    pub fn queue_player_answered(&self, quiz_id: Uuid, event: PlayerAnsweredEvent) {
        let mut answered = self.answered.lock().expect("answered lock poisoned");
        answered.entry(quiz_id).or_default().push(event);
    }

    /// Mark a quiz's leaderboard as needing a broadcast, remembering the
    /// most recent completing actor for rank computation.
    pub fn mark_leaderboard_dirty(&self, quiz_id: Uuid, actor_id: Uuid) {
        let mut leaderboard = self.leaderboard.lock().expect("leaderboard lock poisoned");
        leaderboard.insert(quiz_id, actor_id);
    }

    /// Mark a quiz's viewer count as needing a push.
    pub fn mark_viewer_count_dirty(&self, quiz_id: Uuid) {
        let mut counts = self.viewer_count.lock().expect("viewer count lock poisoned");
        counts.insert(quiz_id);
    }

    /// Take every dirty stats key accumulated since the last drain.
    pub fn drain_stats(&self) -> HashMap<Uuid, HashSet<usize>> {
        let mut stats = self.stats.lock().expect("stats lock poisoned");
        mem::take(&mut stats)
    }

    /// Take every queued activity batch.
    pub fn drain_answered(&self) -> HashMap<Uuid, Vec<PlayerAnsweredEvent>> {
        let mut answered = self.answered.lock().expect("answered lock poisoned");
        mem::take(&mut answered)
    }

    /// Take every dirty leaderboard key.
    pub fn drain_leaderboard(&self) -> HashMap<Uuid, Uuid> {
        let mut leaderboard = self.leaderboard.lock().expect("leaderboard lock poisoned");
        mem::take(&mut leaderboard)
    }

    /// Take every quiz whose viewer count should be pushed.
    pub fn drain_viewer_counts(&self) -> HashSet<Uuid> {
        let mut counts = self.viewer_count.lock().expect("viewer count lock poisoned");
        mem::take(&mut counts)
    }
}

impl Default for FanoutDirty {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically broadcast refreshed vote stats for dirty questions.
pub async fn run_stats_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().stats_push_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => flush_stats(&state),
            _ = shutdown.changed() => break,
        }
    }
}

/// Periodically broadcast batched per-answer activity events.
pub async fn run_answered_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().answered_push_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => flush_answered(&state),
            _ = shutdown.changed() => break,
        }
    }
}

/// Periodically broadcast refreshed leaderboards for dirty quizzes.
pub async fn run_leaderboard_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().leaderboard_push_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => flush_leaderboard(&state).await,
            _ = shutdown.changed() => break,
        }
    }
}

/// Periodically push viewer counts for dirty quizzes.
pub async fn run_viewer_count_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().viewer_count_push_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => flush_viewer_counts(&state),
            _ = shutdown.changed() => break,
        }
    }
}

fn flush_stats(state: &SharedState) {
    for (quiz_id, questions) in state.fanout().drain_stats() {
        for question_index in questions {
            let stats = state.stats().project(quiz_id, question_index);
            let payload = StatsUpdatedEvent {
                question_index,
                stats,
            };
            let Ok(event) = ServerEvent::json("stats:updated", &payload) else {
                continue;
            };
            state.rooms().publish(&quiz_room(quiz_id), event.clone());
            state.rooms().publish(&admin_room(quiz_id), event);
        }
    }
}

fn flush_answered(state: &SharedState) {
    for (quiz_id, events) in state.fanout().drain_answered() {
        if events.is_empty() {
            continue;
        }
        let Ok(event) = ServerEvent::json("players:answered_batch", &events) else {
            continue;
        };
        state.rooms().publish(&quiz_room(quiz_id), event);
    }
}

async fn flush_leaderboard(state: &SharedState) {
    for (quiz_id, actor_id) in state.fanout().drain_leaderboard() {
        match quiz_service::leaderboard_update(state, quiz_id, actor_id).await {
            Ok(update) => {
                let Ok(event) = ServerEvent::json("leaderboard:updated", &update) else {
                    continue;
                };
                state.rooms().publish(&quiz_room(quiz_id), event.clone());
                state.rooms().publish(&admin_room(quiz_id), event);
            }
            Err(err) => {
                warn!(%quiz_id, error = %err, "failed to refresh leaderboard for broadcast");
            }
        }
    }
}

fn flush_viewer_counts(state: &SharedState) {
    for quiz_id in state.fanout().drain_viewer_counts() {
        let room = quiz_room(quiz_id);
        let payload = PlayersCountEvent {
            count: state.rooms().member_count(&room),
        };
        let Ok(event) = ServerEvent::json("players:count", &payload) else {
            continue;
        };
        state.rooms().publish(&room, event.clone());
        state.rooms().publish(&admin_room(quiz_id), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::events::AnswerAction;

    #[test]
    fn fifty_marks_coalesce_into_one_dirty_key() {
        let dirty = FanoutDirty::new();
        let quiz = Uuid::new_v4();

        for _ in 0..50 {
            dirty.mark_stats_dirty(quiz, 2);
        }

        let drained = dirty.drain_stats();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[&quiz].len(), 1);
        assert!(drained[&quiz].contains(&2));

        // The next tick starts from a clean slate.
        assert!(dirty.drain_stats().is_empty());
    }

    #[test]
    fn distinct_questions_stay_distinct() {
        let dirty = FanoutDirty::new();
        let quiz = Uuid::new_v4();

        dirty.mark_stats_dirty(quiz, 0);
        dirty.mark_stats_dirty(quiz, 1);
        dirty.mark_stats_dirty(quiz, 0);

        let drained = dirty.drain_stats();
        assert_eq!(drained[&quiz].len(), 2);
    }

    #[test]
    fn answered_events_batch_per_quiz() {
        let dirty = FanoutDirty::new();
        let quiz = Uuid::new_v4();

        for index in 0..3 {
            dirty.queue_player_answered(
                quiz,
                PlayerAnsweredEvent {
                    player_name: format!("player-{index}"),
                    action: AnswerAction::Correct,
                    question_index: 0,
                    timestamp: "2026-01-01T00:00:00Z".into(),
                },
            );
        }

        let drained = dirty.drain_answered();
        assert_eq!(drained[&quiz].len(), 3);
        assert!(dirty.drain_answered().is_empty());
    }

    #[test]
    fn leaderboard_marks_keep_the_latest_actor() {
        let dirty = FanoutDirty::new();
        let quiz = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        dirty.mark_leaderboard_dirty(quiz, first);
        dirty.mark_leaderboard_dirty(quiz, second);

        let drained = dirty.drain_leaderboard();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[&quiz], second);
    }
}
