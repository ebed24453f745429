use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::{task::AbortHandle, time::sleep};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::answer_store::AnswerStore,
    dto::events::ServerEvent,
    error::ServiceError,
    state::{SharedState, rooms::quiz_room},
};

/// Registry of the pending expiry and cleanup timers, keyed by quiz.
///
/// A quiz is "hot" while it has an entry here; the entry disappears when the
/// cleanup timer fires or the quiz is evicted manually.
pub struct LifecycleTimers {
    timers: DashMap<Uuid, QuizTimers>,
}

struct QuizTimers {
    expiry: Option<AbortHandle>,
    cleanup: AbortHandle,
}

impl LifecycleTimers {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            timers: DashMap::new(),
        }
    }

    /// Whether timers are already scheduled for the quiz.
    pub fn contains(&self, quiz_id: Uuid) -> bool {
        self.timers.contains_key(&quiz_id)
    }

    fn insert(&self, quiz_id: Uuid, timers: QuizTimers) {
        self.timers.insert(quiz_id, timers);
    }

    fn cancel(&self, quiz_id: Uuid) {
        if let Some((_key, timers)) = self.timers.remove(&quiz_id) {
            if let Some(expiry) = timers.expiry {
                expiry.abort();
            }
            timers.cleanup.abort();
        }
    }

    /// Abort every pending timer; used on shutdown.
    pub fn cancel_all(&self) {
        let quiz_ids: Vec<Uuid> = self.timers.iter().map(|entry| *entry.key()).collect();
        for quiz_id in quiz_ids {
            self.cancel(quiz_id);
        }
    }
}

impl Default for LifecycleTimers {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule the expiry broadcast and the delayed cache cleanup of a quiz.
///
/// Idempotent: a quiz that already has timers keeps them. An expiry in the
/// past fires immediately; a cleanup point in the past evicts immediately
/// without registering anything.
pub fn schedule_quiz_expiry(state: &SharedState, quiz_id: Uuid, expires_at: OffsetDateTime) {
    if state.lifecycle().contains(quiz_id) {
        return;
    }

    let now = OffsetDateTime::now_utc();
    let until_expiry = expires_at - now;
    let grace = time::Duration::try_from(state.config().cleanup_grace)
        .unwrap_or_else(|_| time::Duration::minutes(30));
    let until_cleanup = until_expiry + grace;

    if until_cleanup <= time::Duration::ZERO {
        expire_quiz(state, quiz_id);
        clear_quiz_state(state, quiz_id);
        return;
    }

    let expiry = if until_expiry > time::Duration::ZERO {
        let task_state = state.clone();
        let delay = until_expiry.unsigned_abs();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            expire_quiz(&task_state, quiz_id);
        });
        Some(handle.abort_handle())
    } else {
        expire_quiz(state, quiz_id);
        None
    };

    let cleanup = {
        let task_state = state.clone();
        let delay = until_cleanup.unsigned_abs();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            debug!(%quiz_id, "cleanup timer fired");
            clear_quiz_state(&task_state, quiz_id);
        });
        handle.abort_handle()
    };

    state
        .lifecycle()
        .insert(quiz_id, QuizTimers { expiry, cleanup });
}

/// Schedule timers from the stored expiry when none exist yet.
///
/// Best-effort: without a store the quiz simply stays unscheduled until the
/// next read or activation.
pub async fn ensure_quiz_expiry(state: &SharedState, quiz_id: Uuid) -> Result<(), ServiceError> {
    if state.lifecycle().contains(quiz_id) {
        return Ok(());
    }
    let Some(store) = state.answer_store().await else {
        return Ok(());
    };
    if let Some(expires_at) = store.quiz_expiry(quiz_id).await? {
        schedule_quiz_expiry(state, quiz_id, expires_at);
    }
    Ok(())
}

/// Evict every warm cache of the quiz and cancel its timers.
///
/// Safe against lifecycle races: running this for an already-cleaned quiz is
/// a no-op, so a timer firing after a manual eviction cannot crash.
pub fn clear_quiz_state(state: &SharedState, quiz_id: Uuid) {
    state.stats().clear_quiz(quiz_id);
    state.leaderboard().clear_quiz(quiz_id);
    state.lifecycle().cancel(quiz_id);
    debug!(%quiz_id, "quiz state evicted");
}

fn expire_quiz(state: &SharedState, quiz_id: Uuid) {
    info!(%quiz_id, "quiz expired; closing its room");
    let room = quiz_room(quiz_id);
    state
        .rooms()
        .publish(&room, ServerEvent::new(Some("quiz:expired".into()), "{}".into()));
    state.rooms().disconnect_room(&room);
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use tokio::time::{advance, timeout};

    use super::*;
    use crate::{
        services::testing::test_state,
        state::rooms::{RoomEvent, quiz_room},
    };

    async fn recv_event(
        subscription: &mut crate::state::rooms::RoomSubscription,
    ) -> RoomEvent {
        timeout(StdDuration::from_secs(1), subscription.recv())
            .await
            .expect("timed out waiting for room event")
            .expect("room channel closed")
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_broadcasts_and_disconnects_the_room() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();
        let mut subscription = state.rooms().subscribe(&quiz_room(quiz));

        schedule_quiz_expiry(&state, quiz, OffsetDateTime::now_utc() + time::Duration::minutes(5));

        // Let the freshly spawned timer task register its sleep against the
        // paused clock before virtual time is advanced.
        tokio::task::yield_now().await;
        advance(StdDuration::from_secs(5 * 60 + 1)).await;

        match recv_event(&mut subscription).await {
            RoomEvent::Message(event) => assert_eq!(event.event.as_deref(), Some("quiz:expired")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            recv_event(&mut subscription).await,
            RoomEvent::Disconnect
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_evicts_caches_after_the_grace_period() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();

        state.stats().record(quiz, 0, 0, 1);
        schedule_quiz_expiry(&state, quiz, OffsetDateTime::now_utc() + time::Duration::minutes(1));

        // Past expiry but within the grace window the caches stay warm.
        advance(StdDuration::from_secs(2 * 60)).await;
        assert!(state.stats().has_quiz(quiz));
        assert!(state.lifecycle().contains(quiz));

        // Grace period is 30 minutes in the test config.
        advance(StdDuration::from_secs(31 * 60)).await;
        tokio::task::yield_now().await;
        assert!(!state.stats().has_quiz(quiz));
        assert!(!state.lifecycle().contains(quiz));
    }

    #[tokio::test(start_paused = true)]
    async fn scheduling_twice_registers_one_timer_pair() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();
        let expires_at = OffsetDateTime::now_utc() + time::Duration::minutes(5);

        schedule_quiz_expiry(&state, quiz, expires_at);
        schedule_quiz_expiry(&state, quiz, expires_at);

        let mut subscription = state.rooms().subscribe(&quiz_room(quiz));
        // Let the freshly spawned timer task register its sleep against the
        // paused clock before virtual time is advanced.
        tokio::task::yield_now().await;
        advance(StdDuration::from_secs(5 * 60 + 1)).await;

        match recv_event(&mut subscription).await {
            RoomEvent::Message(event) => assert_eq!(event.event.as_deref(), Some("quiz:expired")),
            other => panic!("unexpected event: {other:?}"),
        }
        // Exactly one expiry fired: the next event is the disconnect, not a
        // second broadcast.
        assert!(matches!(
            recv_event(&mut subscription).await,
            RoomEvent::Disconnect
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_eviction_cancels_pending_timers() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();
        let mut subscription = state.rooms().subscribe(&quiz_room(quiz));

        state.stats().record(quiz, 0, 0, 1);
        schedule_quiz_expiry(&state, quiz, OffsetDateTime::now_utc() + time::Duration::minutes(5));
        clear_quiz_state(&state, quiz);
        assert!(!state.lifecycle().contains(quiz));

        // Well past both timers nothing fires for the evicted quiz.
        advance(StdDuration::from_secs(60 * 60)).await;
        tokio::task::yield_now().await;
        let pending = timeout(StdDuration::from_millis(10), subscription.recv()).await;
        assert!(pending.is_err(), "no event should fire after eviction");
    }

    #[tokio::test(start_paused = true)]
    async fn past_expiry_fires_immediately_but_keeps_the_grace_window() {
        let (state, _store) = test_state().await;
        let quiz = Uuid::new_v4();
        let mut subscription = state.rooms().subscribe(&quiz_room(quiz));

        state.stats().record(quiz, 0, 0, 1);
        schedule_quiz_expiry(
            &state,
            quiz,
            OffsetDateTime::now_utc() - time::Duration::minutes(1),
        );

        match recv_event(&mut subscription).await {
            RoomEvent::Message(event) => assert_eq!(event.event.as_deref(), Some("quiz:expired")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(state.stats().has_quiz(quiz));
        assert!(state.lifecycle().contains(quiz));
    }
}
