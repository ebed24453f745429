use std::sync::Arc;

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{ActorTotals, AnswerRecord, AttemptRow, NewAttempt, QuestionPositionRow, VoteAggregateRow},
    storage::StorageResult,
};

/// Abstraction over the durable relational store for answers and attempts.
///
/// Writes are insert-or-ignore on the (actor, question) identity so the
/// pipeline can replay any batch without double counting; reads are the
/// point queries used to prime the warm caches.
pub trait AnswerStore: Send + Sync {
    /// Bulk-write answers, silently skipping already-recorded duplicates.
    /// Returns the number of rows actually inserted.
    fn insert_answers(&self, answers: Vec<AnswerRecord>) -> BoxFuture<'static, StorageResult<u64>>;
    /// Whether an answer by `actor_id` to `question_id` is already durable.
    fn has_answer(
        &self,
        actor_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Vote counts grouped by (question, option) for one quiz.
    fn vote_aggregates(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteAggregateRow>>>;
    /// Positions of the quiz's questions, used to map ids to cache slots.
    fn question_positions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionPositionRow>>>;
    /// Number of questions registered for the quiz.
    fn question_count(&self, quiz_id: Uuid) -> BoxFuture<'static, StorageResult<i64>>;
    /// Score sum and correct count of one actor's answers in a quiz.
    fn actor_totals(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<ActorTotals>>;
    /// Look up the actor's recorded attempt for a quiz, if any.
    fn find_attempt(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptRow>>>;
    /// Record a completed attempt and return its stored form.
    fn record_attempt(&self, attempt: NewAttempt) -> BoxFuture<'static, StorageResult<AttemptRow>>;
    /// First attempts of a quiz, ordered score desc then completion asc.
    fn first_attempts(&self, quiz_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<AttemptRow>>>;
    /// Expiry timestamp of the quiz, if the quiz exists.
    fn quiz_expiry(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<OffsetDateTime>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Shared slot holding the currently installed [`AnswerStore`].
///
/// The slot is owned jointly by the application state and the ingestion
/// backends, so a reconnecting supervisor can swap the store without either
/// side holding a reference across the outage. An empty slot is what
/// "degraded mode" means throughout the application.
pub struct StoreSlot {
    slot: RwLock<Option<Arc<dyn AnswerStore>>>,
}

impl StoreSlot {
    /// Create an empty slot; the application starts degraded until a store
    /// is installed.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn get(&self) -> Option<Arc<dyn AnswerStore>> {
        let guard = self.slot.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install(&self, store: Arc<dyn AnswerStore>) {
        let mut guard = self.slot.write().await;
        *guard = Some(store);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear(&self) {
        let mut guard = self.slot.write().await;
        guard.take();
    }

    /// Whether no store is currently installed.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.slot.read().await;
        guard.is_none()
    }
}

impl Default for StoreSlot {
    fn default() -> Self {
        Self::new()
    }
}
