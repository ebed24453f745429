//! In-memory store and queue backends for the service test suites.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        answer_store::{AnswerStore, StoreSlot},
        models::{
            ActorTotals, AnswerRecord, AttemptRow, NewAttempt, QuestionPositionRow,
            VoteAggregateRow,
        },
        queue::{AnswerQueue, ConsumerHeartbeat, QueueError, QueueKeys, QueueResult, StreamEntry},
        storage::{StorageError, StorageResult},
    },
    services::ingest::LocalBufferBackend,
    state::{AppState, SharedState},
};

pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        database_url: String::new(),
        redis_url: None,
        flush_interval: Duration::from_millis(500),
        poll_interval: Duration::from_millis(500),
        batch_size: 500,
        dedupe_ttl: Duration::from_secs(60),
        heartbeat_ttl: Duration::from_secs(20),
        backlog_growth_threshold: 3,
        cleanup_grace: Duration::from_secs(30 * 60),
        stats_push_interval: Duration::from_millis(500),
        answered_push_interval: Duration::from_millis(300),
        leaderboard_push_interval: Duration::from_millis(2_000),
        viewer_count_push_interval: Duration::from_millis(3_000),
        queue_keys: QueueKeys::new(
            "quiz:answers:".into(),
            "quiz:answer_streams".into(),
            "quiz:answer:dedupe:".into(),
            "quiz:answer_consumer:heartbeat".into(),
        ),
    }
}

/// Build a shared state over a fresh [`MemoryStore`] and a local buffer
/// backend.
pub(crate) async fn test_state() -> (SharedState, MemoryStore) {
    let slot = Arc::new(StoreSlot::new());
    let store = MemoryStore::new();
    slot.install(Arc::new(store.clone())).await;
    let ingest = Arc::new(LocalBufferBackend::new(slot.clone()));
    let state = AppState::new(test_config(), slot, ingest, None);
    (state, store)
}

struct StoredAttempt {
    attempt: NewAttempt,
    completed_at: OffsetDateTime,
}

impl StoredAttempt {
    fn row(&self) -> AttemptRow {
        AttemptRow {
            actor_id: self.attempt.actor_id,
            display_name: self.attempt.display_name.clone(),
            total_score: self.attempt.total_score,
            completed_at: self.completed_at,
        }
    }
}

#[derive(Default)]
struct MemoryStoreInner {
    answers: Mutex<Vec<AnswerRecord>>,
    attempts: Mutex<Vec<StoredAttempt>>,
    questions: Mutex<HashMap<Uuid, Vec<QuestionPositionRow>>>,
    expiries: Mutex<HashMap<Uuid, OffsetDateTime>>,
    fail_next_insert: AtomicBool,
}

/// In-memory [`AnswerStore`] with the same insert-or-ignore semantics as
/// the Postgres backend.
#[derive(Clone, Default)]
pub(crate) struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Make the next bulk insert fail, simulating a storage outage.
    pub(crate) fn fail_next_insert(&self) {
        self.inner.fail_next_insert.store(true, Ordering::SeqCst);
    }

    pub(crate) fn answer_count(&self) -> usize {
        self.inner.answers.lock().unwrap().len()
    }

    pub(crate) fn set_questions(&self, quiz_id: Uuid, positions: Vec<QuestionPositionRow>) {
        self.inner
            .questions
            .lock()
            .unwrap()
            .insert(quiz_id, positions);
    }

    pub(crate) fn set_expiry(&self, quiz_id: Uuid, expires_at: OffsetDateTime) {
        self.inner.expiries.lock().unwrap().insert(quiz_id, expires_at);
    }

    fn insert(&self, answers: Vec<AnswerRecord>) -> StorageResult<u64> {
        if self.inner.fail_next_insert.swap(false, Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "induced insert failure".into(),
                io::Error::other("test"),
            ));
        }

        let mut stored = self.inner.answers.lock().unwrap();
        let mut existing: HashSet<(Uuid, Uuid)> = stored
            .iter()
            .map(|answer| (answer.actor_id, answer.question_id))
            .collect();

        let mut inserted = 0u64;
        for answer in answers {
            if existing.insert((answer.actor_id, answer.question_id)) {
                stored.push(answer);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

impl AnswerStore for MemoryStore {
    fn insert_answers(&self, answers: Vec<AnswerRecord>) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.insert(answers) })
    }

    fn has_answer(
        &self,
        actor_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let answers = store.inner.answers.lock().unwrap();
            Ok(answers
                .iter()
                .any(|answer| answer.actor_id == actor_id && answer.question_id == question_id))
        })
    }

    fn vote_aggregates(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<VoteAggregateRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let answers = store.inner.answers.lock().unwrap();
            let mut grouped: HashMap<(Uuid, i32), i64> = HashMap::new();
            for answer in answers.iter().filter(|answer| answer.quiz_id == quiz_id) {
                *grouped
                    .entry((answer.question_id, answer.option_index))
                    .or_default() += 1;
            }
            Ok(grouped
                .into_iter()
                .map(|((question_id, option_index), votes)| VoteAggregateRow {
                    question_id,
                    option_index,
                    votes,
                })
                .collect())
        })
    }

    fn question_positions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionPositionRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let questions = store.inner.questions.lock().unwrap();
            Ok(questions.get(&quiz_id).cloned().unwrap_or_default())
        })
    }

    fn question_count(&self, quiz_id: Uuid) -> BoxFuture<'static, StorageResult<i64>> {
        let store = self.clone();
        Box::pin(async move {
            let questions = store.inner.questions.lock().unwrap();
            Ok(questions.get(&quiz_id).map(Vec::len).unwrap_or(0) as i64)
        })
    }

    fn actor_totals(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<ActorTotals>> {
        let store = self.clone();
        Box::pin(async move {
            let answers = store.inner.answers.lock().unwrap();
            let mut totals = ActorTotals::default();
            for answer in answers
                .iter()
                .filter(|answer| answer.quiz_id == quiz_id && answer.actor_id == actor_id)
            {
                totals.score_sum += i64::from(answer.score);
                if answer.is_correct {
                    totals.correct_count += 1;
                }
            }
            Ok(totals)
        })
    }

    fn find_attempt(
        &self,
        quiz_id: Uuid,
        actor_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let attempts = store.inner.attempts.lock().unwrap();
            Ok(attempts
                .iter()
                .find(|stored| {
                    stored.attempt.quiz_id == quiz_id && stored.attempt.actor_id == actor_id
                })
                .map(StoredAttempt::row))
        })
    }

    fn record_attempt(&self, attempt: NewAttempt) -> BoxFuture<'static, StorageResult<AttemptRow>> {
        let store = self.clone();
        Box::pin(async move {
            let stored = StoredAttempt {
                attempt,
                completed_at: OffsetDateTime::now_utc(),
            };
            let row = stored.row();
            store.inner.attempts.lock().unwrap().push(stored);
            Ok(row)
        })
    }

    fn first_attempts(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AttemptRow>>> {
        let store = self.clone();
        Box::pin(async move {
            let attempts = store.inner.attempts.lock().unwrap();
            let mut rows: Vec<AttemptRow> = attempts
                .iter()
                .filter(|stored| {
                    stored.attempt.quiz_id == quiz_id && stored.attempt.is_first_attempt
                })
                .map(StoredAttempt::row)
                .collect();
            rows.sort_by(|a, b| {
                b.total_score
                    .cmp(&a.total_score)
                    .then_with(|| a.completed_at.cmp(&b.completed_at))
            });
            Ok(rows)
        })
    }

    fn quiz_expiry(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<OffsetDateTime>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.expiries.lock().unwrap().get(&quiz_id).copied()) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct MemoryQueueInner {
    keys: QueueKeys,
    streams: Mutex<HashMap<String, Vec<StreamEntry>>>,
    registry: Mutex<BTreeSet<String>>,
    markers: Mutex<HashSet<String>>,
    heartbeat: Mutex<Option<ConsumerHeartbeat>>,
    next_id: AtomicU64,
    fail_markers: AtomicBool,
    fail_appends: AtomicBool,
}

/// In-memory [`AnswerQueue`] mirroring the Redis stream semantics.
#[derive(Clone)]
pub(crate) struct MemoryQueue {
    inner: Arc<MemoryQueueInner>,
}

impl MemoryQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(MemoryQueueInner {
                keys: test_config().queue_keys,
                streams: Mutex::new(HashMap::new()),
                registry: Mutex::new(BTreeSet::new()),
                markers: Mutex::new(HashSet::new()),
                heartbeat: Mutex::new(None),
                next_id: AtomicU64::new(1),
                fail_markers: AtomicBool::new(false),
                fail_appends: AtomicBool::new(false),
            }),
        }
    }

    /// Make the next marker acquisition fail, simulating a backend outage.
    pub(crate) fn fail_next_marker(&self) {
        self.inner.fail_markers.store(true, Ordering::SeqCst);
    }

    /// Make the next append fail, simulating a backend outage.
    pub(crate) fn fail_next_append(&self) {
        self.inner.fail_appends.store(true, Ordering::SeqCst);
    }

    fn outage(message: &str) -> QueueError {
        QueueError::unavailable(message.into(), io::Error::other("test"))
    }
}

impl AnswerQueue for MemoryQueue {
    fn keys(&self) -> &QueueKeys {
        &self.inner.keys
    }

    fn append(&self, answer: AnswerRecord) -> BoxFuture<'static, QueueResult<String>> {
        let queue = self.clone();
        Box::pin(async move {
            if queue.inner.fail_appends.swap(false, Ordering::SeqCst) {
                return Err(MemoryQueue::outage("induced append failure"));
            }

            let stream_key = queue.inner.keys.stream_for(answer.quiz_id);
            let id = queue.inner.next_id.fetch_add(1, Ordering::SeqCst).to_string();
            let fields = answer
                .to_stream_fields()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();

            queue
                .inner
                .streams
                .lock()
                .unwrap()
                .entry(stream_key.clone())
                .or_default()
                .push(StreamEntry {
                    id: id.clone(),
                    fields,
                });
            queue.inner.registry.lock().unwrap().insert(stream_key);
            Ok(id)
        })
    }

    fn read_batch(
        &self,
        stream_key: String,
        count: usize,
    ) -> BoxFuture<'static, QueueResult<Vec<StreamEntry>>> {
        let queue = self.clone();
        Box::pin(async move {
            let streams = queue.inner.streams.lock().unwrap();
            Ok(streams
                .get(&stream_key)
                .map(|entries| entries.iter().take(count).cloned().collect())
                .unwrap_or_default())
        })
    }

    fn delete_entries(
        &self,
        stream_key: String,
        ids: Vec<String>,
    ) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move {
            let mut streams = queue.inner.streams.lock().unwrap();
            if let Some(entries) = streams.get_mut(&stream_key) {
                entries.retain(|entry| !ids.contains(&entry.id));
            }
            Ok(())
        })
    }

    fn stream_len(&self, stream_key: String) -> BoxFuture<'static, QueueResult<u64>> {
        let queue = self.clone();
        Box::pin(async move {
            let streams = queue.inner.streams.lock().unwrap();
            Ok(streams.get(&stream_key).map(Vec::len).unwrap_or(0) as u64)
        })
    }

    fn list_streams(&self) -> BoxFuture<'static, QueueResult<Vec<String>>> {
        let queue = self.clone();
        Box::pin(async move {
            Ok(queue.inner.registry.lock().unwrap().iter().cloned().collect())
        })
    }

    fn remove_if_empty(&self, stream_key: String) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move {
            let streams = queue.inner.streams.lock().unwrap();
            let empty = streams.get(&stream_key).map(Vec::is_empty).unwrap_or(true);
            if empty {
                queue.inner.registry.lock().unwrap().remove(&stream_key);
            }
            Ok(())
        })
    }

    fn acquire_marker(
        &self,
        key: String,
        _ttl: Duration,
    ) -> BoxFuture<'static, QueueResult<bool>> {
        let queue = self.clone();
        Box::pin(async move {
            if queue.inner.fail_markers.swap(false, Ordering::SeqCst) {
                return Err(MemoryQueue::outage("induced marker failure"));
            }
            Ok(queue.inner.markers.lock().unwrap().insert(key))
        })
    }

    fn put_heartbeat(
        &self,
        heartbeat: ConsumerHeartbeat,
        _ttl: Duration,
    ) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move {
            *queue.inner.heartbeat.lock().unwrap() = Some(heartbeat);
            Ok(())
        })
    }

    fn get_heartbeat(&self) -> BoxFuture<'static, QueueResult<Option<ConsumerHeartbeat>>> {
        let queue = self.clone();
        Box::pin(async move { Ok(queue.inner.heartbeat.lock().unwrap().clone()) })
    }
}
