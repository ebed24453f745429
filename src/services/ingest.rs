use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::interval;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        answer_store::StoreSlot,
        models::AnswerRecord,
        queue::{AnswerQueue, QueueError},
        storage::StorageError,
    },
    services::consumer::drain_stream,
    state::SharedState,
};

/// Identity under which duplicate answers are collapsed.
pub type DedupKey = (Uuid, Uuid);

/// Outcome of offering an answer to the ingestion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The answer was admitted and will be durably recorded.
    Accepted,
    /// The (actor, question) pair was already admitted; the caller should
    /// report "already answered".
    Duplicate,
    /// The backend could not verify or record the answer; the caller should
    /// report "try again". Rejecting on uncertainty keeps the pipeline from
    /// ever double counting.
    Unavailable,
}

/// Errors raised while draining buffered answers into durable storage.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage write failed")]
    Storage(#[from] StorageError),
    #[error("queue operation failed")]
    Queue(#[from] QueueError),
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    #[error("ingestion backend unavailable")]
    Unavailable,
}

/// Not-yet-durable answer counts.
#[derive(Debug, Clone, Default)]
pub struct BacklogMetrics {
    /// Total pending answers.
    pub total: u64,
    /// Pending answers keyed by quiz.
    pub per_quiz: HashMap<Uuid, u64>,
}

/// Polymorphic ingestion backend: admit, buffer, and drain answers.
///
/// Selected once at construction; both implementations share the contract
/// that a key is admitted at most once and that a successful flush leaves
/// every admitted answer durably recorded.
pub trait IngestBackend: Send + Sync {
    /// Offer an answer, consulting the dedup guard first.
    fn submit(&self, answer: AnswerRecord) -> BoxFuture<'static, Admission>;
    /// Whether the key is admitted but possibly not yet durable.
    fn has_pending(&self, actor_id: Uuid, question_id: Uuid) -> bool;
    /// Block until every pending answer of the quiz is durably recorded.
    fn flush_quiz(&self, quiz_id: Uuid) -> BoxFuture<'static, Result<(), IngestError>>;
    /// Block until every pending answer is durably recorded.
    fn flush_all(&self) -> BoxFuture<'static, Result<(), IngestError>>;
    /// Current backlog of not-yet-durable answers.
    fn backlog(&self) -> BoxFuture<'static, Result<BacklogMetrics, IngestError>>;
}

/// In-process batching backend for single-process deployments.
///
/// Accepted answers accumulate in an ordered buffer that a periodic tick
/// drains in one bulk write; a failed write returns the batch to the front
/// of the buffer so nothing is ever silently dropped. Dedup keys are only
/// released once their records are durable.
pub struct LocalBufferBackend {
    inner: Arc<LocalInner>,
}

struct LocalInner {
    store: Arc<StoreSlot>,
    buffer: Mutex<VecDeque<AnswerRecord>>,
    pending: Mutex<HashMap<DedupKey, Uuid>>,
    // Serializes concurrent flushes so a blocking flush call observes any
    // in-flight write before draining the remainder itself.
    flush_gate: AsyncMutex<()>,
}

impl LocalBufferBackend {
    /// Create a backend writing through the shared store slot.
    pub fn new(store: Arc<StoreSlot>) -> Self {
        Self {
            inner: Arc::new(LocalInner {
                store,
                buffer: Mutex::new(VecDeque::new()),
                pending: Mutex::new(HashMap::new()),
                flush_gate: AsyncMutex::new(()),
            }),
        }
    }
}

impl LocalInner {
    async fn flush(&self) -> Result<(), IngestError> {
        let _gate = self.flush_gate.lock().await;

        let batch: Vec<AnswerRecord> = {
            let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
            buffer.drain(..).collect()
        };
        if batch.is_empty() {
            return Ok(());
        }

        let Some(store) = self.store.get().await else {
            self.requeue(batch);
            return Err(IngestError::Degraded);
        };

        match store.insert_answers(batch.clone()).await {
            Ok(inserted) => {
                debug!(batch = batch.len(), inserted, "flushed answer batch");
                let mut pending = self.pending.lock().expect("pending lock poisoned");
                for answer in &batch {
                    pending.remove(&(answer.actor_id, answer.question_id));
                }
                Ok(())
            }
            Err(err) => {
                warn!(
                    error = %err,
                    batch = batch.len(),
                    "failed to flush answer batch; requeueing for retry"
                );
                self.requeue(batch);
                Err(err.into())
            }
        }
    }

    fn requeue(&self, batch: Vec<AnswerRecord>) {
        let mut buffer = self.buffer.lock().expect("buffer lock poisoned");
        for answer in batch.into_iter().rev() {
            buffer.push_front(answer);
        }
    }
}

impl IngestBackend for LocalBufferBackend {
    fn submit(&self, answer: AnswerRecord) -> BoxFuture<'static, Admission> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (answer.actor_id, answer.question_id);
            {
                let mut pending = inner.pending.lock().expect("pending lock poisoned");
                if pending.contains_key(&key) {
                    return Admission::Duplicate;
                }
                pending.insert(key, answer.quiz_id);
            }

            let mut buffer = inner.buffer.lock().expect("buffer lock poisoned");
            buffer.push_back(answer);
            Admission::Accepted
        })
    }

    fn has_pending(&self, actor_id: Uuid, question_id: Uuid) -> bool {
        let pending = self.inner.pending.lock().expect("pending lock poisoned");
        pending.contains_key(&(actor_id, question_id))
    }

    fn flush_quiz(&self, _quiz_id: Uuid) -> BoxFuture<'static, Result<(), IngestError>> {
        // The local buffer is a single ordered list, so a per-quiz drain is
        // a whole-buffer drain.
        let inner = self.inner.clone();
        Box::pin(async move { inner.flush().await })
    }

    fn flush_all(&self) -> BoxFuture<'static, Result<(), IngestError>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.flush().await })
    }

    fn backlog(&self) -> BoxFuture<'static, Result<BacklogMetrics, IngestError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let buffer = inner.buffer.lock().expect("buffer lock poisoned");
            let mut per_quiz: HashMap<Uuid, u64> = HashMap::new();
            for answer in buffer.iter() {
                *per_quiz.entry(answer.quiz_id).or_default() += 1;
            }
            Ok(BacklogMetrics {
                total: buffer.len() as u64,
                per_quiz,
            })
        })
    }
}

/// Multi-process backend forwarding each admitted answer to its quiz's
/// durable stream.
///
/// The shared set-if-absent marker is the source of truth for admission, so
/// any number of producer processes stay mutually deduplicated. A marker or
/// append failure is reported as [`Admission::Unavailable`] — fail closed,
/// never double count.
pub struct StreamForwardBackend {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    queue: Arc<dyn AnswerQueue>,
    store: Arc<StoreSlot>,
    pending: Mutex<HashMap<DedupKey, Uuid>>,
    dedupe_ttl: Duration,
    batch_size: usize,
}

impl StreamForwardBackend {
    /// Create a backend appending to `queue` and draining into the shared
    /// store slot on blocking flushes.
    pub fn new(
        queue: Arc<dyn AnswerQueue>,
        store: Arc<StoreSlot>,
        dedupe_ttl: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                queue,
                store,
                pending: Mutex::new(HashMap::new()),
                dedupe_ttl,
                batch_size,
            }),
        }
    }
}

impl StreamInner {
    async fn drain_quiz(&self, quiz_id: Uuid) -> Result<(), IngestError> {
        let store = self.store.get().await.ok_or(IngestError::Degraded)?;
        let stream_key = self.queue.keys().stream_for(quiz_id);
        drain_stream(
            self.queue.as_ref(),
            store.as_ref(),
            &stream_key,
            self.batch_size,
        )
        .await?;

        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.retain(|_key, quiz| *quiz != quiz_id);
        Ok(())
    }
}

impl IngestBackend for StreamForwardBackend {
    fn submit(&self, answer: AnswerRecord) -> BoxFuture<'static, Admission> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let key = (answer.actor_id, answer.question_id);
            {
                let pending = inner.pending.lock().expect("pending lock poisoned");
                if pending.contains_key(&key) {
                    return Admission::Duplicate;
                }
            }

            let marker = inner
                .queue
                .keys()
                .dedupe_for(answer.actor_id, answer.question_id);
            match inner.queue.acquire_marker(marker, inner.dedupe_ttl).await {
                Ok(false) => return Admission::Duplicate,
                Err(err) => {
                    warn!(error = %err, "dedup marker check failed; rejecting answer");
                    return Admission::Unavailable;
                }
                Ok(true) => {}
            }

            let quiz_id = answer.quiz_id;
            match inner.queue.append(answer).await {
                Ok(_entry_id) => {
                    let mut pending = inner.pending.lock().expect("pending lock poisoned");
                    pending.insert(key, quiz_id);
                    Admission::Accepted
                }
                Err(err) => {
                    warn!(error = %err, "failed to append answer to stream");
                    Admission::Unavailable
                }
            }
        })
    }

    fn has_pending(&self, actor_id: Uuid, question_id: Uuid) -> bool {
        let pending = self.inner.pending.lock().expect("pending lock poisoned");
        pending.contains_key(&(actor_id, question_id))
    }

    fn flush_quiz(&self, quiz_id: Uuid) -> BoxFuture<'static, Result<(), IngestError>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.drain_quiz(quiz_id).await })
    }

    fn flush_all(&self) -> BoxFuture<'static, Result<(), IngestError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let streams = inner.queue.list_streams().await?;
            for stream_key in streams {
                if let Some(quiz_id) = inner.queue.keys().quiz_for(&stream_key) {
                    inner.drain_quiz(quiz_id).await?;
                }
            }
            Ok(())
        })
    }

    fn backlog(&self) -> BoxFuture<'static, Result<BacklogMetrics, IngestError>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut metrics = BacklogMetrics::default();
            for stream_key in inner.queue.list_streams().await? {
                let length = inner.queue.stream_len(stream_key.clone()).await?;
                if length == 0 {
                    inner.queue.remove_if_empty(stream_key).await?;
                    continue;
                }
                metrics.total += length;
                if let Some(quiz_id) = inner.queue.keys().quiz_for(&stream_key) {
                    metrics.per_quiz.insert(quiz_id, length);
                }
            }
            Ok(metrics)
        })
    }
}

/// Periodically drain the local buffer until shutdown is signalled.
pub async fn run_flush_loop(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(state.config().flush_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures keep the batch buffered; the next tick retries.
                if let Err(err) = state.ingest().flush_all().await {
                    debug!(error = %err, "periodic flush failed; will retry");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
