use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::{sync::watch, time::sleep};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    dao::{
        answer_store::{AnswerStore, StoreSlot},
        queue::{AnswerQueue, ConsumerHeartbeat, StreamEntry},
    },
    services::ingest::IngestError,
};

/// Upper bound on the shortened poll pause after a productive drain.
const PRODUCTIVE_POLL: Duration = Duration::from_millis(100);

/// Drain one stream into durable storage until it is empty.
///
/// Entries are deleted only after their batch is durably written, so a crash
/// at any point replays the batch and the store's insert-or-ignore write
/// absorbs the repeats. The emptied stream is deregistered so queue
/// discovery stays bounded.
pub(crate) async fn drain_stream(
    queue: &dyn AnswerQueue,
    store: &dyn AnswerStore,
    stream_key: &str,
    batch_size: usize,
) -> Result<u64, IngestError> {
    let mut processed = 0u64;

    loop {
        let entries = queue.read_batch(stream_key.to_string(), batch_size).await?;
        if entries.is_empty() {
            break;
        }

        let answers = entries.iter().map(StreamEntry::to_answer).collect();
        store.insert_answers(answers).await?;

        let count = entries.len() as u64;
        let ids = entries.into_iter().map(|entry| entry.id).collect();
        queue.delete_entries(stream_key.to_string(), ids).await?;
        processed += count;
    }

    queue.remove_if_empty(stream_key.to_string()).await?;
    Ok(processed)
}

/// Tracks consecutive backlog growth between consumer cycles.
///
/// The first observation only establishes the baseline; the alert requires
/// the configured number of consecutive increases on a non-zero backlog, so
/// isolated spikes never fire it.
#[derive(Debug)]
pub struct BacklogWatch {
    last: Option<u64>,
    streak: u32,
    threshold: u32,
}

impl BacklogWatch {
    /// Create a watch alerting after `threshold` consecutive increases.
    pub fn new(threshold: u32) -> Self {
        Self {
            last: None,
            streak: 0,
            threshold,
        }
    }

    /// Record an observation, returning whether the alert condition holds.
    pub fn observe(&mut self, total: u64) -> bool {
        self.streak = match self.last {
            Some(previous) if total > previous => self.streak + 1,
            _ => 0,
        };
        self.last = Some(total);
        total > 0 && self.streak >= self.threshold
    }

    /// Current consecutive-growth streak.
    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Continuously drains the durable answer streams into storage.
///
/// Runs independently of the request-handling processes; a batch failure is
/// logged and retried on the next cycle, never propagated.
pub struct AnswerConsumer {
    queue: Arc<dyn AnswerQueue>,
    store: Arc<StoreSlot>,
    poll_interval: Duration,
    batch_size: usize,
    heartbeat_ttl: Duration,
    watch: BacklogWatch,
}

impl AnswerConsumer {
    /// Build a consumer from the shared configuration.
    pub fn new(queue: Arc<dyn AnswerQueue>, store: Arc<StoreSlot>, config: &AppConfig) -> Self {
        Self {
            queue,
            store,
            poll_interval: config.poll_interval,
            batch_size: config.batch_size,
            heartbeat_ttl: config.heartbeat_ttl,
            watch: BacklogWatch::new(config.backlog_growth_threshold),
        }
    }

    /// Run the drain loop until shutdown is signalled.
    ///
    /// An idle cycle sleeps the full poll interval; a productive one polls
    /// again almost immediately to keep up under load.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("answer stream consumer started");

        loop {
            let processed = self.cycle().await;
            let pause = if processed > 0 {
                PRODUCTIVE_POLL.min(self.poll_interval)
            } else {
                self.poll_interval
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.changed() => {
                    info!("answer stream consumer stopping");
                    break;
                }
            }
        }
    }

    /// One drain-and-observe cycle across all known streams.
    pub async fn cycle(&mut self) -> u64 {
        let store = self.store.get().await;
        if store.is_none() {
            warn!("storage unavailable; skipping drain this cycle");
        }

        let mut processed = 0u64;
        if let Some(store) = &store {
            let streams = match self.queue.list_streams().await {
                Ok(streams) => streams,
                Err(err) => {
                    warn!(error = %err, "failed to list answer streams");
                    Vec::new()
                }
            };

            for stream_key in streams {
                match drain_stream(
                    self.queue.as_ref(),
                    store.as_ref(),
                    &stream_key,
                    self.batch_size,
                )
                .await
                {
                    Ok(count) => processed += count,
                    Err(err) => {
                        // Entries stay in the stream; the next cycle retries.
                        warn!(stream = %stream_key, error = %err, "failed to drain stream");
                    }
                }
            }
        }

        let backlog = self.backlog_total().await;
        let alert = self.watch.observe(backlog);
        if alert {
            warn!(
                backlog,
                streak = self.watch.streak(),
                "answer backlog growing across consecutive cycles"
            );
        }

        let heartbeat = ConsumerHeartbeat {
            ts: now_unix_millis(),
            backlog,
            alert,
            streak: self.watch.streak(),
        };
        if let Err(err) = self
            .queue
            .put_heartbeat(heartbeat, self.heartbeat_ttl)
            .await
        {
            warn!(error = %err, "failed to publish consumer heartbeat");
        }

        debug!(processed, backlog, "consumer cycle finished");
        processed
    }

    async fn backlog_total(&self) -> u64 {
        let streams = match self.queue.list_streams().await {
            Ok(streams) => streams,
            Err(err) => {
                warn!(error = %err, "failed to list streams for backlog");
                return 0;
            }
        };

        let mut total = 0u64;
        for stream_key in streams {
            match self.queue.stream_len(stream_key.clone()).await {
                Ok(length) => total += length,
                Err(err) => warn!(stream = %stream_key, error = %err, "failed to read stream length"),
            }
        }
        total
    }
}

fn now_unix_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
