/// Redis implementation of the durable answer queue.
pub mod redis;

use std::{collections::HashMap, time::Duration};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::AnswerRecord;

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Error raised by the durable queue backend.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to encode queue payload")]
    Encode(#[source] serde_json::Error),
}

impl QueueError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(
        message: String,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        QueueError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// One durable entry read back from a per-quiz stream.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    /// Opaque sequence identifier assigned by the durable log.
    pub id: String,
    /// Flat string fields of the serialized answer.
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    /// Decode the entry into an [`AnswerRecord`] with safe field coercion.
    pub fn to_answer(&self) -> AnswerRecord {
        AnswerRecord::from_stream_fields(&self.fields)
    }
}

/// Heartbeat record published by the consumer after every drain cycle.
///
/// Stored with a short TTL; absence or staleness means the consumer is
/// stalled or down.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsumerHeartbeat {
    /// Unix timestamp in milliseconds of the observation.
    pub ts: i64,
    /// Total backlog across all known streams after the drain.
    pub backlog: u64,
    /// Whether sustained backlog growth was detected.
    pub alert: bool,
    /// Number of consecutive backlog-growth observations.
    pub streak: u32,
}

/// Key layout shared by every queue operation.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    stream_prefix: String,
    registry_key: String,
    dedupe_prefix: String,
    heartbeat_key: String,
}

impl QueueKeys {
    /// Build the key layout from the configured prefixes.
    pub fn new(
        stream_prefix: String,
        registry_key: String,
        dedupe_prefix: String,
        heartbeat_key: String,
    ) -> Self {
        Self {
            stream_prefix,
            registry_key,
            dedupe_prefix,
            heartbeat_key,
        }
    }

    /// Stream key holding the pending answers of one quiz.
    pub fn stream_for(&self, quiz_id: Uuid) -> String {
        format!("{}{}", self.stream_prefix, quiz_id)
    }

    /// Parse the quiz identifier back out of a stream key.
    pub fn quiz_for(&self, stream_key: &str) -> Option<Uuid> {
        stream_key
            .strip_prefix(&self.stream_prefix)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }

    /// Dedup marker key for one (actor, question) pair.
    pub fn dedupe_for(&self, actor_id: Uuid, question_id: Uuid) -> String {
        format!("{}{}:{}", self.dedupe_prefix, actor_id, question_id)
    }

    /// Registry set holding the names of known non-empty streams.
    pub fn registry(&self) -> &str {
        &self.registry_key
    }

    /// Key under which the consumer heartbeat is stored.
    pub fn heartbeat(&self) -> &str {
        &self.heartbeat_key
    }
}

/// Abstraction over the durable, per-quiz ordered answer queue.
///
/// Also carries the two auxiliary primitives the pipeline needs from the
/// same backend: atomic set-if-absent-with-expiry markers for dedup, and
/// the TTL'd consumer heartbeat record.
pub trait AnswerQueue: Send + Sync {
    /// Key layout used by this queue.
    fn keys(&self) -> &QueueKeys;
    /// Append an answer to its quiz stream, registering the stream as
    /// non-empty. Returns the generated entry id.
    fn append(&self, answer: AnswerRecord) -> BoxFuture<'static, QueueResult<String>>;
    /// Read up to `count` entries from the front of a stream, in order.
    fn read_batch(
        &self,
        stream_key: String,
        count: usize,
    ) -> BoxFuture<'static, QueueResult<Vec<StreamEntry>>>;
    /// Delete consumed entries by id; missing ids are harmless.
    fn delete_entries(
        &self,
        stream_key: String,
        ids: Vec<String>,
    ) -> BoxFuture<'static, QueueResult<()>>;
    /// Current length of a stream.
    fn stream_len(&self, stream_key: String) -> BoxFuture<'static, QueueResult<u64>>;
    /// Names of all streams registered as non-empty.
    fn list_streams(&self) -> BoxFuture<'static, QueueResult<Vec<String>>>;
    /// Deregister the stream if it has no remaining entries.
    fn remove_if_empty(&self, stream_key: String) -> BoxFuture<'static, QueueResult<()>>;
    /// Atomically set a marker if absent, with an expiry. Returns whether
    /// this caller won the marker.
    fn acquire_marker(&self, key: String, ttl: Duration) -> BoxFuture<'static, QueueResult<bool>>;
    /// Publish the consumer heartbeat with a TTL.
    fn put_heartbeat(
        &self,
        heartbeat: ConsumerHeartbeat,
        ttl: Duration,
    ) -> BoxFuture<'static, QueueResult<()>>;
    /// Read the last published heartbeat, if still fresh.
    fn get_heartbeat(&self) -> BoxFuture<'static, QueueResult<Option<ConsumerHeartbeat>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> QueueKeys {
        QueueKeys::new(
            "quiz:answers:".into(),
            "quiz:answer_streams".into(),
            "quiz:answer:dedupe:".into(),
            "quiz:answer_consumer:heartbeat".into(),
        )
    }

    #[test]
    fn stream_key_round_trips_quiz_id() {
        let keys = keys();
        let quiz_id = Uuid::new_v4();
        let stream = keys.stream_for(quiz_id);
        assert_eq!(keys.quiz_for(&stream), Some(quiz_id));
    }

    #[test]
    fn foreign_keys_do_not_parse() {
        let keys = keys();
        assert_eq!(keys.quiz_for("other:prefix:abc"), None);
        assert_eq!(keys.quiz_for("quiz:answers:not-a-uuid"), None);
    }
}
