use std::time::Duration;

use futures::future::BoxFuture;
use redis::{AsyncCommands, Client, aio::ConnectionManager, streams::StreamRangeReply};

use crate::dao::{
    models::AnswerRecord,
    queue::{AnswerQueue, ConsumerHeartbeat, QueueError, QueueKeys, QueueResult, StreamEntry},
};

/// Redis-backed [`AnswerQueue`] over a self-reconnecting connection manager.
///
/// Streams hold the per-quiz answer logs, a set registers the known
/// non-empty stream keys, and plain SET NX EX / SET EX keys carry the dedup
/// markers and the consumer heartbeat.
#[derive(Clone)]
pub struct RedisAnswerQueue {
    manager: ConnectionManager,
    keys: QueueKeys,
}

impl RedisAnswerQueue {
    /// Connect to Redis and wrap the connection in a manager that retries
    /// transparently after transient drops.
    pub async fn connect(redis_url: &str, keys: QueueKeys) -> QueueResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|source| QueueError::unavailable("invalid Redis URL".into(), source))?;
        let manager = ConnectionManager::new(client).await.map_err(|source| {
            QueueError::unavailable("failed to connect to Redis".into(), source)
        })?;

        Ok(Self { manager, keys })
    }

    async fn append(&self, answer: AnswerRecord) -> QueueResult<String> {
        let mut conn = self.manager.clone();
        let stream_key = self.keys.stream_for(answer.quiz_id);
        let fields = answer.to_stream_fields();

        let id: String = conn
            .xadd(&stream_key, "*", fields.as_slice())
            .await
            .map_err(|source| {
                QueueError::unavailable(format!("XADD {stream_key} failed"), source)
            })?;
        let _: () = conn
            .sadd(self.keys.registry(), &stream_key)
            .await
            .map_err(|source| {
                QueueError::unavailable(format!("SADD {stream_key} failed"), source)
            })?;

        Ok(id)
    }

    async fn read_batch(&self, stream_key: String, count: usize) -> QueueResult<Vec<StreamEntry>> {
        let mut conn = self.manager.clone();
        let reply: StreamRangeReply = conn
            .xrange_count(&stream_key, "-", "+", count)
            .await
            .map_err(|source| {
                QueueError::unavailable(format!("XRANGE {stream_key} failed"), source)
            })?;

        let entries = reply
            .ids
            .into_iter()
            .map(|entry| {
                let fields = entry
                    .map
                    .iter()
                    .filter_map(|(name, value)| {
                        redis::from_redis_value::<String>(value.clone())
                            .ok()
                            .map(|value| (name.clone(), value))
                    })
                    .collect();
                StreamEntry {
                    id: entry.id,
                    fields,
                }
            })
            .collect();

        Ok(entries)
    }

    async fn delete_entries(&self, stream_key: String, ids: Vec<String>) -> QueueResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut conn = self.manager.clone();
        let _: usize = conn.xdel(&stream_key, &ids).await.map_err(|source| {
            QueueError::unavailable(format!("XDEL {stream_key} failed"), source)
        })?;
        Ok(())
    }

    async fn stream_len(&self, stream_key: String) -> QueueResult<u64> {
        let mut conn = self.manager.clone();
        conn.xlen(&stream_key).await.map_err(|source| {
            QueueError::unavailable(format!("XLEN {stream_key} failed"), source)
        })
    }

    async fn list_streams(&self) -> QueueResult<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(self.keys.registry())
            .await
            .map_err(|source| QueueError::unavailable("SMEMBERS failed".into(), source))
    }

    async fn remove_if_empty(&self, stream_key: String) -> QueueResult<()> {
        let mut conn = self.manager.clone();
        let length: u64 = conn.xlen(&stream_key).await.map_err(|source| {
            QueueError::unavailable(format!("XLEN {stream_key} failed"), source)
        })?;
        if length == 0 {
            let _: usize = conn
                .srem(self.keys.registry(), &stream_key)
                .await
                .map_err(|source| {
                    QueueError::unavailable(format!("SREM {stream_key} failed"), source)
                })?;
        }
        Ok(())
    }

    async fn acquire_marker(&self, key: String, ttl: Duration) -> QueueResult<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|source| QueueError::unavailable(format!("SET NX {key} failed"), source))?;

        Ok(reply.is_some())
    }

    async fn put_heartbeat(&self, heartbeat: ConsumerHeartbeat, ttl: Duration) -> QueueResult<()> {
        let payload = serde_json::to_string(&heartbeat).map_err(QueueError::Encode)?;
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(self.keys.heartbeat(), payload, ttl.as_secs().max(1))
            .await
            .map_err(|source| QueueError::unavailable("SETEX heartbeat failed".into(), source))?;
        Ok(())
    }

    async fn get_heartbeat(&self) -> QueueResult<Option<ConsumerHeartbeat>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(self.keys.heartbeat())
            .await
            .map_err(|source| QueueError::unavailable("GET heartbeat failed".into(), source))?;

        // A heartbeat that fails to parse counts as absent rather than an
        // error, so a format change never breaks the health surface.
        Ok(raw.and_then(|raw| serde_json::from_str(&raw).ok()))
    }
}

impl AnswerQueue for RedisAnswerQueue {
    fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    fn append(&self, answer: AnswerRecord) -> BoxFuture<'static, QueueResult<String>> {
        let queue = self.clone();
        Box::pin(async move { queue.append(answer).await })
    }

    fn read_batch(
        &self,
        stream_key: String,
        count: usize,
    ) -> BoxFuture<'static, QueueResult<Vec<StreamEntry>>> {
        let queue = self.clone();
        Box::pin(async move { queue.read_batch(stream_key, count).await })
    }

    fn delete_entries(
        &self,
        stream_key: String,
        ids: Vec<String>,
    ) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move { queue.delete_entries(stream_key, ids).await })
    }

    fn stream_len(&self, stream_key: String) -> BoxFuture<'static, QueueResult<u64>> {
        let queue = self.clone();
        Box::pin(async move { queue.stream_len(stream_key).await })
    }

    fn list_streams(&self) -> BoxFuture<'static, QueueResult<Vec<String>>> {
        let queue = self.clone();
        Box::pin(async move { queue.list_streams().await })
    }

    fn remove_if_empty(&self, stream_key: String) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move { queue.remove_if_empty(stream_key).await })
    }

    fn acquire_marker(&self, key: String, ttl: Duration) -> BoxFuture<'static, QueueResult<bool>> {
        let queue = self.clone();
        Box::pin(async move { queue.acquire_marker(key, ttl).await })
    }

    fn put_heartbeat(
        &self,
        heartbeat: ConsumerHeartbeat,
        ttl: Duration,
    ) -> BoxFuture<'static, QueueResult<()>> {
        let queue = self.clone();
        Box::pin(async move { queue.put_heartbeat(heartbeat, ttl).await })
    }

    fn get_heartbeat(&self) -> BoxFuture<'static, QueueResult<Option<ConsumerHeartbeat>>> {
        let queue = self.clone();
        Box::pin(async move { queue.get_heartbeat().await })
    }
}
