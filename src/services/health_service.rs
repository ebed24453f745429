use time::OffsetDateTime;
use tracing::warn;

use crate::{
    dao::{answer_store::AnswerStore, queue::AnswerQueue},
    dto::health::{BacklogMetricsDto, ConsumerHealthResponse, HealthResponse},
    error::ServiceError,
    services::ingest::IngestBackend,
    state::SharedState,
};

/// Respond with a static health payload while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_answer_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded().await {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

/// Assess consumer health from heartbeat staleness and current backlog.
///
/// No process introspection involved: a heartbeat younger than its TTL means
/// a consumer completed a cycle recently, anything else means it is stalled
/// or down.
pub async fn consumer_health(state: &SharedState) -> Result<ConsumerHealthResponse, ServiceError> {
    let backlog = state.ingest().backlog().await?;

    let Some(queue) = state.queue() else {
        return Ok(ConsumerHealthResponse::queue_disabled(
            BacklogMetricsDto::from(backlog),
        ));
    };

    let heartbeat = queue.get_heartbeat().await?;

    let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
    let ttl_ms = state.config().heartbeat_ttl.as_millis() as i64;
    let last_seen_at = heartbeat.as_ref().map(|heartbeat| heartbeat.ts);
    let age_ms = last_seen_at.map(|ts| now_ms - ts);
    let healthy = age_ms.map(|age| age < ttl_ms).unwrap_or(false);

    Ok(ConsumerHealthResponse {
        healthy,
        error: None,
        last_seen_at,
        age_ms,
        backlog: Some(BacklogMetricsDto::from(backlog)),
        alert: heartbeat.as_ref().map(|hb| hb.alert).unwrap_or(false),
        streak: heartbeat.as_ref().map(|hb| hb.streak).unwrap_or(0),
    })
}
