use std::collections::HashMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::services::ingest::BacklogMetrics;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }

    /// Create a health response indicating the system is in degraded mode.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
        }
    }
}

/// Not-yet-durable answer counts across the pipeline.
#[derive(Debug, Serialize, ToSchema)]
pub struct BacklogMetricsDto {
    /// Total pending answers across all quizzes.
    pub total: u64,
    /// Pending answers per quiz.
    pub per_quiz: HashMap<String, u64>,
}

impl From<BacklogMetrics> for BacklogMetricsDto {
    fn from(metrics: BacklogMetrics) -> Self {
        Self {
            total: metrics.total,
            per_quiz: metrics
                .per_quiz
                .into_iter()
                .map(|(quiz_id, pending)| (quiz_id.to_string(), pending))
                .collect(),
        }
    }
}

/// Health of the durable-stream consumer as seen from its heartbeat.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumerHealthResponse {
    /// Whether a fresh heartbeat was found.
    pub healthy: bool,
    /// Reason the consumer cannot be healthy, when structural.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unix milliseconds of the last heartbeat, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<i64>,
    /// Age of the last heartbeat in milliseconds, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<i64>,
    /// Current backlog metrics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlog: Option<BacklogMetricsDto>,
    /// Whether the consumer reported sustained backlog growth.
    pub alert: bool,
    /// Consecutive backlog-growth observations reported by the consumer.
    pub streak: u32,
}

impl ConsumerHealthResponse {
    /// Response used when no durable queue backend is configured; the local
    /// buffer backlog is still reported.
    pub fn queue_disabled(backlog: BacklogMetricsDto) -> Self {
        Self {
            healthy: false,
            error: Some("queue_disabled".into()),
            last_seen_at: None,
            age_ms: None,
            backlog: Some(backlog),
            alert: false,
            streak: 0,
        }
    }
}
