//! Application-level configuration loaded from the process environment.

use std::{env, str::FromStr, time::Duration};

use tracing::warn;

use crate::dao::queue::QueueKeys;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/quizpulse";
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 500;
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_BATCH_SIZE: usize = 500;
const DEFAULT_DEDUPE_TTL_SECONDS: u64 = 21_600;
const DEFAULT_HEARTBEAT_TTL_SECONDS: u64 = 20;
const DEFAULT_BACKLOG_GROW_THRESHOLD: u32 = 3;
const DEFAULT_CLEANUP_GRACE_MINUTES: u64 = 30;
const DEFAULT_STATS_PUSH_MS: u64 = 500;
const DEFAULT_ANSWERED_PUSH_MS: u64 = 300;
const DEFAULT_LEADERBOARD_PUSH_MS: u64 = 2_000;
const DEFAULT_VIEWER_COUNT_PUSH_MS: u64 = 3_000;
const DEFAULT_STREAM_PREFIX: &str = "quiz:answers:";
const DEFAULT_STREAM_REGISTRY_KEY: &str = "quiz:answer_streams";
const DEFAULT_DEDUPE_PREFIX: &str = "quiz:answer:dedupe:";
const DEFAULT_HEARTBEAT_KEY: &str = "quiz:answer_consumer:heartbeat";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Postgres connection string for the durable answer store.
    pub database_url: String,
    /// Redis URL; present selects durable-stream ingestion, absent selects
    /// local in-memory batching.
    pub redis_url: Option<String>,
    /// Cadence of the local buffer's periodic bulk flush.
    pub flush_interval: Duration,
    /// Consumer poll interval when the previous cycle was idle.
    pub poll_interval: Duration,
    /// Maximum entries read from a stream per batch.
    pub batch_size: usize,
    /// Retention of durable dedup markers.
    pub dedupe_ttl: Duration,
    /// Freshness window of the consumer heartbeat.
    pub heartbeat_ttl: Duration,
    /// Consecutive backlog-growth observations before alerting.
    pub backlog_growth_threshold: u32,
    /// Delay between quiz expiry and cache eviction.
    pub cleanup_grace: Duration,
    /// Cadence of the vote-stats fanout loop.
    pub stats_push_interval: Duration,
    /// Cadence of the per-answer activity batch loop.
    pub answered_push_interval: Duration,
    /// Cadence of the leaderboard fanout loop.
    pub leaderboard_push_interval: Duration,
    /// Cadence of the viewer-count fanout loop.
    pub viewer_count_push_interval: Duration,
    /// Key layout used by the queue backend.
    pub queue_keys: QueueKeys,
}

impl AppConfig {
    /// Load the configuration from environment variables, warning about and
    /// falling back on any value that fails to parse.
    pub fn from_env() -> Self {
        Self {
            port: env_or("PORT", 8080),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            flush_interval: Duration::from_millis(env_or(
                "ANSWER_FLUSH_INTERVAL_MS",
                DEFAULT_FLUSH_INTERVAL_MS,
            )),
            poll_interval: Duration::from_millis(env_or(
                "ANSWER_STREAM_POLL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )),
            batch_size: env_or("ANSWER_STREAM_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            dedupe_ttl: Duration::from_secs(env_or(
                "ANSWER_DEDUPE_TTL_SECONDS",
                DEFAULT_DEDUPE_TTL_SECONDS,
            )),
            heartbeat_ttl: Duration::from_secs(env_or(
                "ANSWER_CONSUMER_HEARTBEAT_TTL_SECONDS",
                DEFAULT_HEARTBEAT_TTL_SECONDS,
            )),
            backlog_growth_threshold: env_or(
                "ANSWER_BACKLOG_GROW_THRESHOLD",
                DEFAULT_BACKLOG_GROW_THRESHOLD,
            )
            .max(1),
            cleanup_grace: Duration::from_secs(
                env_or("QUIZ_CLEANUP_GRACE_MINUTES", DEFAULT_CLEANUP_GRACE_MINUTES) * 60,
            ),
            stats_push_interval: Duration::from_millis(env_or(
                "STATS_PUSH_INTERVAL_MS",
                DEFAULT_STATS_PUSH_MS,
            )),
            answered_push_interval: Duration::from_millis(env_or(
                "ANSWERED_PUSH_INTERVAL_MS",
                DEFAULT_ANSWERED_PUSH_MS,
            )),
            leaderboard_push_interval: Duration::from_millis(env_or(
                "LEADERBOARD_PUSH_INTERVAL_MS",
                DEFAULT_LEADERBOARD_PUSH_MS,
            )),
            viewer_count_push_interval: Duration::from_millis(env_or(
                "VIEWER_COUNT_PUSH_INTERVAL_MS",
                DEFAULT_VIEWER_COUNT_PUSH_MS,
            )),
            queue_keys: QueueKeys::new(
                env::var("ANSWER_STREAM_PREFIX").unwrap_or_else(|_| DEFAULT_STREAM_PREFIX.into()),
                env::var("ANSWER_STREAM_SET_KEY")
                    .unwrap_or_else(|_| DEFAULT_STREAM_REGISTRY_KEY.into()),
                env::var("ANSWER_DEDUPE_PREFIX").unwrap_or_else(|_| DEFAULT_DEDUPE_PREFIX.into()),
                env::var("ANSWER_CONSUMER_HEARTBEAT_KEY")
                    .unwrap_or_else(|_| DEFAULT_HEARTBEAT_KEY.into()),
            ),
        }
    }

    /// Whether the durable-stream ingestion mode is selected.
    pub fn stream_mode(&self) -> bool {
        self.redis_url.is_some()
    }
}

/// Read an environment variable, falling back to `default` when it is unset
/// or unparsable.
fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(name, value = %raw, "unparsable environment value; using default");
            default
        }),
        Err(_) => default,
    }
}
