/// Durable-stream consumer and backlog monitoring.
pub mod consumer;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check services.
pub mod health_service;
/// Answer buffering, deduplication, and the two ingestion backends.
pub mod ingest;
/// Leaderboard cache with dirty tracking and lazy re-sorting.
pub mod leaderboard;
/// Quiz expiry and cleanup scheduling.
pub mod lifecycle;
/// Ownership of the periodic pipeline loops and graceful shutdown.
pub mod pipeline;
/// Request-path orchestration of the ingestion pipeline.
pub mod quiz_service;
/// Per-quiz vote statistics cache.
pub mod stats_cache;
/// Storage reconnection supervisor.
pub mod storage_supervisor;
/// In-memory backends used by the service test suites.
#[cfg(test)]
pub(crate) mod testing;
/// Coalescing fanout loops bounding the outbound message rate.
pub mod throttle;
