/// Durable answer store trait and the shared store slot.
pub mod answer_store;
/// Database model definitions.
pub mod models;
/// Postgres implementation of the answer store.
pub mod postgres;
/// Durable queue trait and its Redis implementation.
pub mod queue;
/// Storage abstraction layer for database operations.
pub mod storage;
