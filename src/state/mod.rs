pub mod rooms;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{
        answer_store::{AnswerStore, StoreSlot},
        queue::AnswerQueue,
    },
    error::ServiceError,
    services::{
        ingest::IngestBackend, leaderboard::LeaderboardCache, lifecycle::LifecycleTimers,
        stats_cache::StatsCache, throttle::FanoutDirty,
    },
    state::rooms::RoomHub,
};

pub type SharedState = Arc<AppState>;

const ROOM_CHANNEL_CAPACITY: usize = 16;

/// Central application state holding the warm caches, the fanout hub, and
/// the handles to the durable backends.
///
/// Everything here is rebuildable from durable storage; the state is a warm
/// cache, never the source of truth.
pub struct AppState {
    config: AppConfig,
    store: Arc<StoreSlot>,
    ingest: Arc<dyn IngestBackend>,
    queue: Option<Arc<dyn AnswerQueue>>,
    stats: StatsCache,
    leaderboard: LeaderboardCache,
    fanout: FanoutDirty,
    rooms: RoomHub,
    lifecycle: LifecycleTimers,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is
    /// installed into the shared slot.
    pub fn new(
        config: AppConfig,
        store: Arc<StoreSlot>,
        ingest: Arc<dyn IngestBackend>,
        queue: Option<Arc<dyn AnswerQueue>>,
    ) -> SharedState {
        Arc::new(Self {
            config,
            store,
            ingest,
            queue,
            stats: StatsCache::new(),
            leaderboard: LeaderboardCache::new(),
            fanout: FanoutDirty::new(),
            rooms: RoomHub::new(ROOM_CHANNEL_CAPACITY),
            lifecycle: LifecycleTimers::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain a handle to the current answer store, if one is installed.
    pub async fn answer_store(&self) -> Option<Arc<dyn AnswerStore>> {
        self.store.get().await
    }

    /// Obtain the answer store or fail with a degraded-mode error.
    pub async fn require_answer_store(&self) -> Result<Arc<dyn AnswerStore>, ServiceError> {
        self.store.get().await.ok_or(ServiceError::Degraded)
    }

    /// The ingestion backend selected at construction.
    pub fn ingest(&self) -> &Arc<dyn IngestBackend> {
        &self.ingest
    }

    /// Durable queue backend, present only in stream mode.
    pub fn queue(&self) -> Option<&Arc<dyn AnswerQueue>> {
        self.queue.as_ref()
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        self.store.is_degraded().await
    }

    /// Per-quiz vote statistics cache.
    pub fn stats(&self) -> &StatsCache {
        &self.stats
    }

    /// Per-quiz leaderboard cache.
    pub fn leaderboard(&self) -> &LeaderboardCache {
        &self.leaderboard
    }

    /// Dirty-tracking state drained by the fanout throttle loops.
    pub fn fanout(&self) -> &FanoutDirty {
        &self.fanout
    }

    /// Room-based fanout hub for connected viewers and observers.
    pub fn rooms(&self) -> &RoomHub {
        &self.rooms
    }

    /// Registry of pending lifecycle timers.
    pub fn lifecycle(&self) -> &LifecycleTimers {
        &self.lifecycle
    }
}
