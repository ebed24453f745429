//! QuizPulse Back binary entrypoint wiring REST, SSE, Redis, and Postgres layers.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dao;
mod dto;
mod error;
mod routes;
mod services;
mod state;

use config::AppConfig;
use dao::{
    answer_store::{AnswerStore, StoreSlot},
    postgres::PostgresAnswerStore,
    queue::{AnswerQueue, redis::RedisAnswerQueue},
};
use services::{
    ingest::{IngestBackend, LocalBufferBackend, StreamForwardBackend},
    pipeline::Pipeline,
    storage_supervisor,
};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();

    let store_slot = Arc::new(StoreSlot::new());
    {
        let database_url = config.database_url.clone();
        tokio::spawn(storage_supervisor::run(store_slot.clone(), move || {
            let url = database_url.clone();
            async move {
                let store = PostgresAnswerStore::connect(&url).await?;
                Ok(Arc::new(store) as Arc<dyn AnswerStore>)
            }
        }));
    }

    // The ingestion mode is fixed for the process lifetime: the presence of
    // a Redis URL selects durable-stream forwarding, absence selects the
    // local batching buffer.
    let queue: Option<Arc<dyn AnswerQueue>> = match &config.redis_url {
        Some(redis_url) => {
            let queue = RedisAnswerQueue::connect(redis_url, config.queue_keys.clone())
                .await
                .context("connecting to Redis")?;
            info!("durable-stream ingestion mode selected");
            Some(Arc::new(queue))
        }
        None => {
            info!("local batching ingestion mode selected");
            None
        }
    };

    let ingest: Arc<dyn IngestBackend> = match &queue {
        Some(queue) => Arc::new(StreamForwardBackend::new(
            queue.clone(),
            store_slot.clone(),
            config.dedupe_ttl,
            config.batch_size,
        )),
        None => Arc::new(LocalBufferBackend::new(store_slot.clone())),
    };

    let port = config.port;
    let app_state = AppState::new(config, store_slot, ingest, queue);
    let pipeline = Pipeline::start(app_state.clone());

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    // Flush whatever is still buffered before the process exits.
    pipeline.stop().await;

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
