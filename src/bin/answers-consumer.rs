//! Standalone consumer draining the durable answer streams into Postgres.
//!
//! Runs independently of the request-handling server; deploy exactly one
//! instance per environment (a redundant instance is safe but wasteful,
//! since writes are insert-or-ignore).

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quiz_pulse_back::{
    config::AppConfig,
    dao::{
        answer_store::{AnswerStore, StoreSlot},
        postgres::PostgresAnswerStore,
        queue::redis::RedisAnswerQueue,
    },
    services::{consumer::AnswerConsumer, storage_supervisor},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    let Some(redis_url) = config.redis_url.clone() else {
        bail!("REDIS_URL is not configured");
    };

    let queue = RedisAnswerQueue::connect(&redis_url, config.queue_keys.clone())
        .await
        .context("connecting to Redis")?;

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

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    AnswerConsumer::new(Arc::new(queue), store_slot, &config)
        .run(shutdown_rx)
        .await;

    Ok(())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM.
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
