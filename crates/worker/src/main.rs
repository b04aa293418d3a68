use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use catalog_infra::{RedisStreamsQueue, WorkerConfig};
use catalog_worker::{ItemEventProcessor, Worker, WorkerOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    catalog_observability::init();

    let config = WorkerConfig::from_env().context("invalid configuration")?;
    let queue = RedisStreamsQueue::connect(&config.queue)
        .await
        .with_context(|| format!("failed to connect to queue {}", config.queue.queue_name))?;

    let worker = Worker::new(
        Arc::new(queue),
        ItemEventProcessor::default(),
        WorkerOptions::from(&config),
    );

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    tracing::info!(environment = ?config.environment, "worker started");
    worker.run(token).await;

    let stats = worker.stats();
    tracing::info!(
        received = stats.received,
        completed = stats.completed,
        abandoned = stats.abandoned,
        "worker stopped"
    );
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
    token.cancel();
}
