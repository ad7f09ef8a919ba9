use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

use vellum::compile::CompileExecutor;
use vellum::config::Config;
use vellum::jobs::CompileWorker;
use vellum::models::job::PublicUrlBuilder;
use vellum::queue::{RedisBroker, RedisResultBackend};
use vellum::storage::S3ArtifactStore;
use vellum::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    info!(
        "Starting Vellum worker v{} ({} x {}, limits {}s/{}s)",
        env!("CARGO_PKG_VERSION"),
        config.worker_id,
        config.worker_concurrency,
        config.compile.limits.soft.as_secs(),
        config.compile.limits.hard.as_secs()
    );

    let store = Arc::new(S3ArtifactStore::from_config(&config.store).await);
    let broker = Arc::new(RedisBroker::connect(&config.queue.broker_url, &config.queue.prefix).await?);
    let results = Arc::new(
        RedisResultBackend::connect(
            &config.queue.result_backend_url,
            &config.queue.prefix,
            config.queue.result_ttl,
        )
        .await?,
    );

    let worker = Arc::new(CompileWorker::new(
        &config.worker_id,
        broker,
        results,
        store,
        CompileExecutor::new(config.compile.compiler.clone(), config.compile.limits),
        PublicUrlBuilder::new(&config.store.public_base_url),
        config.compile.retry,
        &config.work_root,
    ));

    let (stop, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown signal received, finishing in-progress jobs");
        let _ = stop.send(true);
    });

    worker.run(config.worker_concurrency, shutdown).await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
