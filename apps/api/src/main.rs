use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use vellum::compile::CompileExecutor;
use vellum::config::Config;
use vellum::db::create_pool;
use vellum::jobs::{Orchestrator, SyncCompiler};
use vellum::models::job::PublicUrlBuilder;
use vellum::queue::{RedisBroker, RedisResultBackend};
use vellum::records::PgRecordSource;
use vellum::render::{Renderer, TemplateSet};
use vellum::routes::build_router;
use vellum::state::AppState;
use vellum::storage::S3ArtifactStore;
use vellum::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    info!("Starting Vellum API v{}", env!("CARGO_PKG_VERSION"));

    // Records
    let db = create_pool(config.database_url()?).await?;
    let records = Arc::new(PgRecordSource::new(db));

    // Templates
    let templates = TemplateSet::load(&config.templates_dir)
        .with_context(|| format!("Failed to load templates from {}", config.templates_dir.display()))?;
    let renderer = Arc::new(Renderer::new(templates));
    info!("Templates loaded from {}", config.templates_dir.display());

    // Artifact store, queue and result backend
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

    let orchestrator = Orchestrator::new(
        records.clone(),
        renderer.clone(),
        store,
        broker,
        results,
        config.store.keys.clone(),
        PublicUrlBuilder::new(&config.store.public_base_url),
        config.compile.retry,
    );
    let sync = SyncCompiler::new(
        renderer,
        CompileExecutor::new(config.compile.compiler.clone(), config.compile.limits),
        config.work_root.join("sync"),
    );

    let state = AppState {
        records,
        orchestrator,
        sync,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
