//! Catalog Ingest - Main Entry Point
//! HTTP gateway + worker pool + liveness sweep + maintenance in one process

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use catalog_ingest_api_http::{router, serve, AppState, RateLimiter};
use catalog_ingest_core::application::{
    shutdown_channel, ImportQueryService, ImportWorker, IngestionGateway, LivenessSweeper,
    MaintenanceScheduler, RetryController, RetryPolicy, WorkerPool,
};
use catalog_ingest_core::port::id_provider::UuidProvider;
use catalog_ingest_core::port::time_provider::SystemTimeProvider;
use catalog_ingest_core::port::{MessageTransport, TimeProvider};
use catalog_ingest_infra_fs::LocalFileStore;
use catalog_ingest_infra_sqlite::{
    create_pool, run_migrations, SqliteCatalogRepository, SqliteJobStore, SqliteMaintenance,
    SqliteMessageTransport, SqlitePool,
};

use crate::config::{sqlite_parent_dir, Settings};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging first so configuration problems are reported
    let _telemetry = telemetry::init()?;
    info!("Catalog Ingest v{} starting...", VERSION);

    // 2. Configuration
    let settings = Settings::load()?;
    info!(
        database = %settings.database.url,
        broker = %settings.broker_database_url(),
        storage = %settings.storage.root,
        "Configuration loaded"
    );

    // 3. Databases
    let pool = open_database(&settings.database.url, settings.database.max_connections).await?;
    let broker_pool = if settings.broker_database_url() == settings.database.url {
        pool.clone()
    } else {
        open_database(settings.broker_database_url(), settings.database.max_connections).await?
    };

    // 4. Wiring
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let topology = settings.broker.topology.clone();

    let job_store = Arc::new(SqliteJobStore::new(pool.clone()));
    let catalog = Arc::new(SqliteCatalogRepository::new(pool.clone(), time_provider.clone()));
    let maintenance = Arc::new(SqliteMaintenance::new(pool.clone(), time_provider.clone()));
    let transport = Arc::new(SqliteMessageTransport::new(broker_pool, time_provider.clone()));
    let file_store = Arc::new(
        LocalFileStore::new(&settings.storage.root)
            .await
            .with_context(|| format!("Cannot open storage directory {}", settings.storage.root))?,
    );

    transport
        .declare_topology(&topology)
        .await
        .context("Topology declaration failed")?;

    let policy = RetryPolicy::new(settings.retry.clone());
    let retry = Arc::new(RetryController::new(
        job_store.clone(),
        transport.clone(),
        topology.clone(),
        policy.clone(),
        time_provider.clone(),
    ));

    // 5. Crash recovery: deliveries a previous run left in flight
    let sweeper = LivenessSweeper::new(
        job_store.clone(),
        transport.clone(),
        time_provider.clone(),
        topology.clone(),
        policy,
        settings.sweep.clone(),
    );
    match sweeper.recover_on_startup().await {
        Ok(count) => info!(requeued = count, "Crash recovery completed"),
        Err(e) => error!(error = %e, "Crash recovery failed"),
    }

    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    // 6. Worker pool
    let worker = ImportWorker::new(
        job_store.clone(),
        catalog,
        file_store.clone(),
        transport.clone(),
        retry,
        time_provider.clone(),
        settings.worker.clone(),
    );
    let pool_size = settings.worker.pool_size;
    let worker_pool = WorkerPool::new(worker, topology.queue.clone(), pool_size);
    let pool_token = shutdown_rx.clone();
    let pool_handle = tokio::spawn(async move { worker_pool.run(pool_token).await });

    // 7. Liveness sweep
    let sweep_token = shutdown_rx.clone();
    let sweep_handle = tokio::spawn(async move { sweeper.run(sweep_token).await });

    // 8. Maintenance
    let scheduler = MaintenanceScheduler::new(
        maintenance,
        file_store.clone(),
        settings.maintenance.to_config(),
        settings.maintenance.interval_hours,
    );
    let maintenance_token = shutdown_rx.clone();
    let maintenance_handle = tokio::spawn(scheduler.run(maintenance_token));

    // 9. HTTP
    let gateway = IngestionGateway::new(
        job_store.clone(),
        file_store,
        transport.clone(),
        id_provider,
        time_provider.clone(),
        topology.clone(),
    );
    let queries = ImportQueryService::new(job_store, transport, time_provider, topology);
    let state = AppState {
        gateway: Arc::new(gateway),
        queries: Arc::new(queries),
        rate_limiter: Arc::new(RateLimiter::new(&settings.rate_limit)),
    };
    let app = router(state, &settings.http);
    let listener = tokio::net::TcpListener::bind(&settings.http.bind)
        .await
        .with_context(|| format!("Cannot bind {}", settings.http.bind))?;
    let http_handle = tokio::spawn(serve(listener, app, shutdown_rx));

    info!(pool_size = pool_size, bind = %settings.http.bind, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 10. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Draining...");
    shutdown_tx.shutdown();

    // 11. Graceful shutdown: workers stop taking deliveries; an import already
    // in flight runs on within the grace period and, if cut off, resumes from
    // its committed rows after restart
    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        if let Ok(Err(e)) = http_handle.await {
            error!(error = %e, "HTTP server failed");
        }
        if let Ok(Err(e)) = pool_handle.await {
            error!(error = %e, "Worker pool failed");
        }
        let _ = sweep_handle.await;
        let _ = maintenance_handle.await;
    })
    .await;

    if drained.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Shutdown grace period elapsed; unacked deliveries will be redelivered"
        );
    }

    pool.close().await;
    info!("Shutdown complete.");
    Ok(())
}

async fn open_database(url: &str, max_connections: u32) -> Result<SqlitePool> {
    if let Some(dir) = sqlite_parent_dir(url) {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Cannot create {}", dir.display()))?;
    }

    info!(url = %url, "Opening database...");
    let pool = create_pool(url, max_connections)
        .await
        .with_context(|| format!("DB pool creation failed for {}", url))?;
    run_migrations(&pool).await.context("Migration failed")?;
    Ok(pool)
}
