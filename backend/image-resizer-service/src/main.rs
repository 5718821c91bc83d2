/// Image Resizer Service
///
/// Run modes:
/// - no arguments: HTTP server (`/resize`, `/resize-async`, `/health`)
/// - `worker`: queue consumer only, drains in-flight tasks on SIGINT/SIGTERM
use actix_web::{middleware as actix_middleware, web, App, HttpServer};
use anyhow::{anyhow, Context};
use image_resizer_service::cache::RedisImageCache;
use image_resizer_service::handlers;
use image_resizer_service::models::RESIZE_TASK_KIND;
use image_resizer_service::services::{HttpImageFetcher, ResizerService};
use image_resizer_service::{telemetry, Config, ResizeTaskHandler};
use redis_utils::{RedisPool, DEFAULT_PING_TIMEOUT};
use std::sync::Arc;
use task_queue::{RedisTaskQueue, Worker};
use tokio::sync::watch;
use tracing::{error, info, warn};

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env();
    telemetry::init_tracing(config.is_production());
    config.log_summary();

    if std::env::args().nth(1).as_deref() == Some("worker") {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build worker runtime")?;
        runtime.block_on(run_worker(config))
    } else {
        actix_rt::System::new().block_on(run_server(config))
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let redis = connect_redis(&config).await?;

    let mut service = build_service(&config, redis.as_ref())?;
    match &redis {
        Some(pool) => {
            let queue = RedisTaskQueue::new(pool, config.worker.queue_name.clone());
            service = service.with_queue(Arc::new(queue), config.worker.enqueue_options());
        }
        None => warn!("Async processing disabled: no Redis connection"),
    }
    let service = web::Data::new(service);

    let bind_address = config.server.bind_address();
    info!(address = %bind_address, env = %config.app.env, "Server running");

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .wrap(actix_middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {bind_address}"))?
    .run()
    .await
    .context("Server stopped")?;

    info!("Image resizer shutting down");
    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    info!(redis_addr = %config.redis.addr, "Initializing worker");

    let pool = connect_redis(&config)
        .await?
        .ok_or_else(|| anyhow!("Worker mode requires Redis at {}", config.redis.addr))?;

    let service = Arc::new(build_service(&config, Some(&pool))?);
    let queue = Arc::new(RedisTaskQueue::new(&pool, config.worker.queue_name.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, shutting down worker");
        let _ = shutdown_tx.send(true);
    });

    Worker::new(config.worker.worker_config(), queue)
        .handle(RESIZE_TASK_KIND, Arc::new(ResizeTaskHandler::new(service)))
        .run(shutdown_rx)
        .await
        .context("Worker stopped with error")?;

    Ok(())
}

fn build_service(config: &Config, redis: Option<&RedisPool>) -> anyhow::Result<ResizerService> {
    let fetcher =
        HttpImageFetcher::new(config.http.timeout).context("Failed to build HTTP client")?;

    let mut service = ResizerService::new(Arc::new(fetcher));
    if let Some(pool) = redis {
        let cache = RedisImageCache::new(pool.manager(), config.redis.ttl);
        service = service.with_cache(Arc::new(cache));
    }
    Ok(service)
}

/// Connect to Redis. Unreachable Redis is fatal in debug mode, otherwise the
/// service runs without it.
async fn connect_redis(config: &Config) -> anyhow::Result<Option<RedisPool>> {
    let settings = config.redis.settings();

    match RedisPool::connect(&settings, DEFAULT_PING_TIMEOUT).await {
        Ok(pool) => {
            info!(redis = %settings.redacted_url(), "Connected to Redis");
            Ok(Some(pool))
        }
        Err(e) if config.app.debug => Err(e.context("Redis init error")),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Redis not available, continuing without cache");
            Ok(None)
        }
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
