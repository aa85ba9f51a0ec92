//! Worker process: queue runners and periodic sweeps.
//!
//! Runs next to any number of API replicas. Events produced here reach
//! clients through the broker; this process never holds client connections.

mod config;

use std::sync::Arc;
use std::time::Duration;

use meshgen_core::poll::PollPolicy;
use meshgen_core::proxy::ProxyRewriter;
use meshgen_events::{BusBroadcaster, RedisPublisher};
use meshgen_pipeline::{ImageWorker, ModelWorker, OrphanSweeper, TimeoutSweeper};
use meshgen_providers::{HttpImageProvider, HttpModelProvider, S3ModelStorage};
use meshgen_queue::{JobQueue, QueueConfig, QueueRunner};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::WorkerConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "meshgen_worker=debug,meshgen_pipeline=debug,meshgen_queue=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!("Loaded worker configuration");

    // --- Database ---
    let pool = meshgen_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    meshgen_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // --- Broker ---
    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Invalid REDIS_URL");
    let queue_conn = redis_client
        .get_connection_manager()
        .await
        .expect("Failed to connect to broker");
    tracing::info!("Broker connection established");

    // --- Event publishing ---
    let publisher = RedisPublisher::connect(&redis_client)
        .await
        .expect("Failed to create event publisher");
    let broadcast = Arc::new(BusBroadcaster::new(Arc::new(publisher)));

    // --- External providers ---
    let http = reqwest::Client::new();
    let image_provider = Arc::new(HttpImageProvider::new(
        http.clone(),
        config.image_api_base_url.clone(),
        config.image_api_key.clone(),
    ));
    let model_provider = Arc::new(HttpModelProvider::new(
        http.clone(),
        config.model_api_base_url.clone(),
        config.model_api_key.clone(),
    ));

    let aws_cfg = aws_config::load_from_env().await;
    let storage = Arc::new(S3ModelStorage::new(
        aws_sdk_s3::Client::new(&aws_cfg),
        http,
        config.s3_bucket.clone(),
        config.storage_base_url.clone(),
    ));

    // --- Queues ---
    let image_queue_config = QueueConfig::image_generation();
    let model_queue_config = QueueConfig::model_generation();
    let image_backoff = image_queue_config.backoff_base;
    let model_backoff = model_queue_config.backoff_base;
    let image_queue = JobQueue::new(queue_conn.clone(), image_queue_config);
    let model_queue = JobQueue::new(queue_conn, model_queue_config);

    // Re-deliver anything a previous run left in flight.
    image_queue
        .recover()
        .await
        .expect("Failed to recover image queue");
    model_queue
        .recover()
        .await
        .expect("Failed to recover model queue");

    // --- Workers ---
    let proxy = ProxyRewriter::new(config.storage_base_url.clone());
    let image_worker = Arc::new(ImageWorker::new(
        pool.clone(),
        image_provider,
        storage.clone(),
        broadcast.clone(),
        proxy.clone(),
        config.image_provider_name.clone(),
        config.image_job_timeout,
        image_backoff,
    ));
    let model_worker = Arc::new(ModelWorker::new(
        pool.clone(),
        model_provider,
        storage.clone(),
        broadcast.clone(),
        proxy,
        PollPolicy::new(config.model_poll_interval, config.model_poll_max_attempts),
        config.model_provider_name.clone(),
        config.public_base_url.clone(),
        model_backoff,
    ));

    // --- Background tasks ---
    let cancel = tokio_util::sync::CancellationToken::new();
    let image_runner = QueueRunner::new(image_queue, image_worker).spawn(cancel.clone());
    let model_runner = QueueRunner::new(model_queue, model_worker).spawn(cancel.clone());
    let timeout_sweep =
        TimeoutSweeper::new(pool.clone(), broadcast, config.timeout_sweep_interval)
            .spawn(cancel.clone());
    let orphan_sweep = OrphanSweeper::new(
        pool,
        storage,
        config.orphan_sweep_interval,
        config.orphan_max_retries,
        config.orphan_batch,
    )
    .spawn(cancel.clone());
    tracing::info!("Queue runners and sweeps started");

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();
    for (name, handle) in [
        ("image runner", image_runner),
        ("model runner", model_runner),
        ("timeout sweep", timeout_sweep),
        ("orphan sweep", orphan_sweep),
    ] {
        if tokio::time::timeout(Duration::from_secs(30), handle).await.is_err() {
            tracing::warn!(task = name, "Task did not stop within the shutdown window");
        }
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the process
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
