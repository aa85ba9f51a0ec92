use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use meshgen_api::config::ServerConfig;
use meshgen_api::state::AppState;
use meshgen_api::{routes, sse};
use meshgen_core::proxy::ProxyRewriter;
use meshgen_events::{RedisPublisher, RedisSubscriber};
use meshgen_pipeline::Orchestrator;
use meshgen_providers::S3ModelStorage;
use meshgen_queue::{JobQueue, QueueConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshgen_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = meshgen_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    meshgen_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    meshgen_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Broker ---
    let redis_client =
        redis::Client::open(config.redis_url.as_str()).expect("Invalid REDIS_URL");
    let queue_conn = redis_client
        .get_connection_manager()
        .await
        .expect("Failed to connect to broker");
    let image_queue = JobQueue::new(queue_conn.clone(), QueueConfig::image_generation());
    let model_queue = JobQueue::new(queue_conn, QueueConfig::model_generation());
    tracing::info!("Broker connection established");

    // --- SSE connection registry ---
    let registry = Arc::new(sse::ConnectionRegistry::new());
    let cancel = tokio_util::sync::CancellationToken::new();
    let heartbeat_handle = sse::start_heartbeat(Arc::clone(&registry), cancel.clone());

    // --- Event hub: publish to the broker, fall back to local delivery ---
    let publisher = RedisPublisher::connect(&redis_client)
        .await
        .expect("Failed to create event publisher");
    let hub = Arc::new(sse::SseHub::new(Arc::clone(&registry), Arc::new(publisher)));

    // Every event on the channel (this replica's included) reaches local
    // connections through the subscription.
    let subscriber_hub = Arc::clone(&hub);
    let subscriber_handle = RedisSubscriber::new(redis_client).spawn(cancel.clone(), move |event| {
        subscriber_hub.deliver_local(&event);
    });
    tracing::info!("Event subscription started");

    // --- Storage and orchestration ---
    let aws_cfg = aws_config::load_from_env().await;
    let storage = Arc::new(S3ModelStorage::new(
        aws_sdk_s3::Client::new(&aws_cfg),
        reqwest::Client::new(),
        config.s3_bucket.clone(),
        config.storage_base_url.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        image_queue.clone(),
        model_queue.clone(),
        hub,
        storage,
        ProxyRewriter::new(config.storage_base_url.clone()),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        registry: Arc::clone(&registry),
        orchestrator,
        image_queue,
        model_queue,
    };

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check and diagnostics at root level (not under /api/v1).
        .merge(routes::health::router())
        .merge(routes::workers::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), subscriber_handle).await;
    tracing::info!("Event subscription stopped");

    registry.shutdown_all();
    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("x-user-id")])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
