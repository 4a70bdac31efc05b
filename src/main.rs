use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use Pulsegate_backend::api::admin::{requeue_callback, AdminState};
use Pulsegate_backend::callbacks::{
    CallbackEngine, CallbackHttpClient, CallbackKind, DeliveryQueue, InFlightGuard,
    MerchantDirectory, TransactionStore,
};
use Pulsegate_backend::config::AppConfig;
use Pulsegate_backend::database::init_pool_from_config;
use Pulsegate_backend::database::merchant_directory::PgMerchantDirectory;
use Pulsegate_backend::database::transaction_store::PgTransactionStore;
use Pulsegate_backend::health::{HealthChecker, HealthStatus};
use Pulsegate_backend::logging::init_tracing;
use Pulsegate_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use Pulsegate_backend::workers::callback_dispatcher::{
    CallbackDispatcherConfig, CallbackDispatcherWorker,
};
use Pulsegate_backend::workers::delivery_pool::{DeliveryPoolConfig, DeliveryWorkerPool};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    init_tracing();

    info!("🚀 Starting Pulsegate backend");

    let config = AppConfig::from_env()?;
    config.validate()?;

    info!("📊 Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await?;
    info!("✅ Database connection pool initialized");

    info!("🏥 Initializing health checker...");
    let health_checker = HealthChecker::new(db_pool.clone());
    info!("✅ Health checker initialized");

    // Callback engine wiring: one guard and one store shared by the sweeps
    // and both delivery pools, one bounded queue per callback kind.
    let callbacks = &config.callbacks;
    let guard = Arc::new(InFlightGuard::new(Duration::from_secs(
        callbacks.inflight_ttl,
    )));
    let store: Arc<dyn TransactionStore> = Arc::new(PgTransactionStore::new(db_pool.clone()));
    let merchants: Arc<dyn MerchantDirectory> = Arc::new(PgMerchantDirectory::new(
        db_pool.clone(),
        Duration::from_secs(callbacks.merchant_cache_ttl),
    ));

    let (success_queue, success_rx) =
        DeliveryQueue::bounded(CallbackKind::Success, callbacks.queue_capacity);
    let (failure_queue, failure_rx) =
        DeliveryQueue::bounded(CallbackKind::Failure, callbacks.queue_capacity);

    let engine = Arc::new(CallbackEngine::new(
        store.clone(),
        merchants,
        guard.clone(),
        success_queue.clone(),
        failure_queue.clone(),
        Duration::from_secs(callbacks.failure_window_hours * 3600),
    ));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);

    let dispatcher_config = CallbackDispatcherConfig::from_env();
    info!(
        scan_interval_secs = dispatcher_config.scan_interval.as_secs(),
        "Starting callback dispatcher worker"
    );
    let dispatcher = CallbackDispatcherWorker::new(engine.clone(), dispatcher_config);
    let dispatcher_handle = tokio::spawn(dispatcher.run(worker_shutdown_rx.clone()));

    let pool_config = DeliveryPoolConfig::from_env();
    let http = CallbackHttpClient::new(
        pool_config.request_timeout,
        pool_config.max_response_bytes,
    )?;

    info!(
        workers = pool_config.workers,
        "Starting callback delivery pools"
    );
    let success_pool = DeliveryWorkerPool::new(
        pool_config.clone(),
        http.clone(),
        store.clone(),
        guard.clone(),
        success_queue,
        success_rx,
    );
    let success_handle = tokio::spawn(success_pool.run(worker_shutdown_rx.clone()));

    let failure_pool = DeliveryWorkerPool::new(
        pool_config,
        http,
        store,
        guard,
        failure_queue,
        failure_rx,
    );
    let failure_handle = tokio::spawn(failure_pool.run(worker_shutdown_rx));

    info!("🛣️  Setting up application routes...");

    let admin_routes = Router::new()
        .route(
            "/admin/callbacks/{transaction_id}/requeue",
            post(requeue_callback),
        )
        .with_state(AdminState {
            engine: engine.clone(),
        });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(AppState { health_checker })
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    // Print a prominent banner with server information
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                                                              ║");
    println!("║         🚀 PULSEGATE BACKEND SERVER IS RUNNING 🚀            ║");
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║                                                              ║");
    println!(
        "║  🌐 Server Address:  http://{}                    ║",
        addr
    );
    println!("║                                                              ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  📡 AVAILABLE ENDPOINTS:                                     ║");
    println!("║                                                              ║");
    println!("║  GET  /                          - Root endpoint             ║");
    println!("║  GET  /health                    - Health check              ║");
    println!("║  GET  /health/ready              - Readiness probe           ║");
    println!("║  GET  /health/live               - Liveness probe            ║");
    println!("║  POST /admin/callbacks/{{id}}/requeue - Re-queue callback      ║");
    println!("║                                                              ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    info!(
        address = %addr,
        "🚀 Server listening on http://{}",
        addr
    );
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    for (name, handle) in [
        ("callback dispatcher", dispatcher_handle),
        ("success delivery pool", success_handle),
        ("failure delivery pool", failure_handle),
    ] {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(worker = name, error = %e, "Timed out waiting for worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}

// Application state
#[derive(Clone)]
struct AppState {
    health_checker: HealthChecker,
}

// Handlers
async fn root() -> &'static str {
    info!("📍 Root endpoint accessed");
    "Welcome to Pulsegate Backend API"
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    info!("🏥 Health check requested");
    let health_status = state.health_checker.check_health().await;

    // Return 503 if any component is unhealthy
    if !health_status.is_healthy() {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        info!("✅ Health check passed");
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    info!("🔍 Readiness probe requested");
    let result = health(axum::extract::State(state)).await;
    if result.is_ok() {
        info!("✅ Readiness check passed");
    } else {
        error!("❌ Readiness check failed");
    }
    result
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> Result<&'static str, (axum::http::StatusCode, String)> {
    info!("💓 Liveness probe requested");
    Ok("OK")
}
