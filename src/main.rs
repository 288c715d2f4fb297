use bookshare_backend::api;
use bookshare_backend::api::payments::PaymentsState;
use bookshare_backend::catalog::InMemoryBookCatalog;
use bookshare_backend::config::AppConfig;
use bookshare_backend::health::{HealthChecker, HealthState, HealthStatus};
use bookshare_backend::logging::init_tracing;
use bookshare_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use bookshare_backend::payments::providers::MercadoPagoGateway;
use bookshare_backend::services::checkout::{CheckoutConfig, CheckoutService};
use bookshare_backend::services::receipt::ReceiptService;
use bookshare_backend::services::session::SessionStore;
use bookshare_backend::workers::payment_watcher::{PaymentWatcher, PaymentWatcherConfig};
use axum::{
    routing::{get, post},
    Json, Router,
};
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info, warn};

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
    init_tracing();

    dotenv().ok();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting BookShare payments backend"
    );

    let app_config = AppConfig::from_env()?;
    app_config.validate()?;
    info!(
        host = %app_config.server.host,
        port = app_config.server.port,
        receipt_dir = %app_config.receipts.dir.display(),
        "Server configuration loaded"
    );

    // Payment gateway (the only component holding processor credentials)
    info!("💳 Initializing Mercado Pago gateway...");
    let gateway = Arc::new(MercadoPagoGateway::from_env().map_err(|e| {
        error!("❌ Failed to initialize Mercado Pago gateway: {}", e);
        anyhow::anyhow!(e.to_string())
    })?);
    info!("✅ Mercado Pago gateway initialized");

    // Book catalog (opaque store behind a trait; seeded from a JSON file)
    let book_catalog = match std::env::var("BOOK_CATALOG_PATH") {
        Ok(path) => {
            let loaded = InMemoryBookCatalog::from_json_file(&path)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            info!(path = %path, books = loaded.len().await, "📚 Book catalog loaded");
            Arc::new(loaded)
        }
        Err(_) => {
            warn!("BOOK_CATALOG_PATH not set; starting with an empty catalog");
            Arc::new(InMemoryBookCatalog::new())
        }
    };

    // Shared services
    let session_store = Arc::new(SessionStore::new());
    let receipt_service = Arc::new(ReceiptService::new(app_config.receipts.clone()));
    let checkout_service = Arc::new(CheckoutService::new(
        gateway.clone(),
        book_catalog,
        session_store.clone(),
        CheckoutConfig::from_env(),
    ));

    let health_checker = HealthChecker::new(app_config.receipts.dir.clone(), true);

    // Payment status watcher
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let watcher_config = PaymentWatcherConfig::from_env();
    info!(
        poll_interval_secs = watcher_config.poll_interval.as_secs(),
        max_attempts = watcher_config.max_attempts,
        pending_timeout_secs = watcher_config.pending_timeout.as_secs(),
        "Starting payment status watcher"
    );
    let watcher = PaymentWatcher::new(
        session_store.clone(),
        gateway.clone(),
        receipt_service.clone(),
        watcher_config,
    );
    let watcher_handle = tokio::spawn(watcher.run(worker_shutdown_rx));

    // Routes
    info!("🛣️  Setting up application routes...");
    let payments_state = PaymentsState {
        checkout: checkout_service,
        receipts: receipt_service,
    };

    let payment_routes = Router::new()
        .route("/payments/pix", post(api::payments::create_pix_payment))
        .route(
            "/payments/status/{payment_id}",
            get(api::payments::payment_status),
        )
        .route(
            "/payments/session/{session_token}",
            get(api::payments::get_session),
        )
        .route(
            "/payments/comprovante/{payment_id}",
            get(api::payments::download_receipt),
        )
        .with_state(payments_state);

    let health_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .with_state(health_checker);

    let app = Router::new()
        .route("/", get(root))
        .merge(payment_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );

    info!("✅ Routes configured");

    let addr: SocketAddr =
        format!("{}:{}", app_config.server.host, app_config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);
    info!("✅ Server is ready to accept connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), watcher_handle).await {
        error!(error = %e, "Timed out waiting for payment watcher shutdown");
    }

    info!("👋 Server shutdown complete");

    Ok(())
}

// Handlers

async fn root() -> &'static str {
    "Welcome to BookShare Payments API"
}

async fn health_handler(
    axum::extract::State(checker): axum::extract::State<HealthChecker>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let health_status = checker.check_health().await;

    if matches!(health_status.status, HealthState::Unhealthy) {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    } else {
        Ok(Json(health_status))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    state: axum::extract::State<HealthChecker>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    health_handler(state).await
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> &'static str {
    "OK"
}
