use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use forgewatch_api::config::ServerConfig;
use forgewatch_api::state::{AppState, Stores};
use forgewatch_api::{background, router};
use forgewatch_db::{MemoryStore, PgStore};
use forgewatch_events::{EmailDelivery, TelemetryBus, TelemetryPersistence, WebhookDelivery};
use forgewatch_monitor::notifier::ChannelNotifier;
use forgewatch_monitor::{ChannelConfig, MonitorConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forgewatch_api=debug,forgewatch_monitor=info,tower_http=debug".into());
    let json_logs = std::env::var("LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let monitor = MonitorConfig::from_env();
    let channels = ChannelConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let stores = match &config.database_url {
        Some(database_url) => {
            let pool = forgewatch_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            forgewatch_db::health_check(&pool)
                .await
                .expect("Database health check failed");

            forgewatch_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Stores::from_backend(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, keeping all state in memory");
            Stores::from_backend(Arc::new(MemoryStore::new()))
        }
    };

    // --- Telemetry bus ---
    let telemetry = Arc::new(TelemetryBus::default());
    let persistence_handle = tokio::spawn(TelemetryPersistence::run(
        stores.telemetry.clone(),
        telemetry.subscribe(),
    ));

    // --- Alert delivery ---
    let email = channels.email.clone().map(EmailDelivery::new);
    if email.is_none() && !channels.alert_email_recipients.is_empty() {
        tracing::warn!("Alert email recipients configured without SMTP settings");
    }
    let notifier = Arc::new(ChannelNotifier::new(WebhookDelivery::new(), email));

    // --- App state ---
    let (state, alert_queue) = AppState::build(
        config.clone(),
        &monitor,
        &channels,
        notifier,
        stores,
        telemetry,
    );
    if let Err(e) = state.flags.load().await {
        tracing::error!(error = %e, "Failed to load runtime flags, using configured defaults");
    }
    tracing::info!(
        agents_enabled = state.flags.agents_enabled(),
        degraded = state.flags.degraded(),
        "Runtime flags loaded"
    );
    match state.alerts.load_incidents().await {
        Ok(loaded) => tracing::info!(loaded, "Unresolved incidents loaded"),
        Err(e) => tracing::error!(error = %e, "Failed to load incidents, starting with none"),
    }

    // --- Background jobs ---
    let cancel = CancellationToken::new();
    let handles = background::spawn_all(&state, &monitor, alert_queue, &cancel);

    // --- Router ---
    let app = router::build_app_router(state, &config);

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

    let timeout = Duration::from_secs(config.shutdown_timeout_secs);
    cancel.cancel();
    background::join_all(handles, timeout).await;
    tracing::info!("Background jobs stopped");

    // Persistence ends once the last service holding the bus is dropped.
    let _ = tokio::time::timeout(timeout, persistence_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
