//! Background tasks and scheduled jobs.
//!
//! Every task accepts a [`CancellationToken`] for graceful shutdown and is
//! spawned through [`spawn_all`], which hands back the join handles so the
//! binary can wait for them after the server stops.

use std::time::Duration;

use forgewatch_core::anomaly::AnomalyAlert;
use forgewatch_monitor::MonitorConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Spawn every long-running job the service needs.
///
/// ```text
/// alert forwarder       AgentWatch alerts -> AlertSystem
/// agentwatch analysis   windowed trend checks
/// health checks         system-wide run statistics
/// run log retention     prune the in-memory run log
/// session cleanup       deactivate expired sessions (hourly)
/// rate limit cleanup    drop stale counters (every 5 minutes)
/// ```
pub fn spawn_all(
    state: &AppState,
    monitor: &MonitorConfig,
    alert_queue: mpsc::UnboundedReceiver<AnomalyAlert>,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = vec![
        state
            .alerts
            .clone()
            .run_forwarder(alert_queue, cancel.clone()),
        state
            .agent_watch
            .start_monitoring(monitor.agentwatch_interval, cancel.clone()),
        state
            .alerts
            .start_health_checks(monitor.health_check_interval, cancel.clone()),
    ];

    let run_logger = state.run_logger.clone();
    let retention = monitor.run_log_retention;
    let token = cancel.clone();
    handles.push(tokio::spawn(async move {
        run_logger.run_pruning(retention, token).await;
    }));

    let sessions = state.sessions.clone();
    let token = cancel.clone();
    handles.push(tokio::spawn(async move {
        sessions.run_cleanup(token).await;
    }));

    let rate_limiter = state.rate_limiter.clone();
    let token = cancel.clone();
    handles.push(tokio::spawn(async move {
        rate_limiter.run_cleanup(token).await;
    }));

    tracing::info!(jobs = handles.len(), "Background jobs started");
    handles
}

/// Wait up to `timeout` for each job to finish after cancellation.
pub async fn join_all(handles: Vec<JoinHandle<()>>, timeout: Duration) {
    for handle in handles {
        if tokio::time::timeout(timeout, handle).await.is_err() {
            tracing::warn!(timeout_secs = timeout.as_secs(), "Background job did not stop in time");
        }
    }
}
