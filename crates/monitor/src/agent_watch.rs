//! AgentWatch: per-run budget checks, windowed trend analysis, degradation
//! and the kill-switch.
//!
//! Samples are kept in a bounded buffer. Every sample is checked against the
//! per-run budgets as it arrives; a periodic pass evaluates trends over the
//! last five minutes. Alerts go to registered [`AlertObserver`]s, and
//! critical alerts either degrade agents to simulation or trip the
//! kill-switch.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use forgewatch_core::anomaly::{
    analyze_window, check_immediate, critical_response, summarize, AgentMetrics, AlertSeverity,
    AnomalyAlert, AnomalyThresholds, AnomalyType, CriticalResponse, MetricsSummary,
};
use forgewatch_core::error::CoreError;
use forgewatch_core::types::Timestamp;
use forgewatch_events::bus::names;
use forgewatch_events::{TelemetryBus, TelemetryEvent};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::audit_trail::AuditTrail;
use crate::error::MonitorError;
use crate::flags::RuntimeFlags;

/// Samples retained; the oldest is evicted beyond this.
pub const METRICS_BUFFER_CAPACITY: usize = 1000;

pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives every alert AgentWatch raises.
///
/// Observers run synchronously on the alerting path and must not block. A
/// failing or panicking observer is logged and does not affect the others.
pub trait AlertObserver: Send + Sync {
    fn on_alert(&self, alert: &AnomalyAlert) -> ObserverResult;
}

impl<F> AlertObserver for F
where
    F: Fn(&AnomalyAlert) -> ObserverResult + Send + Sync,
{
    fn on_alert(&self, alert: &AnomalyAlert) -> ObserverResult {
        self(alert)
    }
}

pub struct AgentWatch {
    metrics: Mutex<VecDeque<AgentMetrics>>,
    thresholds: AnomalyThresholds,
    flags: Arc<RuntimeFlags>,
    observers: RwLock<Vec<Arc<dyn AlertObserver>>>,
    telemetry: Arc<TelemetryBus>,
    audit: Arc<AuditTrail>,
}

impl AgentWatch {
    pub fn new(
        thresholds: AnomalyThresholds,
        flags: Arc<RuntimeFlags>,
        telemetry: Arc<TelemetryBus>,
        audit: Arc<AuditTrail>,
    ) -> Self {
        Self {
            metrics: Mutex::new(VecDeque::with_capacity(METRICS_BUFFER_CAPACITY)),
            thresholds,
            flags,
            observers: RwLock::new(Vec::new()),
            telemetry,
            audit,
        }
    }

    pub fn thresholds(&self) -> &AnomalyThresholds {
        &self.thresholds
    }

    pub fn register_observer(&self, observer: Arc<dyn AlertObserver>) {
        match self.observers.write() {
            Ok(mut observers) => observers.push(observer),
            Err(poisoned) => poisoned.into_inner().push(observer),
        }
    }

    // -----------------------------------------------------------------------
    // Recording and checks
    // -----------------------------------------------------------------------

    /// Buffer a sample and raise any per-run budget alerts it triggers.
    pub async fn record_metrics(&self, metrics: AgentMetrics) -> Vec<AnomalyAlert> {
        {
            let mut buffer = self.metrics.lock().await;
            buffer.push_back(metrics.clone());
            while buffer.len() > METRICS_BUFFER_CAPACITY {
                buffer.pop_front();
            }
        }

        let alerts = self.check_immediate_anomalies(&metrics);
        for alert in &alerts {
            self.trigger_alert(alert.clone()).await;
        }

        self.telemetry.publish(
            TelemetryEvent::new(names::AGENT_METRICS_RECORDED)
                .for_org(metrics.org_id.clone())
                .with_payload(json!({
                    "run_id": metrics.run_id,
                    "module_id": metrics.module_id,
                    "tokens": metrics.tokens,
                    "cost": metrics.cost,
                    "score": metrics.score,
                    "alerts": alerts.len(),
                })),
        );

        alerts
    }

    pub fn check_immediate_anomalies(&self, metrics: &AgentMetrics) -> Vec<AnomalyAlert> {
        check_immediate(metrics, &self.thresholds, Utc::now())
    }

    /// Evaluate trends over the last five minutes and raise what they show.
    pub async fn analyze_metrics(&self, now: Timestamp) -> Vec<AnomalyAlert> {
        let samples: Vec<AgentMetrics> = self.metrics.lock().await.iter().cloned().collect();
        let alerts = analyze_window(&samples, &self.thresholds, now);
        for alert in &alerts {
            self.trigger_alert(alert.clone()).await;
        }
        alerts
    }

    // -----------------------------------------------------------------------
    // Alert dispatch
    // -----------------------------------------------------------------------

    pub async fn trigger_alert(&self, alert: AnomalyAlert) {
        match alert.severity {
            AlertSeverity::Critical => tracing::error!(
                alert_type = %alert.alert_type,
                org_id = alert.org_id(),
                actual = alert.actual,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
            AlertSeverity::Warning => tracing::warn!(
                alert_type = %alert.alert_type,
                org_id = alert.org_id(),
                actual = alert.actual,
                threshold = alert.threshold,
                "{}",
                alert.message
            ),
        }

        self.notify_observers(&alert);

        self.telemetry.publish(
            TelemetryEvent::new(names::AGENT_ALERT)
                .for_org(alert.org_id())
                .with_payload(json!({
                    "alert_type": alert.alert_type,
                    "severity": alert.severity,
                    "message": alert.message,
                    "threshold": alert.threshold,
                    "actual": alert.actual,
                    "run_id": alert.run_id(),
                })),
        );

        if alert.is_critical() {
            self.handle_critical_alert(&alert).await;
        }
    }

    fn notify_observers(&self, alert: &AnomalyAlert) {
        let observers: Vec<Arc<dyn AlertObserver>> = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for (index, observer) in observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_alert(alert))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(observer = index, error = %e, "Alert observer failed");
                }
                Err(_) => {
                    tracing::error!(observer = index, "Alert observer panicked");
                }
            }
        }
    }

    pub async fn handle_critical_alert(&self, alert: &AnomalyAlert) {
        match critical_response(alert) {
            CriticalResponse::KillSwitch { reason } => self.trigger_kill_switch(&reason).await,
            CriticalResponse::Degrade => {
                self.enable_degradation_mode().await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Degradation and kill-switch
    // -----------------------------------------------------------------------

    /// Returns `false` if degradation was already on.
    pub async fn enable_degradation_mode(&self) -> bool {
        if !self.flags.set_degraded(true).await {
            return false;
        }
        tracing::warn!("Degradation mode enabled, agents fall back to simulation");
        self.telemetry
            .publish(TelemetryEvent::new(names::DEGRADATION_MODE_ENABLED));
        true
    }

    /// Returns `false` if degradation was already off.
    pub async fn disable_degradation_mode(&self) -> bool {
        if !self.flags.set_degraded(false).await {
            return false;
        }
        tracing::info!("Degradation mode disabled");
        self.telemetry
            .publish(TelemetryEvent::new(names::DEGRADATION_MODE_DISABLED));
        true
    }

    pub fn degradation_mode(&self) -> bool {
        self.flags.degraded()
    }

    /// Stop all agents. Observers receive a synthetic critical alert.
    pub async fn trigger_kill_switch(&self, reason: &str) {
        tracing::error!(reason, "KILL-SWITCH ACTIVATED");
        self.flags.disable_agents().await;

        self.telemetry.publish(
            TelemetryEvent::new(names::KILL_SWITCH_ACTIVATED).with_payload(json!({
                "reason": reason,
            })),
        );

        let latest = self.metrics.lock().await.back().cloned();
        let alert = AnomalyAlert {
            alert_type: AnomalyType::KillSwitch,
            severity: AlertSeverity::Critical,
            message: format!("KILL-SWITCH ACTIVATED: {reason}"),
            metrics: latest,
            threshold: 0.0,
            actual: 1.0,
            timestamp: Utc::now(),
        };
        self.notify_observers(&alert);
    }

    /// Operator-initiated kill-switch. Agents stop even if the audit record
    /// cannot be written; that failure is returned after the fact.
    pub async fn manual_kill_switch(&self, actor: &str, reason: &str) -> Result<(), MonitorError> {
        self.trigger_kill_switch(reason).await;
        self.audit.log_agents_disabled(actor, reason).await?;
        Ok(())
    }

    /// Operator-initiated degradation toggle. Returns `false` when the mode
    /// already had the requested value, in which case nothing is audited.
    ///
    /// Leaving degradation is audited first and does not happen if the
    /// record cannot be written. Entering it always takes effect.
    pub async fn set_degradation_mode(
        &self,
        actor: &str,
        enabled: bool,
    ) -> Result<bool, MonitorError> {
        if enabled {
            if !self.enable_degradation_mode().await {
                return Ok(false);
            }
            self.audit.log_degradation_changed(actor, true).await?;
            return Ok(true);
        }

        if !self.flags.degraded() {
            return Ok(false);
        }
        self.audit.log_degradation_changed(actor, false).await?;
        Ok(self.disable_degradation_mode().await)
    }

    pub fn are_agents_enabled(&self) -> bool {
        self.flags.agents_enabled()
    }

    /// Clear the kill-switch. The audit record is written first; if it
    /// cannot be written agents stay disabled. Refused while the
    /// `AGENTS_ENABLED` environment toggle is off.
    pub async fn reenable_agents(
        &self,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<(), MonitorError> {
        if !self.flags.env_enabled() {
            return Err(CoreError::Conflict(
                "agents are disabled by the AGENTS_ENABLED environment toggle".into(),
            )
            .into());
        }
        self.audit.log_agents_reenabled(actor, reason).await?;
        self.flags.enable_agents().await;

        tracing::info!(actor, reason, "Agents re-enabled");
        self.telemetry.publish(
            TelemetryEvent::new(names::AGENTS_REENABLED).with_payload(json!({
                "actor": actor,
                "reason": reason,
            })),
        );
        Ok(())
    }

    pub async fn metrics_summary(&self) -> MetricsSummary {
        let samples: Vec<AgentMetrics> = self.metrics.lock().await.iter().cloned().collect();
        summarize(&samples, &self.thresholds, self.flags.degraded(), Utc::now())
    }

    pub async fn buffered_samples(&self) -> usize {
        self.metrics.lock().await.len()
    }

    // -----------------------------------------------------------------------
    // Background analysis
    // -----------------------------------------------------------------------

    /// Spawn the periodic trend analysis. Stops when `cancel` fires.
    pub fn start_monitoring(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let watch = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(interval_secs = every.as_secs(), "AgentWatch analysis started");

            let mut interval = tokio::time::interval(every);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("AgentWatch analysis stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let alerts = watch.analyze_metrics(Utc::now()).await;
                        if alerts.is_empty() {
                            tracing::debug!("AgentWatch analysis: no anomalies");
                        } else {
                            tracing::info!(count = alerts.len(), "AgentWatch analysis raised alerts");
                        }
                    }
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
