//! Alert routing and incident management.
//!
//! [`AlertSystem::process_alert`] gates each alert on its rule's cooldown,
//! folds it into an incident and fans it out to every channel that accepts
//! its severity. Deliveries run concurrently; a failed delivery is logged
//! and never fails the alert.
//!
//! Incidents are written through to an [`IncidentStore`] on every change and
//! unresolved ones are reloaded at startup. Memory keeps every unresolved
//! incident plus the most recent [`RESOLVED_RETAINED`] resolved ones, which
//! bounds what listing and statistics see.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgewatch_core::alerting::{channels_for, rule_for, AlertChannel, AlertRule, CooldownTracker};
use forgewatch_core::anomaly::{AgentMetrics, AlertSeverity, AnomalyAlert, AnomalyType};
use forgewatch_core::incident::{
    compute_alert_statistics, AlertStatistics, IncidentReport, IncidentStatus,
};
use forgewatch_core::run_log::RunLogFilter;
use forgewatch_core::types::SYSTEM_ORG;
use forgewatch_db::store::IncidentStore;
use forgewatch_db::StoreError;
use forgewatch_events::bus::names;
use forgewatch_events::{TelemetryBus, TelemetryEvent};
use futures::future::join_all;
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent_watch::{AlertObserver, ObserverResult};
use crate::notifier::Notifier;
use crate::run_logger::RunAuditLogger;

/// Entries examined by the periodic health check.
const HEALTH_CHECK_SAMPLE: usize = 100;
/// Error rate (percent) above which the health check raises an error spike.
const HEALTH_MAX_ERROR_RATE: f64 = 20.0;
/// Pass rate (percent) below which the health check raises a low-score alert.
const HEALTH_MIN_PASS_RATE: f64 = 70.0;
/// Resolved incidents kept in memory; older ones remain only in the store.
pub const RESOLVED_RETAINED: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    /// Dropped because the governing rule is still cooling down.
    Suppressed,
    Processed {
        incident_id: String,
        channels_notified: usize,
    },
}

pub struct AlertSystem {
    rules: Vec<AlertRule>,
    channels: Vec<AlertChannel>,
    notifier: Arc<dyn Notifier>,
    cooldowns: Mutex<CooldownTracker>,
    incidents: Mutex<Vec<IncidentReport>>,
    store: Arc<dyn IncidentStore>,
    run_logger: Arc<RunAuditLogger>,
    telemetry: Arc<TelemetryBus>,
}

impl AlertSystem {
    pub fn new(
        rules: Vec<AlertRule>,
        channels: Vec<AlertChannel>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn IncidentStore>,
        run_logger: Arc<RunAuditLogger>,
        telemetry: Arc<TelemetryBus>,
    ) -> Self {
        Self {
            rules,
            channels,
            notifier,
            cooldowns: Mutex::new(CooldownTracker::new()),
            incidents: Mutex::new(Vec::new()),
            store,
            run_logger,
            telemetry,
        }
    }

    /// Adopt unresolved incidents from the store. Returns how many were
    /// added; incidents already held in memory are left alone.
    pub async fn load_incidents(&self) -> Result<usize, StoreError> {
        let stored = self.store.list_unresolved_incidents().await?;
        let mut incidents = self.incidents.lock().await;
        let mut added = 0;
        for incident in stored {
            if incidents.iter().all(|i| i.id != incident.id) {
                incidents.push(incident);
                added += 1;
            }
        }
        Ok(added)
    }

    /// Failures are logged; the in-memory copy stays authoritative.
    async fn persist(&self, incident: &IncidentReport) {
        if let Err(e) = self.store.save_incident(incident).await {
            tracing::error!(incident_id = %incident.id, error = %e, "Failed to persist incident");
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn channels(&self) -> &[AlertChannel] {
        &self.channels
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    pub async fn process_alert(&self, alert: AnomalyAlert) -> AlertOutcome {
        let cooldown = rule_for(&self.rules, alert.alert_type).map(AlertRule::cooldown);
        let allowed = self.cooldowns.lock().await.try_fire(
            alert.alert_type,
            alert.org_id(),
            cooldown,
            alert.timestamp,
        );
        if !allowed {
            tracing::debug!(
                alert_type = %alert.alert_type,
                org_id = alert.org_id(),
                "Alert suppressed by cooldown"
            );
            return AlertOutcome::Suppressed;
        }

        let incident = self.create_or_update_incident(&alert).await;
        let channels_notified = self.send_notifications(&alert, &incident).await;

        self.telemetry.publish(
            TelemetryEvent::new(names::ALERT_PROCESSED)
                .for_org(alert.org_id())
                .with_payload(json!({
                    "alert_type": alert.alert_type,
                    "severity": alert.severity,
                    "incident_id": incident.id,
                    "channels_notified": channels_notified,
                })),
        );

        AlertOutcome::Processed {
            incident_id: incident.id,
            channels_notified,
        }
    }

    /// Fold `alert` into a matching active incident or open a new one.
    /// Returns a snapshot of the incident after the update.
    pub async fn create_or_update_incident(&self, alert: &AnomalyAlert) -> IncidentReport {
        let mut incidents = self.incidents.lock().await;

        if let Some(existing) = incidents.iter_mut().rev().find(|i| i.absorbs(alert)) {
            existing.absorb(alert);
            tracing::debug!(incident_id = %existing.id, "Alert folded into existing incident");
            let snapshot = existing.clone();
            self.persist(&snapshot).await;
            return snapshot;
        }

        let incident = IncidentReport::open(alert);
        tracing::info!(
            incident_id = %incident.id,
            alert_type = %incident.alert_type,
            org_id = %incident.org_id,
            severity = incident.severity.as_str(),
            "Incident opened"
        );
        self.persist(&incident).await;
        incidents.push(incident.clone());
        incident
    }

    /// Deliver to every channel accepting the alert's severity. Returns how
    /// many deliveries succeeded.
    pub async fn send_notifications(
        &self,
        alert: &AnomalyAlert,
        incident: &IncidentReport,
    ) -> usize {
        let targets = channels_for(&self.channels, alert.severity);
        let results = join_all(
            targets
                .iter()
                .map(|channel| self.notifier.notify(channel, alert, incident)),
        )
        .await;

        let mut delivered = 0;
        for (channel, result) in targets.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::error!(
                    channel = %channel.id,
                    incident_id = %incident.id,
                    error = %e,
                    "Alert delivery failed"
                ),
            }
        }
        delivered
    }

    // -----------------------------------------------------------------------
    // Incident lifecycle
    // -----------------------------------------------------------------------

    pub async fn acknowledge_incident(&self, incident_id: &str, by: &str) -> bool {
        let mut incidents = self.incidents.lock().await;
        let Some(incident) = incidents.iter_mut().find(|i| i.id == incident_id) else {
            return false;
        };
        if !incident.acknowledge(by, Utc::now()) {
            return false;
        }
        let snapshot = incident.clone();
        self.persist(&snapshot).await;

        tracing::info!(incident_id, by, "Incident acknowledged");
        self.telemetry.publish(
            TelemetryEvent::new(names::INCIDENT_ACKNOWLEDGED)
                .for_org(snapshot.org_id)
                .with_payload(json!({
                    "incident_id": incident_id,
                    "acknowledged_by": by,
                })),
        );
        true
    }

    pub async fn resolve_incident(
        &self,
        incident_id: &str,
        by: &str,
        notes: Option<String>,
    ) -> bool {
        let mut incidents = self.incidents.lock().await;
        let Some(incident) = incidents.iter_mut().find(|i| i.id == incident_id) else {
            return false;
        };
        let now = Utc::now();
        if !incident.resolve(by, notes, now) {
            return false;
        }
        let snapshot = incident.clone();
        self.persist(&snapshot).await;
        evict_resolved(&mut incidents, RESOLVED_RETAINED);
        drop(incidents);

        let duration_minutes = (now - snapshot.started_at).num_milliseconds() as f64 / 60_000.0;
        tracing::info!(incident_id, by, duration_minutes, "Incident resolved");
        self.telemetry.publish(
            TelemetryEvent::new(names::INCIDENT_RESOLVED)
                .for_org(snapshot.org_id)
                .with_payload(json!({
                    "incident_id": incident_id,
                    "resolved_by": by,
                    "duration_minutes": duration_minutes,
                })),
        );
        true
    }

    pub async fn incident(&self, incident_id: &str) -> Option<IncidentReport> {
        self.incidents
            .lock()
            .await
            .iter()
            .find(|i| i.id == incident_id)
            .cloned()
    }

    pub async fn active_incidents(&self) -> Vec<IncidentReport> {
        self.list_incidents(Some(IncidentStatus::Active)).await
    }

    /// Incidents newest first, optionally restricted to one status.
    pub async fn list_incidents(&self, status: Option<IncidentStatus>) -> Vec<IncidentReport> {
        let mut out: Vec<IncidentReport> = self
            .incidents
            .lock()
            .await
            .iter()
            .filter(|i| status.is_none_or(|s| i.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        out
    }

    pub async fn get_alert_statistics(&self) -> AlertStatistics {
        compute_alert_statistics(&self.incidents.lock().await)
    }

    // -----------------------------------------------------------------------
    // System health
    // -----------------------------------------------------------------------

    /// Derive synthetic alerts from the most recent run logs and route them
    /// through [`Self::process_alert`]. Does nothing while no runs exist.
    pub async fn check_system_health(&self) -> Vec<AlertOutcome> {
        let filter = RunLogFilter {
            limit: Some(HEALTH_CHECK_SAMPLE),
            ..Default::default()
        };
        let stats = self.run_logger.get_statistics(&filter).await;
        if stats.total_runs == 0 {
            return Vec::new();
        }

        let now = Utc::now();
        let sample = AgentMetrics {
            run_id: "system_check".into(),
            org_id: SYSTEM_ORG.into(),
            module_id: "system".into(),
            tokens: stats.avg_tokens as u64,
            cost: stats.avg_cost,
            duration_ms: stats.avg_duration_ms as u64,
            score: None,
            error_rate: stats.error_rate / 100.0,
            timeouts: 0,
            timestamp: now,
        };

        let mut alerts = Vec::new();
        if stats.error_rate > HEALTH_MAX_ERROR_RATE {
            alerts.push(AnomalyAlert {
                alert_type: AnomalyType::ErrorSpike,
                severity: AlertSeverity::Critical,
                message: format!("System error rate is {:.1}%", stats.error_rate),
                metrics: Some(sample.clone()),
                threshold: HEALTH_MAX_ERROR_RATE / 100.0,
                actual: stats.error_rate / 100.0,
                timestamp: now,
            });
        }
        if stats.pass_rate < HEALTH_MIN_PASS_RATE {
            alerts.push(AnomalyAlert {
                alert_type: AnomalyType::ScoreLow,
                severity: AlertSeverity::Warning,
                message: format!("System pass rate is {:.1}%", stats.pass_rate),
                metrics: Some(sample),
                threshold: HEALTH_MIN_PASS_RATE,
                actual: stats.pass_rate,
                timestamp: now,
            });
        }

        let mut outcomes = Vec::with_capacity(alerts.len());
        for alert in alerts {
            outcomes.push(self.process_alert(alert).await);
        }
        outcomes
    }

    /// Spawn the periodic health check. Stops when `cancel` fires.
    pub fn start_health_checks(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let system = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(interval_secs = every.as_secs(), "System health check started");

            let mut interval = tokio::time::interval(every);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("System health check stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        let outcomes = system.check_system_health().await;
                        if outcomes.is_empty() {
                            tracing::debug!("System health check: healthy");
                        } else {
                            tracing::warn!(alerts = outcomes.len(), "System health check raised alerts");
                        }
                    }
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // AgentWatch bridge
    // -----------------------------------------------------------------------

    /// An observer that queues AgentWatch alerts for this system. Pair it
    /// with [`Self::run_forwarder`] on the receiving end.
    pub fn forwarder() -> (AlertForwarder, mpsc::UnboundedReceiver<AnomalyAlert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (AlertForwarder { tx }, rx)
    }

    /// Process queued alerts until the queue closes or `cancel` fires.
    pub fn run_forwarder(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<AnomalyAlert>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Alert forwarder stopping");
                        break;
                    }
                    next = rx.recv() => match next {
                        Some(alert) => {
                            self.process_alert(alert).await;
                        }
                        None => {
                            tracing::info!("Alert queue closed, forwarder exiting");
                            break;
                        }
                    }
                }
            }
        })
    }
}

/// Drop the oldest resolved incidents beyond `keep`.
fn evict_resolved(incidents: &mut Vec<IncidentReport>, keep: usize) {
    let resolved = incidents
        .iter()
        .filter(|i| i.status == IncidentStatus::Resolved)
        .count();
    let mut excess = resolved.saturating_sub(keep);
    if excess == 0 {
        return;
    }
    incidents.retain(|i| {
        if excess > 0 && i.status == IncidentStatus::Resolved {
            excess -= 1;
            return false;
        }
        true
    });
}

/// Hands alerts from AgentWatch to the [`AlertSystem`] without blocking the
/// alerting path.
#[derive(Clone)]
pub struct AlertForwarder {
    tx: mpsc::UnboundedSender<AnomalyAlert>,
}

impl AlertObserver for AlertForwarder {
    fn on_alert(&self, alert: &AnomalyAlert) -> ObserverResult {
        self.tx.send(alert.clone())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NotifyError;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use forgewatch_core::alerting::{default_rules, ChannelKind};
    use forgewatch_core::run_log::RunLogParams;
    use forgewatch_core::types::Timestamp;
    use forgewatch_db::MemoryStore;

    /// Records deliveries; fails every channel whose id starts with `bad`.
    #[derive(Default)]
    struct RecordingNotifier {
        delivered: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            channel: &AlertChannel,
            _alert: &AnomalyAlert,
            _incident: &IncidentReport,
        ) -> Result<(), NotifyError> {
            if channel.id.starts_with("bad") {
                return Err(NotifyError::NotConfigured(channel.id.clone()));
            }
            self.delivered.lock().unwrap().push(channel.id.clone());
            Ok(())
        }
    }

    fn channel(id: &str, severities: Vec<AlertSeverity>) -> AlertChannel {
        AlertChannel {
            id: id.into(),
            kind: ChannelKind::Console,
            enabled: true,
            severity_filter: severities,
        }
    }

    struct Harness {
        notifier: Arc<RecordingNotifier>,
        store: Arc<MemoryStore>,
        logger: Arc<RunAuditLogger>,
        bus: Arc<TelemetryBus>,
        system: Arc<AlertSystem>,
    }

    fn system_over(
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        logger: Arc<RunAuditLogger>,
        bus: Arc<TelemetryBus>,
    ) -> AlertSystem {
        let channels = vec![
            channel("console", vec![AlertSeverity::Warning, AlertSeverity::Critical]),
            channel("pager", vec![AlertSeverity::Critical]),
            channel("bad-webhook", vec![AlertSeverity::Critical]),
        ];
        AlertSystem::new(default_rules(), channels, notifier, store, logger, bus)
    }

    fn harness() -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(TelemetryBus::default());
        let logger = Arc::new(RunAuditLogger::new(store.clone(), bus.clone()));
        let system = Arc::new(system_over(
            store.clone(),
            notifier.clone(),
            logger.clone(),
            bus.clone(),
        ));
        Harness {
            notifier,
            store,
            logger,
            bus,
            system,
        }
    }

    fn alert_at(alert_type: AnomalyType, severity: AlertSeverity, at: Timestamp) -> AnomalyAlert {
        AnomalyAlert {
            alert_type,
            severity,
            message: "test".into(),
            metrics: Some(AgentMetrics {
                run_id: format!("run-{}", at.timestamp()),
                org_id: "org-1".into(),
                module_id: "m".into(),
                tokens: 0,
                cost: 0.0,
                duration_ms: 0,
                score: None,
                error_rate: 0.3,
                timeouts: 0,
                timestamp: at,
            }),
            threshold: 0.1,
            actual: 0.3,
            timestamp: at,
        }
    }

    // -----------------------------------------------------------------------
    // Cooldown and fan-out
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn repeat_inside_cooldown_is_suppressed() {
        let h = harness();
        let t0 = Utc::now();

        let first = h
            .system
            .process_alert(alert_at(AnomalyType::ErrorSpike, AlertSeverity::Critical, t0))
            .await;
        assert_matches!(first, AlertOutcome::Processed { channels_notified: 2, .. });

        let second = h
            .system
            .process_alert(alert_at(
                AnomalyType::ErrorSpike,
                AlertSeverity::Critical,
                t0 + ChronoDuration::minutes(14),
            ))
            .await;
        assert_eq!(second, AlertOutcome::Suppressed);

        let third = h
            .system
            .process_alert(alert_at(
                AnomalyType::ErrorSpike,
                AlertSeverity::Critical,
                t0 + ChronoDuration::minutes(16),
            ))
            .await;
        assert_matches!(third, AlertOutcome::Processed { .. });
    }

    #[tokio::test]
    async fn failed_channel_does_not_block_the_rest() {
        let h = harness();
        let mut rx = h.bus.subscribe();

        h.system
            .process_alert(alert_at(
                AnomalyType::TimeoutSpike,
                AlertSeverity::Critical,
                Utc::now(),
            ))
            .await;

        let mut delivered = h.notifier.delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec!["console", "pager"]);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "alert_processed");
        assert_eq!(event.payload["channels_notified"], 2);
    }

    #[tokio::test]
    async fn warnings_skip_critical_only_channels() {
        let h = harness();
        let outcome = h
            .system
            .process_alert(alert_at(AnomalyType::ScoreLow, AlertSeverity::Warning, Utc::now()))
            .await;
        assert_matches!(outcome, AlertOutcome::Processed { channels_notified: 1, .. });
    }

    // -----------------------------------------------------------------------
    // Incidents
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn repeated_alert_within_an_hour_joins_the_incident() {
        let h = harness();
        let t0 = Utc::now();

        let AlertOutcome::Processed { incident_id: first, .. } = h
            .system
            .process_alert(alert_at(AnomalyType::ErrorSpike, AlertSeverity::Critical, t0))
            .await
        else {
            panic!("first alert suppressed");
        };
        let AlertOutcome::Processed { incident_id: second, .. } = h
            .system
            .process_alert(alert_at(
                AnomalyType::ErrorSpike,
                AlertSeverity::Critical,
                t0 + ChronoDuration::minutes(30),
            ))
            .await
        else {
            panic!("second alert suppressed");
        };
        assert_eq!(first, second);

        let AlertOutcome::Processed { incident_id: third, .. } = h
            .system
            .process_alert(alert_at(
                AnomalyType::ErrorSpike,
                AlertSeverity::Critical,
                t0 + ChronoDuration::minutes(61),
            ))
            .await
        else {
            panic!("third alert suppressed");
        };
        assert_ne!(first, third);

        let incident = h.system.incident(&first).await.unwrap();
        assert_eq!(incident.affected_runs.len(), 2);
        assert_eq!(h.system.list_incidents(None).await.len(), 2);
    }

    #[tokio::test]
    async fn incident_state_machine() {
        let h = harness();
        let incident = h
            .system
            .create_or_update_incident(&alert_at(
                AnomalyType::BudgetExceeded,
                AlertSeverity::Critical,
                Utc::now(),
            ))
            .await;

        assert!(h.system.acknowledge_incident(&incident.id, "alice").await);
        assert!(!h.system.acknowledge_incident(&incident.id, "alice").await);
        assert!(
            h.system
                .resolve_incident(&incident.id, "bob", Some("raised budget".into()))
                .await
        );
        assert!(!h.system.resolve_incident(&incident.id, "bob", None).await);
        assert!(!h.system.acknowledge_incident("missing", "alice").await);

        let resolved = h.system.incident(&incident.id).await.unwrap();
        assert_eq!(resolved.status, IncidentStatus::Resolved);
        assert_eq!(resolved.resolution_notes.as_deref(), Some("raised budget"));
        assert!(h.system.active_incidents().await.is_empty());

        let stats = h.system.get_alert_statistics().await;
        assert_eq!(stats.total_incidents, 1);
        assert_eq!(stats.resolved_incidents, 1);
    }

    #[tokio::test]
    async fn incidents_are_written_through_and_reloaded() {
        let h = harness();
        let t0 = Utc::now();
        let first = h
            .system
            .create_or_update_incident(&alert_at(AnomalyType::ErrorSpike, AlertSeverity::Critical, t0))
            .await;
        h.system
            .create_or_update_incident(&alert_at(
                AnomalyType::ErrorSpike,
                AlertSeverity::Critical,
                t0 + ChronoDuration::minutes(5),
            ))
            .await;
        let second = h
            .system
            .create_or_update_incident(&alert_at(
                AnomalyType::BudgetExceeded,
                AlertSeverity::Critical,
                t0,
            ))
            .await;
        assert!(h.system.acknowledge_incident(&first.id, "alice").await);
        assert!(h.system.resolve_incident(&second.id, "bob", None).await);

        let stored = h.store.stored_incidents().await;
        assert_eq!(stored.len(), 2);
        let stored_first = stored.iter().find(|i| i.id == first.id).unwrap();
        assert_eq!(stored_first.status, IncidentStatus::Acknowledged);
        assert_eq!(stored_first.affected_runs.len(), 2);

        let restarted = system_over(
            h.store.clone(),
            h.notifier.clone(),
            h.logger.clone(),
            h.bus.clone(),
        );
        assert_eq!(restarted.load_incidents().await.unwrap(), 1);
        assert_eq!(restarted.load_incidents().await.unwrap(), 0);
        let reloaded = restarted.incident(&first.id).await.unwrap();
        assert_eq!(reloaded.actions_taken, stored_first.actions_taken);
        assert!(restarted.incident(&second.id).await.is_none());
        assert!(restarted.resolve_incident(&first.id, "bob", None).await);
    }

    #[tokio::test]
    async fn store_outage_does_not_block_incidents() {
        let h = harness();
        h.store.set_unavailable(true);
        let incident = h
            .system
            .create_or_update_incident(&alert_at(
                AnomalyType::TimeoutSpike,
                AlertSeverity::Critical,
                Utc::now(),
            ))
            .await;
        assert!(h.system.acknowledge_incident(&incident.id, "alice").await);
        assert!(h.system.load_incidents().await.is_err());
    }

    #[test]
    fn eviction_drops_oldest_resolved_only() {
        let t0 = Utc::now();
        let mut incidents: Vec<IncidentReport> = (0..4)
            .map(|i| {
                IncidentReport::open(&alert_at(
                    AnomalyType::ErrorSpike,
                    AlertSeverity::Critical,
                    t0 + ChronoDuration::hours(i),
                ))
            })
            .collect();
        for incident in incidents.iter_mut().take(3) {
            incident.resolve("ops", None, t0);
        }
        let ids: Vec<String> = incidents.iter().map(|i| i.id.clone()).collect();

        evict_resolved(&mut incidents, 1);
        let kept: Vec<&str> = incidents.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(kept, vec![ids[2].as_str(), ids[3].as_str()]);

        evict_resolved(&mut incidents, 1);
        assert_eq!(incidents.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Health check and forwarding
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn health_check_is_quiet_without_runs() {
        let h = harness();
        assert!(h.system.check_system_health().await.is_empty());
    }

    #[tokio::test]
    async fn health_check_flags_failing_runs() {
        let h = harness();
        for i in 0..4 {
            h.logger
                .log_run(RunLogParams {
                    run_id: format!("r{i}"),
                    org_id: "org-1".into(),
                    module_id: "m".into(),
                    signature_7d: "s".into(),
                    model: "gpt".into(),
                    tokens: 10,
                    cost: 0.01,
                    score: Some(40.0),
                    export_formats: vec![],
                    prompt_content: None,
                    input_content: None,
                    output_content: None,
                    duration_ms: 10,
                    error_code: Some("E_TIMEOUT".into()),
                    metadata: None,
                })
                .await;
        }

        let outcomes = h.system.check_system_health().await;
        assert_eq!(outcomes.len(), 2);

        let incidents = h.system.list_incidents(None).await;
        assert!(incidents.iter().all(|i| i.org_id == "system"));
        assert!(incidents
            .iter()
            .any(|i| i.alert_type == AnomalyType::ErrorSpike));
    }

    #[tokio::test]
    async fn forwarder_routes_alerts_to_the_system() {
        let h = harness();
        let cancel = CancellationToken::new();
        let (forwarder, rx) = AlertSystem::forwarder();
        let handle = h.system.clone().run_forwarder(rx, cancel.clone());

        forwarder
            .on_alert(&alert_at(AnomalyType::ScoreLow, AlertSeverity::Warning, Utc::now()))
            .unwrap();
        drop(forwarder);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.system.active_incidents().await.len(), 1);
    }
}
