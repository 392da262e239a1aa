use std::sync::Arc;

use forgewatch_core::alerting::default_rules;
use forgewatch_core::anomaly::AnomalyAlert;
use forgewatch_db::store::{
    AuditRecordStore, IncidentStore, RunLogSink, RuntimeFlagStore, SecurityEventStore,
    SessionStore, StoreHealth, TelemetryStore,
};
use forgewatch_events::TelemetryBus;
use forgewatch_monitor::notifier::Notifier;
use forgewatch_monitor::security::{AnomalyDetector, CsrfProtection, RateLimiter, SessionManager};
use forgewatch_monitor::{
    AgentWatch, AlertSystem, AuditTrail, ChannelConfig, MonitorConfig, RunAuditLogger,
    RuntimeFlags,
};
use tokio::sync::mpsc;

use crate::config::ServerConfig;

/// Every persistence seam the services need, as trait objects.
#[derive(Clone)]
pub struct Stores {
    pub audit: Arc<dyn AuditRecordStore>,
    pub run_logs: Arc<dyn RunLogSink>,
    pub security_events: Arc<dyn SecurityEventStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub flags: Arc<dyn RuntimeFlagStore>,
    pub incidents: Arc<dyn IncidentStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    /// Use one backend for every seam.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: AuditRecordStore
            + RunLogSink
            + SecurityEventStore
            + SessionStore
            + RuntimeFlagStore
            + IncidentStore
            + TelemetryStore
            + StoreHealth
            + 'static,
    {
        Self {
            audit: backend.clone(),
            run_logs: backend.clone(),
            security_events: backend.clone(),
            sessions: backend.clone(),
            flags: backend.clone(),
            incidents: backend.clone(),
            telemetry: backend.clone(),
            health: backend,
        }
    }
}

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (every service is behind an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub audit: Arc<AuditTrail>,
    pub run_logger: Arc<RunAuditLogger>,
    pub agent_watch: Arc<AgentWatch>,
    pub alerts: Arc<AlertSystem>,
    pub detector: Arc<AnomalyDetector>,
    pub sessions: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfProtection>,
    pub flags: Arc<RuntimeFlags>,
    pub store_health: Arc<dyn StoreHealth>,
    /// Telemetry bus shared by every service.
    pub telemetry: Arc<TelemetryBus>,
}

impl AppState {
    /// Construct every service and connect AgentWatch to the alert system.
    ///
    /// Alerts raised by AgentWatch are queued on the returned receiver; hand
    /// it to [`AlertSystem::run_forwarder`] to process them.
    pub fn build(
        config: ServerConfig,
        monitor: &MonitorConfig,
        channels: &ChannelConfig,
        notifier: Arc<dyn Notifier>,
        stores: Stores,
        telemetry: Arc<TelemetryBus>,
    ) -> (Self, mpsc::UnboundedReceiver<AnomalyAlert>) {
        let flags = Arc::new(RuntimeFlags::new(stores.flags.clone(), monitor.agents_enabled));
        let audit = Arc::new(AuditTrail::new(
            stores.audit.clone(),
            monitor.audit_hmac_secret.as_bytes(),
        ));
        let run_logger = Arc::new(RunAuditLogger::new(
            stores.run_logs.clone(),
            telemetry.clone(),
        ));
        let agent_watch = Arc::new(AgentWatch::new(
            monitor.thresholds.clone(),
            flags.clone(),
            telemetry.clone(),
            audit.clone(),
        ));
        let alerts = Arc::new(AlertSystem::new(
            default_rules(),
            channels.channels(),
            notifier,
            stores.incidents.clone(),
            run_logger.clone(),
            telemetry.clone(),
        ));

        let (forwarder, alert_queue) = AlertSystem::forwarder();
        agent_watch.register_observer(Arc::new(forwarder));

        let rate_limiter = Arc::new(RateLimiter::new());
        let detector = Arc::new(AnomalyDetector::new(
            stores.security_events.clone(),
            rate_limiter.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(stores.sessions.clone()));
        let csrf_secret = config
            .csrf_secret
            .clone()
            .unwrap_or_else(|| monitor.audit_hmac_secret.clone());
        let csrf = Arc::new(CsrfProtection::new(csrf_secret));

        let state = Self {
            config: Arc::new(config),
            audit,
            run_logger,
            agent_watch,
            alerts,
            detector,
            sessions,
            rate_limiter,
            csrf,
            flags,
            store_health: stores.health,
            telemetry,
        };
        (state, alert_queue)
    }
}
