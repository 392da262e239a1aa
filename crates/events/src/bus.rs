//! In-process telemetry bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`TelemetryBus`] is shared via `Arc<TelemetryBus>` across the monitor
//! services. Publishing never fails; events published while nobody is
//! subscribed are dropped.

use chrono::Utc;
use forgewatch_core::types::{Timestamp, SYSTEM_ORG};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Names of the telemetry events emitted by the monitor services.
pub mod names {
    pub const AUDIT_LOG_CREATED: &str = "audit_log_created";
    pub const AGENT_METRICS_RECORDED: &str = "agent_metrics_recorded";
    pub const AGENT_ALERT: &str = "agent_alert";
    pub const DEGRADATION_MODE_ENABLED: &str = "degradation_mode_enabled";
    pub const DEGRADATION_MODE_DISABLED: &str = "degradation_mode_disabled";
    pub const KILL_SWITCH_ACTIVATED: &str = "kill_switch_activated";
    pub const AGENTS_REENABLED: &str = "agents_reenabled";
    pub const ALERT_PROCESSED: &str = "alert_processed";
    pub const INCIDENT_ACKNOWLEDGED: &str = "incident_acknowledged";
    pub const INCIDENT_RESOLVED: &str = "incident_resolved";
}

// ---------------------------------------------------------------------------
// TelemetryEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `"agent_alert"`.
    pub event: String,
    pub org_id: String,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

impl TelemetryEvent {
    /// New event attributed to the `system` organization with an empty
    /// payload.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            org_id: SYSTEM_ORG.to_string(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn for_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = org_id.into();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// TelemetryBus
// ---------------------------------------------------------------------------

const DEFAULT_CAPACITY: usize = 1024;

pub struct TelemetryBus {
    sender: broadcast::Sender<TelemetryEvent>,
}

impl TelemetryBus {
    /// When the buffer is full the oldest events are dropped and slow
    /// receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: TelemetryEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.sender.subscribe()
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
