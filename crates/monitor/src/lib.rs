//! Stateful monitoring services for forgewatch.
//!
//! Every service is constructed explicitly and shared as an `Arc` handle:
//!
//! - [`AuditTrail`]: hash-chained, HMAC-signed audit records per organization.
//! - [`RunAuditLogger`]: PII-free run log ring with statistics and a
//!   persistence sink.
//! - [`AgentWatch`]: per-run budget checks, windowed trend analysis,
//!   degradation and kill-switch control.
//! - [`AlertSystem`]: cooldown-gated alert routing, incidents and channel
//!   fan-out.
//! - [`security`]: auth-side anomaly detection, sessions, rate limiting and
//!   CSRF tokens.

pub mod agent_watch;
pub mod alert_system;
pub mod audit_trail;
pub mod config;
pub mod error;
pub mod flags;
pub mod notifier;
pub mod run_logger;
pub mod security;

pub use agent_watch::{AgentWatch, AlertObserver};
pub use alert_system::{AlertOutcome, AlertSystem};
pub use audit_trail::AuditTrail;
pub use config::{ChannelConfig, MonitorConfig};
pub use error::MonitorError;
pub use flags::RuntimeFlags;
pub use run_logger::RunAuditLogger;
