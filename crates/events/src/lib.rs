//! Forgewatch telemetry bus and outbound delivery.
//!
//! - [`TelemetryBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`TelemetryEvent`]: the event envelope every monitor service emits.
//! - [`TelemetryPersistence`]: background task that writes every event to
//!   the telemetry store.
//! - [`delivery`]: outbound channels (generic webhook, chat webhook, email).

pub mod bus;
pub mod delivery;
pub mod persistence;

pub use bus::{TelemetryBus, TelemetryEvent};
pub use delivery::email::{EmailConfig, EmailDelivery, EmailIntent};
pub use delivery::webhook::WebhookDelivery;
pub use persistence::TelemetryPersistence;
