//! Durable telemetry persistence.
//!
//! [`TelemetryPersistence`] subscribes to the [`TelemetryBus`](crate::bus::TelemetryBus)
//! and writes every event to the telemetry store. Write failures are logged
//! and the loop continues; it exits once the bus is dropped.

use std::sync::Arc;

use forgewatch_db::store::TelemetryStore;
use tokio::sync::broadcast;

use crate::bus::TelemetryEvent;

pub struct TelemetryPersistence;

impl TelemetryPersistence {
    pub async fn run(
        store: Arc<dyn TelemetryStore>,
        mut receiver: broadcast::Receiver<TelemetryEvent>,
    ) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = store
                        .insert_telemetry(&event.event, &event.org_id, &event.payload, event.timestamp)
                        .await
                    {
                        tracing::error!(
                            error = %e,
                            event = %event.event,
                            "Failed to persist telemetry event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Telemetry persistence lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Telemetry bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }
}
