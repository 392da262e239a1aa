//! PII-free run audit logger.
//!
//! Keeps a bounded in-memory ring of [`RunLogEntry`]s for querying and
//! statistics, and hands every entry to a persistence sink in the
//! background. Raw prompt, input and output text is hashed and dropped
//! before anything is stored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use forgewatch_core::run_log::{
    compute_statistics, content_hash, hourly_trend, RunLogEntry, RunLogFilter, RunLogParams,
    RunStatistics, TrendBucket,
};
use forgewatch_core::types::Timestamp;
use forgewatch_db::store::RunLogSink;
use forgewatch_events::bus::names;
use forgewatch_events::{TelemetryBus, TelemetryEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Ring capacity; the oldest entry is evicted beyond this.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// How often expired entries are swept from the ring.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: Timestamp,
    pub total_entries: usize,
    pub filter_applied: RunLogFilter,
}

/// A filtered export. Entries carry no metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogExport {
    pub metadata: ExportMetadata,
    pub entries: Vec<RunLogEntry>,
}

pub struct RunAuditLogger {
    entries: Mutex<VecDeque<RunLogEntry>>,
    capacity: usize,
    sink: Arc<dyn RunLogSink>,
    telemetry: Arc<TelemetryBus>,
}

impl RunAuditLogger {
    pub fn new(sink: Arc<dyn RunLogSink>, telemetry: Arc<TelemetryBus>) -> Self {
        Self::with_capacity(sink, telemetry, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(
        sink: Arc<dyn RunLogSink>,
        telemetry: Arc<TelemetryBus>,
        capacity: usize,
    ) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            capacity,
            sink,
            telemetry,
        }
    }

    /// Record a completed run. Never fails: persistence happens in a
    /// spawned task whose errors are only logged.
    pub async fn log_run(&self, params: RunLogParams) -> RunLogEntry {
        let entry = RunLogEntry::from_params(&params, Utc::now());

        {
            let mut entries = self.entries.lock().await;
            entries.push_back(entry.clone());
            while entries.len() > self.capacity {
                entries.pop_front();
            }
        }

        let sink = Arc::clone(&self.sink);
        let persisted = entry.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.persist(&persisted).await {
                tracing::error!(error = %e, run_id = %persisted.run_id, "Failed to persist run log");
            }
        });

        self.telemetry.publish(
            TelemetryEvent::new(names::AUDIT_LOG_CREATED).with_payload(serde_json::json!({
                "run_id": entry.run_id,
                "org_id": entry.org_id,
                "module_id": entry.module_id,
                "verdict": entry.verdict,
                "tokens": entry.tokens,
                "cost": entry.cost,
                "duration_ms": entry.duration_ms,
            })),
        );

        tracing::info!(
            run_id = %entry.run_id,
            verdict = %entry.verdict,
            tokens = entry.tokens,
            cost = entry.cost,
            "Logged run"
        );
        entry
    }

    pub async fn query_logs(&self, filter: &RunLogFilter) -> Vec<RunLogEntry> {
        filter.apply(self.entries.lock().await.iter())
    }

    pub async fn get_statistics(&self, filter: &RunLogFilter) -> RunStatistics {
        compute_statistics(&self.query_logs(filter).await)
    }

    /// `false` if the run is unknown or the content does not hash to the
    /// recorded value.
    pub async fn verify_content_integrity(
        &self,
        run_id: &str,
        prompt: Option<&str>,
        input: Option<&str>,
        output: Option<&str>,
    ) -> bool {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .rev()
            .find(|e| e.run_id == run_id)
            .is_some_and(|e| e.content_hash == content_hash(prompt, input, output))
    }

    /// Drop entries older than `cutoff`, returning how many were removed.
    pub async fn prune_older_than(&self, cutoff: Timestamp) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        before - entries.len()
    }

    pub async fn export_logs(&self, filter: &RunLogFilter) -> RunLogExport {
        let entries: Vec<RunLogEntry> = self
            .query_logs(filter)
            .await
            .into_iter()
            .map(|mut e| {
                e.metadata = None;
                e
            })
            .collect();

        RunLogExport {
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                total_entries: entries.len(),
                filter_applied: filter.clone(),
            },
            entries,
        }
    }

    pub async fn logs_trend(&self, hours: u32) -> Vec<TrendBucket> {
        let entries = self.entries.lock().await;
        let snapshot: Vec<RunLogEntry> = entries.iter().cloned().collect();
        drop(entries);
        hourly_trend(&snapshot, Utc::now(), hours)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Sweep entries older than `retention` every [`PRUNE_INTERVAL`] until
    /// `cancel` fires.
    pub async fn run_pruning(&self, retention: chrono::Duration, cancel: CancellationToken) {
        tracing::info!(
            retention_hours = retention.num_hours(),
            interval_secs = PRUNE_INTERVAL.as_secs(),
            "Run log retention job started"
        );

        let mut interval = tokio::time::interval(PRUNE_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Run log retention job stopping");
                    break;
                }
                _ = interval.tick() => {
                    let removed = self.prune_older_than(Utc::now() - retention).await;
                    if removed > 0 {
                        tracing::info!(removed, "Run log retention: pruned old entries");
                    } else {
                        tracing::debug!("Run log retention: nothing to prune");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use forgewatch_core::run_log::Verdict;
    use forgewatch_db::MemoryStore;
    use serde_json::json;

    fn logger(capacity: usize) -> (Arc<MemoryStore>, Arc<TelemetryBus>, RunAuditLogger) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(TelemetryBus::default());
        let logger = RunAuditLogger::with_capacity(store.clone(), bus.clone(), capacity);
        (store, bus, logger)
    }

    fn params(run: &str, module: &str, score: Option<f64>) -> RunLogParams {
        RunLogParams {
            run_id: run.into(),
            org_id: "org-1".into(),
            module_id: module.into(),
            signature_7d: "sig".into(),
            model: "gpt-4o".into(),
            tokens: 1200,
            cost: 0.03,
            score,
            export_formats: vec!["md".into()],
            prompt_content: Some("write a haiku".into()),
            input_content: Some("about rust".into()),
            output_content: Some("borrowed, never owned".into()),
            duration_ms: 800,
            error_code: None,
            metadata: Some(json!({"browser": "firefox", "email": "a@b.c"})),
        }
    }

    #[tokio::test]
    async fn log_run_strips_content_and_unknown_metadata() {
        let (store, bus, logger) = logger(10);
        let mut rx = bus.subscribe();

        let entry = logger.log_run(params("r1", "m1", Some(85.0))).await;
        assert_eq!(entry.verdict, Verdict::Pass);
        let metadata = entry.metadata.as_ref().unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata["browser"], "firefox");

        let serialized = serde_json::to_string(&entry).unwrap();
        assert!(!serialized.contains("haiku"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, "audit_log_created");
        assert_eq!(event.payload["verdict"], "pass");

        // Persistence runs in a spawned task.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(store.persisted_run_logs().await.len(), 1);
    }

    #[tokio::test]
    async fn sink_failure_does_not_fail_logging() {
        let (store, _bus, logger) = logger(10);
        store.set_unavailable(true);
        logger.log_run(params("r1", "m1", None)).await;
        assert_eq!(logger.len().await, 1);
    }

    #[tokio::test]
    async fn ring_evicts_oldest() {
        let (_store, _bus, logger) = logger(3);
        for i in 0..5 {
            logger.log_run(params(&format!("r{i}"), "m", Some(90.0))).await;
        }
        let runs: Vec<String> = logger
            .query_logs(&RunLogFilter::default())
            .await
            .into_iter()
            .map(|e| e.run_id)
            .collect();
        assert_eq!(runs.len(), 3);
        assert!(!runs.contains(&"r0".to_string()));
        assert!(!runs.contains(&"r1".to_string()));
    }

    #[tokio::test]
    async fn content_integrity_round_trip() {
        let (_store, _bus, logger) = logger(10);
        logger.log_run(params("r1", "m1", Some(70.0))).await;

        assert!(
            logger
                .verify_content_integrity(
                    "r1",
                    Some("write a haiku"),
                    Some("about rust"),
                    Some("borrowed, never owned")
                )
                .await
        );
        assert!(
            !logger
                .verify_content_integrity("r1", Some("write a haiku"), None, None)
                .await
        );
        assert!(!logger.verify_content_integrity("nope", None, None, None).await);
    }

    #[tokio::test]
    async fn prune_and_export() {
        let (_store, _bus, logger) = logger(10);
        logger.log_run(params("r1", "m1", Some(50.0))).await;
        logger.log_run(params("r2", "m2", Some(95.0))).await;

        let export = logger
            .export_logs(&RunLogFilter {
                module_id: Some("m2".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(export.metadata.total_entries, 1);
        assert!(export.entries[0].metadata.is_none());

        assert_eq!(logger.prune_older_than(Utc::now() - chrono::Duration::hours(1)).await, 0);
        assert_eq!(logger.prune_older_than(Utc::now() + chrono::Duration::seconds(1)).await, 2);
        assert!(logger.is_empty().await);
    }

    #[tokio::test]
    async fn statistics_over_the_ring() {
        let (_store, _bus, logger) = logger(10);
        logger.log_run(params("r1", "m1", Some(90.0))).await;
        logger.log_run(params("r2", "m1", Some(65.0))).await;
        logger.log_run(params("r3", "m2", None)).await;

        let stats = logger.get_statistics(&RunLogFilter::default()).await;
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.top_modules[0].module_id, "m1");
        assert_eq!(stats.verdict_distribution["fail"], 1);

        let trend = logger.logs_trend(2).await;
        assert_eq!(trend.len(), 2);
    }
}
