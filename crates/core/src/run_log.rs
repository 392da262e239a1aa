//! PII-free run log entries: verdicts, content hashes, metadata
//! sanitization and aggregate statistics.
//!
//! Raw prompt, input and output text is only ever hashed here; it never
//! reaches a [`RunLogEntry`].

use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hashing;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Minimum score for a `pass` verdict.
pub const PASS_SCORE: f64 = 80.0;

/// Minimum score for a `partial_pass` verdict.
pub const PARTIAL_PASS_SCORE: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    PartialPass,
    Fail,
}

impl Verdict {
    /// Classify a run score. A run without a score fails.
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            Some(s) if s >= PASS_SCORE => Self::Pass,
            Some(s) if s >= PARTIAL_PASS_SCORE => Self::PartialPass,
            _ => Self::Fail,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::PartialPass => "partial_pass",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Content hashing
// ---------------------------------------------------------------------------

/// SHA-256 hex of `prompt|input|output`, missing parts treated as empty.
pub fn content_hash(prompt: Option<&str>, input: Option<&str>, output: Option<&str>) -> String {
    let combined = [
        prompt.unwrap_or(""),
        input.unwrap_or(""),
        output.unwrap_or(""),
    ]
    .join("|");
    hashing::sha256_hex(combined.as_bytes())
}

// ---------------------------------------------------------------------------
// Metadata sanitization
// ---------------------------------------------------------------------------

/// Metadata keys that may be stored with a run. Everything else is dropped.
pub const ALLOWED_METADATA_FIELDS: &[&str] = &[
    "version",
    "tier",
    "feature_flags",
    "experiment_id",
    "ab_test_variant",
    "browser",
    "os",
    "device_type",
    "screen_resolution",
    "timezone",
    "request_id",
    "trace_id",
    "parent_span_id",
    "sampling_rate",
];

/// Longest string value kept verbatim; longer values are truncated.
pub const MAX_METADATA_STRING_CHARS: usize = 200;

/// Replacement for nested object and array values.
pub const COMPLEX_VALUE_PLACEHOLDER: &str = "[object]";

/// Keep only allow-listed keys, truncate long strings and flatten complex
/// values. Returns `None` when nothing survives.
pub fn sanitize_metadata(metadata: Option<&Value>) -> Option<Map<String, Value>> {
    let map = metadata?.as_object()?;
    let mut sanitized = Map::new();

    for (key, value) in map {
        if !ALLOWED_METADATA_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let cleaned = match value {
            Value::String(s) if s.chars().count() > MAX_METADATA_STRING_CHARS => {
                let truncated: String = s.chars().take(MAX_METADATA_STRING_CHARS).collect();
                Value::String(format!("{truncated}..."))
            }
            Value::Object(_) | Value::Array(_) => {
                Value::String(COMPLEX_VALUE_PLACEHOLDER.to_string())
            }
            other => other.clone(),
        };
        sanitized.insert(key.clone(), cleaned);
    }

    (!sanitized.is_empty()).then_some(sanitized)
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Parameters of a completed run as reported by the execution layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLogParams {
    pub run_id: String,
    pub org_id: String,
    pub module_id: String,
    pub signature_7d: String,
    pub model: String,
    pub tokens: u64,
    pub cost: f64,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub export_formats: Vec<String>,
    #[serde(default)]
    pub prompt_content: Option<String>,
    #[serde(default)]
    pub input_content: Option<String>,
    #[serde(default)]
    pub output_content: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A stored run summary. Contains no raw content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: String,
    pub org_id: String,
    pub module_id: String,
    pub signature_7d: String,
    pub model: String,
    pub tokens: u64,
    pub cost: f64,
    pub verdict: Verdict,
    pub export_formats: Vec<String>,
    pub content_hash: String,
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl RunLogEntry {
    /// Build an entry from run parameters, hashing and discarding raw content.
    pub fn from_params(params: &RunLogParams, timestamp: Timestamp) -> Self {
        Self {
            run_id: params.run_id.clone(),
            org_id: params.org_id.clone(),
            module_id: params.module_id.clone(),
            signature_7d: params.signature_7d.clone(),
            model: params.model.clone(),
            tokens: params.tokens,
            cost: params.cost,
            verdict: Verdict::from_score(params.score),
            export_formats: params.export_formats.clone(),
            content_hash: content_hash(
                params.prompt_content.as_deref(),
                params.input_content.as_deref(),
                params.output_content.as_deref(),
            ),
            timestamp,
            duration_ms: params.duration_ms,
            error_code: params.error_code.clone(),
            metadata: sanitize_metadata(params.metadata.as_ref()),
        }
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLogFilter {
    pub org_id: Option<String>,
    pub module_id: Option<String>,
    pub verdict: Option<Verdict>,
    /// Inclusive lower bound.
    pub date_from: Option<Timestamp>,
    /// Inclusive upper bound.
    pub date_to: Option<Timestamp>,
    /// Applied only when greater than zero.
    pub limit: Option<usize>,
}

impl RunLogFilter {
    pub fn matches(&self, entry: &RunLogEntry) -> bool {
        self.org_id.as_ref().is_none_or(|o| *o == entry.org_id)
            && self.module_id.as_ref().is_none_or(|m| *m == entry.module_id)
            && self.verdict.is_none_or(|v| v == entry.verdict)
            && self.date_from.is_none_or(|from| entry.timestamp >= from)
            && self.date_to.is_none_or(|to| entry.timestamp <= to)
    }

    /// Filter, sort newest first and apply the limit.
    pub fn apply<'a>(&self, entries: impl IntoIterator<Item = &'a RunLogEntry>) -> Vec<RunLogEntry> {
        let mut matched: Vec<RunLogEntry> = entries
            .into_iter()
            .filter(|e| self.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            matched.truncate(limit);
        }
        matched
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleCount {
    pub module_id: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostDistribution {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_runs: usize,
    /// Percentage (0-100) of runs with a `pass` verdict.
    pub pass_rate: f64,
    pub avg_tokens: f64,
    pub avg_cost: f64,
    pub avg_duration_ms: f64,
    /// Percentage (0-100) of runs that carry an error code.
    pub error_rate: f64,
    pub top_modules: Vec<ModuleCount>,
    pub verdict_distribution: BTreeMap<String, usize>,
    pub cost_distribution: CostDistribution,
}

/// Number of modules reported in [`RunStatistics::top_modules`].
pub const TOP_MODULES: usize = 10;

/// Linear-interpolated percentile of an ascending slice. `pct` is 0-100.
pub fn percentile(sorted: &[f64], pct: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (pct / 100.0) * (n - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            let weight = rank - lower as f64;
            sorted[lower] * (1.0 - weight) + sorted[upper] * weight
        }
    }
}

pub fn compute_statistics(entries: &[RunLogEntry]) -> RunStatistics {
    if entries.is_empty() {
        return RunStatistics::default();
    }

    let total = entries.len();
    let n = total as f64;
    let passed = entries.iter().filter(|e| e.verdict == Verdict::Pass).count();
    let errored = entries.iter().filter(|e| e.error_code.is_some()).count();

    let mut module_counts: HashMap<&str, usize> = HashMap::new();
    let mut verdict_distribution = BTreeMap::new();
    for e in entries {
        *module_counts.entry(e.module_id.as_str()).or_default() += 1;
        *verdict_distribution
            .entry(e.verdict.as_str().to_string())
            .or_default() += 1;
    }

    let mut top_modules: Vec<ModuleCount> = module_counts
        .into_iter()
        .map(|(module_id, count)| ModuleCount {
            module_id: module_id.to_string(),
            count,
        })
        .collect();
    top_modules.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module_id.cmp(&b.module_id)));
    top_modules.truncate(TOP_MODULES);

    let mut costs: Vec<f64> = entries.iter().map(|e| e.cost).collect();
    costs.sort_by(f64::total_cmp);

    RunStatistics {
        total_runs: total,
        pass_rate: passed as f64 / n * 100.0,
        avg_tokens: entries.iter().map(|e| e.tokens as f64).sum::<f64>() / n,
        avg_cost: costs.iter().sum::<f64>() / n,
        avg_duration_ms: entries.iter().map(|e| e.duration_ms as f64).sum::<f64>() / n,
        error_rate: errored as f64 / n * 100.0,
        top_modules,
        verdict_distribution,
        cost_distribution: CostDistribution {
            p50: percentile(&costs, 50.0),
            p95: percentile(&costs, 95.0),
            p99: percentile(&costs, 99.0),
        },
    }
}

// ---------------------------------------------------------------------------
// Hourly trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendBucket {
    /// Bucket start formatted as `YYYY-MM-DDTHH:00`.
    pub hour: String,
    pub count: usize,
    pub pass_rate: f64,
}

/// One bucket per hour for the `hours` hours ending at `now`, oldest first.
/// Bucket `i` covers `[now - (hours - i) h, now - (hours - i - 1) h)`.
pub fn hourly_trend(entries: &[RunLogEntry], now: Timestamp, hours: u32) -> Vec<TrendBucket> {
    (0..hours)
        .rev()
        .map(|i| {
            let end = now - Duration::hours(i as i64);
            let start = end - Duration::hours(1);
            let in_bucket: Vec<&RunLogEntry> = entries
                .iter()
                .filter(|e| e.timestamp >= start && e.timestamp < end)
                .collect();
            let passed = in_bucket.iter().filter(|e| e.verdict == Verdict::Pass).count();
            let pass_rate = if in_bucket.is_empty() {
                0.0
            } else {
                passed as f64 / in_bucket.len() as f64 * 100.0
            };
            TrendBucket {
                hour: start.format("%Y-%m-%dT%H:00").to_string(),
                count: in_bucket.len(),
                pass_rate,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn ts(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, minute, 0).unwrap()
    }

    fn entry(run: &str, module: &str, score: Option<f64>, cost: f64, at: Timestamp) -> RunLogEntry {
        let params = RunLogParams {
            run_id: run.into(),
            org_id: "org-1".into(),
            module_id: module.into(),
            tokens: 100,
            cost,
            score,
            duration_ms: 1000,
            ..Default::default()
        };
        RunLogEntry::from_params(&params, at)
    }

    // -----------------------------------------------------------------------
    // Verdicts
    // -----------------------------------------------------------------------

    #[test]
    fn verdict_boundaries() {
        assert_eq!(Verdict::from_score(Some(80.0)), Verdict::Pass);
        assert_eq!(Verdict::from_score(Some(79.999)), Verdict::PartialPass);
        assert_eq!(Verdict::from_score(Some(60.0)), Verdict::PartialPass);
        assert_eq!(Verdict::from_score(Some(59.999)), Verdict::Fail);
        assert_eq!(Verdict::from_score(None), Verdict::Fail);
    }

    #[test]
    fn verdict_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Verdict::PartialPass).unwrap(), json!("partial_pass"));
    }

    // -----------------------------------------------------------------------
    // Content hash
    // -----------------------------------------------------------------------

    #[test]
    fn content_hash_treats_missing_as_empty() {
        assert_eq!(
            content_hash(None, None, None),
            hashing::sha256_hex(b"||")
        );
        assert_eq!(
            content_hash(Some("p"), None, Some("o")),
            hashing::sha256_hex(b"p||o")
        );
    }

    #[test]
    fn content_hash_changes_with_any_part() {
        let base = content_hash(Some("p"), Some("i"), Some("o"));
        assert_ne!(base, content_hash(Some("p"), Some("i"), Some("o2")));
        assert_ne!(base, content_hash(Some("p2"), Some("i"), Some("o")));
    }

    // -----------------------------------------------------------------------
    // Metadata sanitization
    // -----------------------------------------------------------------------

    #[test]
    fn sanitize_drops_unlisted_keys_and_flattens_objects() {
        let meta = json!({
            "version": "1.2",
            "email": "someone@example.com",
            "feature_flags": {"a": true},
            "sampling_rate": 0.5,
        });
        let out = sanitize_metadata(Some(&meta)).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out["version"], json!("1.2"));
        assert_eq!(out["feature_flags"], json!("[object]"));
        assert_eq!(out["sampling_rate"], json!(0.5));
        assert!(!out.contains_key("email"));
    }

    #[test]
    fn sanitize_truncates_long_strings() {
        let long = "x".repeat(250);
        let out = sanitize_metadata(Some(&json!({"trace_id": long}))).unwrap();
        let kept = out["trace_id"].as_str().unwrap();
        assert_eq!(kept.len(), 203);
        assert!(kept.ends_with("..."));
    }

    #[test]
    fn sanitize_returns_none_when_nothing_survives() {
        assert_eq!(sanitize_metadata(None), None);
        assert_eq!(sanitize_metadata(Some(&json!({"name": "Ada"}))), None);
    }

    // -----------------------------------------------------------------------
    // Filtering
    // -----------------------------------------------------------------------

    #[test]
    fn filter_is_inclusive_and_sorted_newest_first() {
        let entries = vec![
            entry("a", "m1", Some(90.0), 0.1, ts(0)),
            entry("b", "m1", Some(90.0), 0.1, ts(10)),
            entry("c", "m2", Some(10.0), 0.1, ts(20)),
        ];
        let filter = RunLogFilter {
            date_from: Some(ts(0)),
            date_to: Some(ts(10)),
            ..Default::default()
        };
        let out = filter.apply(&entries);
        let ids: Vec<_> = out.iter().map(|e| e.run_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn zero_limit_is_ignored() {
        let entries = vec![
            entry("a", "m1", None, 0.1, ts(0)),
            entry("b", "m1", None, 0.1, ts(1)),
        ];
        let unlimited = RunLogFilter { limit: Some(0), ..Default::default() };
        assert_eq!(unlimited.apply(&entries).len(), 2);
        let limited = RunLogFilter { limit: Some(1), ..Default::default() };
        assert_eq!(limited.apply(&entries)[0].run_id, "b");
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    #[test]
    fn empty_statistics_are_zero() {
        let stats = compute_statistics(&[]);
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.pass_rate, 0.0);
        assert!(stats.top_modules.is_empty());
        assert!(stats.verdict_distribution.is_empty());
        assert_eq!(stats.cost_distribution, CostDistribution::default());
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 50.0), 3.0);
        assert!((percentile(&sorted, 95.0) - 4.8).abs() < 1e-9);
        assert_eq!(percentile(&[], 99.0), 0.0);
        assert_eq!(percentile(&[7.0], 99.0), 7.0);
    }

    #[test]
    fn statistics_aggregate_entries() {
        let mut errored = entry("c", "m2", None, 0.3, ts(2));
        errored.error_code = Some("timeout".into());
        let entries = vec![
            entry("a", "m1", Some(95.0), 0.1, ts(0)),
            entry("b", "m1", Some(70.0), 0.2, ts(1)),
            errored,
            entry("d", "m1", Some(85.0), 0.4, ts(3)),
        ];
        let stats = compute_statistics(&entries);
        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.pass_rate, 50.0);
        assert_eq!(stats.error_rate, 25.0);
        assert_eq!(stats.avg_tokens, 100.0);
        assert!((stats.avg_cost - 0.25).abs() < 1e-9);
        assert_eq!(stats.top_modules[0], ModuleCount { module_id: "m1".into(), count: 3 });
        assert_eq!(stats.verdict_distribution["pass"], 2);
        assert_eq!(stats.verdict_distribution["partial_pass"], 1);
        assert_eq!(stats.verdict_distribution["fail"], 1);
        assert!((stats.cost_distribution.p50 - 0.25).abs() < 1e-9);
    }

    // -----------------------------------------------------------------------
    // Trend
    // -----------------------------------------------------------------------

    #[test]
    fn trend_buckets_end_at_now() {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        let entries = vec![
            entry("a", "m", Some(90.0), 0.1, now - Duration::minutes(30)),
            entry("b", "m", Some(10.0), 0.1, now - Duration::minutes(45)),
            entry("c", "m", Some(90.0), 0.1, now - Duration::minutes(90)),
        ];
        let trend = hourly_trend(&entries, now, 3);
        assert_eq!(trend.len(), 3);
        assert_eq!(trend[2].hour, "2026-05-04T11:00");
        assert_eq!(trend[2].count, 2);
        assert_eq!(trend[2].pass_rate, 50.0);
        assert_eq!(trend[1].count, 1);
        assert_eq!(trend[0].count, 0);
    }
}
