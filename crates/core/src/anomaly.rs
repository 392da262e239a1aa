//! Agent run metrics and the anomaly rules evaluated over them.
//!
//! Pure logic; the buffering, observers and kill-switch side effects live
//! in `forgewatch_monitor::agent_watch`.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::{Timestamp, SYSTEM_ORG};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Resource usage and outcome of a single agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub run_id: String,
    pub org_id: String,
    pub module_id: String,
    pub tokens: u64,
    pub cost: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub score: Option<f64>,
    /// Fraction of failed calls within the run, 0.0 to 1.0.
    pub error_rate: f64,
    pub timeouts: u32,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    BudgetExceeded,
    ScoreLow,
    ErrorSpike,
    TimeoutSpike,
    /// Synthetic notice sent to observers when the kill-switch trips.
    KillSwitch,
}

impl AnomalyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget_exceeded",
            Self::ScoreLow => "score_low",
            Self::ErrorSpike => "error_spike",
            Self::TimeoutSpike => "timeout_spike",
            Self::KillSwitch => "kill_switch",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    #[serde(rename = "type")]
    pub alert_type: AnomalyType,
    pub severity: AlertSeverity,
    pub message: String,
    /// Sample that triggered the alert. Absent only for a kill-switch notice
    /// raised without any buffered sample.
    pub metrics: Option<AgentMetrics>,
    pub threshold: f64,
    pub actual: f64,
    pub timestamp: Timestamp,
}

impl AnomalyAlert {
    /// Organization the alert belongs to; `system` when no sample is attached.
    pub fn org_id(&self) -> &str {
        self.metrics.as_ref().map_or(SYSTEM_ORG, |m| m.org_id.as_str())
    }

    pub fn run_id(&self) -> Option<&str> {
        self.metrics.as_ref().map(|m| m.run_id.as_str())
    }

    pub fn is_critical(&self) -> bool {
        self.severity == AlertSeverity::Critical
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Per-run budgets and quality floors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyThresholds {
    pub max_tokens: u64,
    pub max_cost: f64,
    /// Not an alert trigger; counted as slow runs in the metrics summary.
    pub max_duration_ms: u64,
    pub min_score: f64,
    pub max_error_rate: f64,
    pub max_timeouts: u32,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            max_tokens: 12_000,
            max_cost: 1.5,
            max_duration_ms: 20_000,
            min_score: 80.0,
            max_error_rate: 0.05,
            max_timeouts: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Immediate checks
// ---------------------------------------------------------------------------

/// Check one sample against the per-run budgets. Comparisons are strict; a
/// value equal to its threshold never alerts. One alert per violated rule.
pub fn check_immediate(
    metrics: &AgentMetrics,
    thresholds: &AnomalyThresholds,
    now: Timestamp,
) -> Vec<AnomalyAlert> {
    let mut alerts = Vec::new();
    let mut push = |alert_type, severity, message: String, threshold: f64, actual: f64| {
        alerts.push(AnomalyAlert {
            alert_type,
            severity,
            message,
            metrics: Some(metrics.clone()),
            threshold,
            actual,
            timestamp: now,
        });
    };

    if metrics.tokens > thresholds.max_tokens {
        push(
            AnomalyType::BudgetExceeded,
            AlertSeverity::Critical,
            format!("Token budget exceeded: {} > {}", metrics.tokens, thresholds.max_tokens),
            thresholds.max_tokens as f64,
            metrics.tokens as f64,
        );
    }

    if metrics.cost > thresholds.max_cost {
        push(
            AnomalyType::BudgetExceeded,
            AlertSeverity::Critical,
            format!("Cost budget exceeded: ${} > ${}", metrics.cost, thresholds.max_cost),
            thresholds.max_cost,
            metrics.cost,
        );
    }

    if let Some(score) = metrics.score.filter(|s| *s < thresholds.min_score) {
        push(
            AnomalyType::ScoreLow,
            AlertSeverity::Warning,
            format!("Score below threshold: {score} < {}", thresholds.min_score),
            thresholds.min_score,
            score,
        );
    }

    if metrics.timeouts > thresholds.max_timeouts {
        push(
            AnomalyType::TimeoutSpike,
            AlertSeverity::Critical,
            format!(
                "Timeout count exceeded: {} > {}",
                metrics.timeouts, thresholds.max_timeouts
            ),
            thresholds.max_timeouts as f64,
            metrics.timeouts as f64,
        );
    }

    alerts
}

// ---------------------------------------------------------------------------
// Windowed analysis
// ---------------------------------------------------------------------------

/// Width of the window examined by [`analyze_window`].
pub fn analysis_window() -> Duration {
    Duration::minutes(5)
}

/// Share of low-scoring samples in a window above which a trend alert fires.
pub const LOW_SCORE_RATIO: f64 = 0.3;

/// Samples whose timestamp falls within `window` before `now`.
pub fn samples_within<'a>(
    samples: &'a [AgentMetrics],
    now: Timestamp,
    window: Duration,
) -> Vec<&'a AgentMetrics> {
    let since = now - window;
    samples.iter().filter(|m| m.timestamp > since).collect()
}

/// Evaluate trend rules over the samples of the last five minutes.
pub fn analyze_window(
    samples: &[AgentMetrics],
    thresholds: &AnomalyThresholds,
    now: Timestamp,
) -> Vec<AnomalyAlert> {
    let recent = samples_within(samples, now, analysis_window());
    let Some(latest) = recent.last() else {
        return Vec::new();
    };

    let mut alerts = Vec::new();
    let n = recent.len() as f64;

    let avg_error_rate = recent.iter().map(|m| m.error_rate).sum::<f64>() / n;
    if avg_error_rate > thresholds.max_error_rate {
        alerts.push(AnomalyAlert {
            alert_type: AnomalyType::ErrorSpike,
            severity: AlertSeverity::Critical,
            message: format!(
                "Error rate spike detected: {:.2}% > {:.2}%",
                avg_error_rate * 100.0,
                thresholds.max_error_rate * 100.0
            ),
            metrics: Some((*latest).clone()),
            threshold: thresholds.max_error_rate,
            actual: avg_error_rate,
            timestamp: now,
        });
    }

    let scores: Vec<f64> = recent.iter().filter_map(|m| m.score).collect();
    let low = scores.iter().filter(|s| **s < thresholds.min_score).count();
    if low as f64 > n * LOW_SCORE_RATIO {
        let avg_score = scores.iter().sum::<f64>() / scores.len() as f64;
        alerts.push(AnomalyAlert {
            alert_type: AnomalyType::ScoreLow,
            severity: AlertSeverity::Warning,
            message: format!(
                "Consistent low scores detected: {low}/{} runs below {}",
                recent.len(),
                thresholds.min_score
            ),
            metrics: Some((*latest).clone()),
            threshold: thresholds.min_score,
            actual: avg_score,
            timestamp: now,
        });
    }

    alerts
}

// ---------------------------------------------------------------------------
// Critical response tiering
// ---------------------------------------------------------------------------

/// Error rate above which an error spike trips the kill-switch instead of
/// degrading to simulation.
pub const KILL_SWITCH_ERROR_RATE: f64 = 0.20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CriticalResponse {
    Degrade,
    KillSwitch { reason: String },
}

/// Decide how to react to a critical alert.
pub fn critical_response(alert: &AnomalyAlert) -> CriticalResponse {
    match alert.alert_type {
        AnomalyType::ErrorSpike if alert.actual > KILL_SWITCH_ERROR_RATE => {
            CriticalResponse::KillSwitch {
                reason: format!("High error rate detected: {:.2}%", alert.actual * 100.0),
            }
        }
        _ => CriticalResponse::Degrade,
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Samples currently buffered.
    pub total_runs: usize,
    pub avg_tokens: f64,
    pub avg_cost: f64,
    pub avg_score: f64,
    pub error_rate: f64,
    pub degradation_mode: bool,
    /// Samples in the last hour over the token or cost budget or under the
    /// score floor.
    pub recent_alerts: usize,
    /// Samples in the last hour slower than the duration budget.
    pub slow_runs: usize,
}

/// Summarise the last hour of samples. Averages of empty sets are zero.
pub fn summarize(
    samples: &[AgentMetrics],
    thresholds: &AnomalyThresholds,
    degradation_mode: bool,
    now: Timestamp,
) -> MetricsSummary {
    let recent = samples_within(samples, now, Duration::hours(1));
    let n = recent.len().max(1) as f64;
    let scores: Vec<f64> = recent.iter().filter_map(|m| m.score).collect();

    MetricsSummary {
        total_runs: samples.len(),
        avg_tokens: recent.iter().map(|m| m.tokens as f64).sum::<f64>() / n,
        avg_cost: recent.iter().map(|m| m.cost).sum::<f64>() / n,
        avg_score: scores.iter().sum::<f64>() / scores.len().max(1) as f64,
        error_rate: recent.iter().map(|m| m.error_rate).sum::<f64>() / n,
        degradation_mode,
        recent_alerts: recent
            .iter()
            .filter(|m| {
                m.tokens > thresholds.max_tokens
                    || m.cost > thresholds.max_cost
                    || m.score.is_some_and(|s| s < thresholds.min_score)
            })
            .count(),
        slow_runs: recent
            .iter()
            .filter(|m| m.duration_ms > thresholds.max_duration_ms)
            .count(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
