//! Rule-based anomaly detection over authentication events.
//!
//! Every submitted event is logged to the security event store first, so
//! windowed rules can count how many matching events a user produced
//! recently. Rules that fire yield a [`DetectedAnomaly`] and run their
//! actions.

use std::sync::Arc;

use chrono::{Duration, Utc};
use forgewatch_core::security::{
    compute_anomaly_stats, default_security_rules, event_types, AnomalyStats, AuthEvent,
    DetectedAnomaly, RuleAction, SecurityEventRecord, SecurityRule,
};
use forgewatch_core::types::Timestamp;
use forgewatch_db::store::SecurityEventStore;

use super::rate_limit::{RateLimiter, LOGIN_ENDPOINT};
use crate::error::MonitorError;

/// Widest window accepted by [`AnomalyDetector::anomaly_stats`].
pub const MAX_STATS_HOURS: i64 = 24 * 365;

pub struct AnomalyDetector {
    rules: Vec<SecurityRule>,
    events: Arc<dyn SecurityEventStore>,
    rate_limiter: Arc<RateLimiter>,
}

impl AnomalyDetector {
    pub fn new(events: Arc<dyn SecurityEventStore>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self::with_rules(default_security_rules(), events, rate_limiter)
    }

    pub fn with_rules(
        rules: Vec<SecurityRule>,
        events: Arc<dyn SecurityEventStore>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            rules,
            events,
            rate_limiter,
        }
    }

    pub fn rules(&self) -> &[SecurityRule] {
        &self.rules
    }

    /// Log `event` and evaluate every enabled rule against it.
    pub async fn analyze_event(&self, event: &AuthEvent) -> Result<Vec<DetectedAnomaly>, MonitorError> {
        let now = Utc::now();
        self.events
            .insert_event(&SecurityEventRecord::from_auth_event(event, now))
            .await?;

        let mut detected = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled && r.matches(event)) {
            if let Some(window) = rule.window {
                let since = now - window.duration();
                let count = self
                    .events
                    .list_events(&event.event_type, Some(&event.user_id), since)
                    .await?
                    .len();
                if count < window.threshold {
                    continue;
                }
            }

            let anomaly = DetectedAnomaly::new(rule, event, now);
            tracing::warn!(
                anomaly_id = %anomaly.id,
                rule_id = %rule.id,
                user_id = %event.user_id,
                severity = %anomaly.severity,
                "Security anomaly detected"
            );
            self.execute_actions(rule, &anomaly, event, now).await;
            detected.push(anomaly);
        }

        Ok(detected)
    }

    async fn execute_actions(
        &self,
        rule: &SecurityRule,
        anomaly: &DetectedAnomaly,
        event: &AuthEvent,
        now: Timestamp,
    ) {
        for action in &rule.actions {
            match action {
                RuleAction::Log => {
                    let record = SecurityEventRecord::from_anomaly(anomaly, event);
                    if let Err(e) = self.events.insert_event(&record).await {
                        tracing::error!(error = %e, anomaly_id = %anomaly.id, "Failed to log anomaly");
                    }
                }
                RuleAction::Alert => {
                    tracing::warn!(
                        anomaly_id = %anomaly.id,
                        user_id = %anomaly.user_id,
                        "SECURITY ALERT: {}",
                        anomaly.description
                    );
                }
                RuleAction::Block { minutes } => {
                    self.rate_limiter.block(
                        &event.user_id,
                        LOGIN_ENDPOINT,
                        Duration::minutes(*minutes),
                        now,
                    );
                }
                RuleAction::RequireMfa => {
                    tracing::info!(user_id = %event.user_id, "Step-up MFA required");
                }
                RuleAction::Notify { channels } => {
                    tracing::info!(
                        anomaly_id = %anomaly.id,
                        channels = ?channels,
                        "Security notification requested"
                    );
                }
            }
        }
    }

    /// Anomalies logged in the last `hours` hours, optionally for one user.
    /// `hours` is clamped to `1..=MAX_STATS_HOURS`.
    pub async fn anomaly_stats(
        &self,
        user_id: Option<&str>,
        hours: i64,
    ) -> Result<AnomalyStats, MonitorError> {
        let since = Utc::now() - Duration::hours(hours.clamp(1, MAX_STATS_HOURS));
        let events = self
            .events
            .list_events(event_types::ANOMALY_DETECTED, user_id, since)
            .await?;
        Ok(compute_anomaly_stats(&events))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use forgewatch_db::MemoryStore;
    use serde_json::{json, Map};

    fn detector() -> (Arc<MemoryStore>, Arc<RateLimiter>, AnomalyDetector) {
        let store = Arc::new(MemoryStore::new());
        let limiter = Arc::new(RateLimiter::new());
        let detector = AnomalyDetector::new(store.clone(), limiter.clone());
        (store, limiter, detector)
    }

    fn event(user: &str, event_type: &str) -> AuthEvent {
        AuthEvent {
            user_id: user.into(),
            event_type: event_type.into(),
            ip_address: Some("203.0.113.7".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fifth_failed_login_blocks_the_user() {
        let (_store, limiter, detector) = detector();

        for _ in 0..4 {
            let found = detector
                .analyze_event(&event("u1", event_types::LOGIN_FAILED))
                .await
                .unwrap();
            assert!(found.is_empty());
        }
        let found = detector
            .analyze_event(&event("u1", event_types::LOGIN_FAILED))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, "multiple_failed_logins");
        assert!(limiter.is_blocked("u1", LOGIN_ENDPOINT, Utc::now()));

        // Failures of another user are counted separately.
        let other = detector
            .analyze_event(&event("u2", event_types::LOGIN_FAILED))
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn unusual_location_needs_the_flag() {
        let (_store, _limiter, detector) = detector();

        let plain = detector
            .analyze_event(&event("u1", event_types::LOGIN_SUCCESS))
            .await
            .unwrap();
        assert!(plain.is_empty());

        let mut metadata = Map::new();
        metadata.insert("new_location".into(), json!(true));
        let flagged = AuthEvent {
            metadata,
            ..event("u1", event_types::LOGIN_SUCCESS)
        };
        let found = detector.analyze_event(&flagged).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rule_id, "unusual_location");
    }

    #[tokio::test]
    async fn logged_anomalies_feed_statistics() {
        let (_store, _limiter, detector) = detector();
        detector
            .analyze_event(&event("u1", event_types::MFA_FAILED))
            .await
            .unwrap();
        detector
            .analyze_event(&event("u2", event_types::CONCURRENT_SESSION))
            .await
            .unwrap();

        let all = detector.anomaly_stats(None, 24).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.by_severity["critical"], 1);
        assert_eq!(all.by_severity["medium"], 1);

        let one = detector.anomaly_stats(Some("u1"), 24).await.unwrap();
        assert_eq!(one.total, 1);
        assert_eq!(one.recent[0].rule_id, "mfa_bypass_attempts");
    }

    #[tokio::test]
    async fn statistics_window_is_clamped() {
        let (_, _, detector) = detector();
        let stats = detector.anomaly_stats(None, i64::MAX).await.unwrap();
        assert_eq!(stats, detector.anomaly_stats(None, 1).await.unwrap());
        detector.anomaly_stats(Some("u1"), i64::MIN).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_rules_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut rules = default_security_rules();
        for rule in &mut rules {
            rule.enabled = false;
        }
        let detector = AnomalyDetector::with_rules(rules, store, Arc::new(RateLimiter::new()));
        let found = detector
            .analyze_event(&event("u1", event_types::MFA_FAILED))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn store_outage_fails_analysis() {
        let (store, _limiter, detector) = detector();
        store.set_unavailable(true);
        assert_matches!(
            detector.analyze_event(&event("u1", event_types::LOGIN_FAILED)).await,
            Err(MonitorError::Store(_))
        );
    }
}
