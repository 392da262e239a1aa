//! Postgres store round trips. Require a live database via `DATABASE_URL`.

use chrono::Utc;
use forgewatch_core::anomaly::{AlertSeverity, AnomalyAlert, AnomalyType};
use forgewatch_core::audit::{verify_chain, AuditRecord, NewAuditRecord};
use forgewatch_core::incident::{IncidentReport, IncidentStatus};
use forgewatch_core::security::Session;
use forgewatch_db::store::{AuditRecordStore, IncidentStore, RuntimeFlagStore, SessionStore};
use forgewatch_db::PgStore;
use serde_json::json;
use sqlx::PgPool;

const SECRET: &[u8] = b"pg-test-secret";

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn audit_chain_survives_jsonb_round_trip(pool: PgPool) {
    let store = PgStore::new(pool);

    for i in 0..3 {
        let prev = store.last_hash("org-1").await.unwrap().unwrap_or_default();
        let new = NewAuditRecord {
            org_id: "org-1".into(),
            entity_type: "prompt".into(),
            action: "update".into(),
            record_json: json!({"z": i, "a": [1.5, "two"], "nested": {"b": true}}),
            metadata: json!({"source": "test"}),
            ..Default::default()
        };
        let record = AuditRecord::chain(format!("rec-{i}"), new, prev, SECRET, Utc::now());
        store.insert(&record).await.unwrap();
    }

    let records = store.list_for_org("org-1", None, None).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(verify_chain(SECRET, &records).is_valid);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn sessions_and_flags_round_trip(pool: PgPool) {
    let store = PgStore::new(pool);
    let now = Utc::now();

    let session = Session::new("user-1", Some("10.0.0.1".into()), None, now);
    store.insert_session(&session).await.unwrap();
    assert!(store.find_valid(&session.session_token, now).await.unwrap().is_some());
    assert!(store.deactivate(&session.session_token, Some("user-1")).await.unwrap());
    assert!(store.find_valid(&session.session_token, now).await.unwrap().is_none());

    assert_eq!(store.get_flag("agents_enabled").await.unwrap(), None);
    store.set_flag("agents_enabled", false).await.unwrap();
    assert_eq!(store.get_flag("agents_enabled").await.unwrap(), Some(false));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn incidents_round_trip_until_resolved(pool: PgPool) {
    let store = PgStore::new(pool);
    let alert = AnomalyAlert {
        alert_type: AnomalyType::BudgetExceeded,
        severity: AlertSeverity::Critical,
        message: "Token budget exceeded: 13000 > 12000".into(),
        metrics: None,
        threshold: 12_000.0,
        actual: 13_000.0,
        timestamp: Utc::now(),
    };
    let mut incident = IncidentReport::open(&alert);
    store.save_incident(&incident).await.unwrap();

    incident.acknowledge("ops", Utc::now());
    store.save_incident(&incident).await.unwrap();
    let loaded = store.list_unresolved_incidents().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].status, IncidentStatus::Acknowledged);
    assert_eq!(loaded[0].actions_taken.len(), 2);

    incident.resolve("ops", Some("budget raised".into()), Utc::now());
    store.save_incident(&incident).await.unwrap();
    assert!(store.list_unresolved_incidents().await.unwrap().is_empty());
}
