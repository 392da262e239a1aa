//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod audit_record_repo;
pub mod incident_repo;
pub mod run_log_repo;
pub mod runtime_flag_repo;
pub mod security_event_repo;
pub mod session_repo;
pub mod telemetry_repo;

pub use audit_record_repo::AuditRecordRepo;
pub use incident_repo::IncidentRepo;
pub use run_log_repo::RunLogRepo;
pub use runtime_flag_repo::RuntimeFlagRepo;
pub use security_event_repo::SecurityEventRepo;
pub use session_repo::SessionRepo;
pub use telemetry_repo::TelemetryRepo;
