/// All timestamps are stored and compared in UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Organization identifiers are opaque strings issued by the auth layer.
pub type OrgId = String;

/// Organization id used for events that are not owned by a tenant
/// (security middleware, system health checks, kill-switch notices).
pub const SYSTEM_ORG: &str = "system";

/// Generate a new random identifier for audit records, incidents and sessions.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
