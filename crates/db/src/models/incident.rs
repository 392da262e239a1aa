//! Incident rows.

use forgewatch_core::incident::IncidentReport;
use sqlx::FromRow;

use crate::StoreError;

#[derive(Debug, Clone, FromRow)]
pub struct IncidentRow {
    pub id: String,
    pub report: serde_json::Value,
}

impl TryFrom<IncidentRow> for IncidentReport {
    type Error = StoreError;

    fn try_from(row: IncidentRow) -> Result<Self, Self::Error> {
        let report: IncidentReport = serde_json::from_value(row.report)?;
        if report.id != row.id {
            return Err(StoreError::Corrupt(format!(
                "incident row {} holds report {}",
                row.id, report.id
            )));
        }
        Ok(report)
    }
}
