use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::analysis::{AnalysisKind, AnalysisRecord, AnalysisStatus};

/// Analysis as returned to API clients.
#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub id: i64,
    pub pet_id: i64,
    pub image_url: Option<String>,
    pub analysis_type: AnalysisKind,
    pub result: Option<String>,
    pub accuracy: Option<f64>,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the record was created but its job could not be published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_error: Option<String>,
}

impl From<AnalysisRecord> for AnalysisResponse {
    fn from(record: AnalysisRecord) -> Self {
        Self {
            id: record.id,
            pet_id: record.pet_id,
            image_url: record.image_url,
            analysis_type: record.kind,
            result: record.result,
            accuracy: record.accuracy,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            dispatch_error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
