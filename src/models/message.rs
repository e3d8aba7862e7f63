//! Wire shapes exchanged with the external classification worker.

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::analysis::AnalysisKind;
use crate::models::pet::Species;

/// Job published to the worker queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJobMessage {
    pub analysis_id: i64,
    pub image_url: Option<String>,
    /// Composite `<SPECIES>_<KIND>` routing key, e.g. `DOG_BREED`.
    pub analysis_type: String,
}

impl AnalysisJobMessage {
    pub fn new(
        analysis_id: i64,
        image_url: Option<String>,
        species: Species,
        kind: AnalysisKind,
    ) -> Self {
        Self {
            analysis_id,
            image_url,
            analysis_type: composite_job_type(species, kind),
        }
    }
}

pub fn composite_job_type(species: Species, kind: AnalysisKind) -> String {
    format!("{species}_{kind}")
}

/// Result reported back by the worker on the response queue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResultMessage {
    #[garde(range(min = 0))]
    pub analysis_id: i64,

    #[garde(skip)]
    pub result: String,

    /// Only the leading character is meaningful ('2' means success).
    #[garde(skip)]
    pub status: String,

    #[garde(length(min = 1))]
    pub analysis_type: String,

    #[garde(skip)]
    #[serde(default)]
    pub accuracy: Option<f64>,
}
