use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::message::AnalysisResultMessage;

/// Status of a pet analysis. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisStatus {
    Pending,
    Completed,
    Failure,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AnalysisStatus::Pending)
    }
}

/// Kind of classification requested from the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum AnalysisKind {
    Emotional,
    Breed,
}

/// A persisted analysis request and its current outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub id: i64,
    pub pet_id: i64,
    pub image_url: Option<String>,
    pub kind: AnalysisKind,
    pub result: Option<String>,
    pub accuracy: Option<f64>,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when inserting a record; the store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewAnalysis {
    pub pet_id: i64,
    pub image_url: Option<String>,
    pub kind: AnalysisKind,
}

/// Outcome of applying a result message to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Record moved from `Pending` to `Completed`.
    Completed,
    /// Record moved from `Pending` to `Failure`.
    Failed,
    /// Record was already terminal; nothing changed.
    AlreadyTerminal(AnalysisStatus),
}

/// Whether a worker status code signals success. Only the leading character
/// is significant: "2xx" is success, anything else (including empty) is not.
pub fn is_success_code(status: &str) -> bool {
    status.starts_with('2')
}

/// Whether the composite job type names a breed classification.
pub fn is_breed_type(analysis_type: &str) -> bool {
    analysis_type.ends_with("BREED")
}

impl AnalysisRecord {
    /// Apply a worker result to this record.
    ///
    /// A terminal record is left untouched so that redelivered messages are
    /// no-ops. On success the result text and accuracy are written; on failure
    /// only the result text (the worker's error description) is written and the
    /// accuracy keeps whatever it held.
    pub fn apply_result(
        &mut self,
        message: &AnalysisResultMessage,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status.is_terminal() {
            return Transition::AlreadyTerminal(self.status);
        }

        self.result = Some(message.result.clone());
        self.updated_at = now;

        if is_success_code(&message.status) {
            if message.accuracy.is_some() {
                self.accuracy = message.accuracy;
            }
            self.status = AnalysisStatus::Completed;
            Transition::Completed
        } else {
            self.status = AnalysisStatus::Failure;
            Transition::Failed
        }
    }
}
