use chrono::Utc;
use garde::Validate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

use crate::db::{AnalysisRecordStore, PetStore, StoreError};
use crate::error::{AnalysisError, ValidationError};
use crate::models::analysis::{is_breed_type, AnalysisStatus, Transition};
use crate::models::message::AnalysisResultMessage;

/// What a delivered result did to its analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Completed { breed_updated: bool },
    Failed,
    /// The record was already terminal; the delivery was a no-op.
    Duplicate(AnalysisStatus),
}

/// Applies worker results to analysis records.
///
/// Deliveries for the same analysis id are serialized through a per-id lock;
/// different ids proceed in parallel. The record write only succeeds while the
/// stored row is still `PENDING`, so other processes sharing the store cannot
/// overwrite a finished analysis. The pet is written before the analysis
/// record, so a crash in between leaves the record `PENDING` and the
/// redelivered message re-runs the whole transition. Re-assigning the same
/// breed is skipped.
pub struct InboundReconciler {
    analyses: Arc<dyn AnalysisRecordStore>,
    pets: Arc<dyn PetStore>,
    locks: KeyedLocks,
}

impl InboundReconciler {
    pub fn new(analyses: Arc<dyn AnalysisRecordStore>, pets: Arc<dyn PetStore>) -> Self {
        Self {
            analyses,
            pets,
            locks: KeyedLocks::default(),
        }
    }

    pub async fn on_result(
        &self,
        message: &AnalysisResultMessage,
    ) -> Result<ReconcileOutcome, AnalysisError> {
        message
            .validate()
            .map_err(|report| ValidationError::MalformedMessage(report.to_string()))?;

        let _guard = self.locks.lock(message.analysis_id).await;

        let mut record = self
            .analyses
            .find_by_id(message.analysis_id)
            .await?
            .ok_or(AnalysisError::NotFound("Analysis"))?;

        let outcome = match record.apply_result(message, Utc::now()) {
            Transition::AlreadyTerminal(status) => return Ok(duplicate(message, status)),
            Transition::Failed => ReconcileOutcome::Failed,
            Transition::Completed => {
                let breed_updated = if is_breed_type(&message.analysis_type) {
                    self.assign_breed(record.pet_id, &message.result).await?
                } else {
                    false
                };
                ReconcileOutcome::Completed { breed_updated }
            }
        };

        if !self.analyses.update(&record).await? {
            // Another writer finished or deleted the row since it was read.
            return match self.analyses.find_by_id(record.id).await? {
                None => Err(AnalysisError::NotFound("Analysis")),
                Some(current) if current.status.is_terminal() => {
                    Ok(duplicate(message, current.status))
                }
                Some(_) => Err(StoreError::Conflict(record.id).into()),
            };
        }

        tracing::info!(
            analysis_id = record.id,
            pet_id = record.pet_id,
            status = %record.status,
            analysis_type = %message.analysis_type,
            "Analysis reconciled"
        );

        Ok(outcome)
    }

    /// Returns whether the pet was written.
    async fn assign_breed(&self, pet_id: i64, breed: &str) -> Result<bool, AnalysisError> {
        let mut pet = self
            .pets
            .find_by_id(pet_id)
            .await?
            .ok_or(AnalysisError::NotFound("Pet"))?;

        if pet.breed.as_deref() == Some(breed) {
            return Ok(false);
        }

        pet.breed = Some(breed.to_string());
        self.pets.update(&pet).await?;
        tracing::info!(pet_id, breed, "Pet breed updated from analysis");
        Ok(true)
    }
}

fn duplicate(message: &AnalysisResultMessage, status: AnalysisStatus) -> ReconcileOutcome {
    tracing::info!(
        analysis_id = message.analysis_id,
        status = %status,
        incoming_status = %message.status,
        "Result for terminal analysis ignored"
    );
    metrics::counter!("analysis_results_duplicate").increment(1);
    ReconcileOutcome::Duplicate(status)
}

/// Single-writer locks keyed by analysis id. Entries are dropped once no task
/// holds or waits on them.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn slots(&self) -> MutexGuard<'_, HashMap<i64, Arc<tokio::sync::Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn lock(&self, key: i64) -> KeyGuard<'_> {
        let slot = self.slots().entry(key).or_default().clone();
        let guard = slot.lock_owned().await;
        KeyGuard {
            locks: self,
            key,
            _guard: guard,
        }
    }

    pub fn active(&self) -> usize {
        self.slots().len()
    }
}

pub struct KeyGuard<'a> {
    locks: &'a KeyedLocks,
    key: i64,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        // One reference in the map, one inside our guard.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) <= 2)
        {
            slots.remove(&self.key);
        }
    }
}
