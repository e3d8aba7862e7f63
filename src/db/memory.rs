//! In-memory stores for tests and local wiring without PostgreSQL.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::{AnalysisRecordStore, PetStore, StoreError};
use crate::models::analysis::{AnalysisRecord, AnalysisStatus, NewAnalysis};
use crate::models::pet::Pet;

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    inner: RwLock<AnalysisTable>,
}

#[derive(Default)]
struct AnalysisTable {
    next_id: i64,
    rows: HashMap<i64, AnalysisRecord>,
    updates: usize,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop a record, as the cascade from a deleted pet would.
    pub async fn remove(&self, id: i64) -> Option<AnalysisRecord> {
        self.inner.write().await.rows.remove(&id)
    }

    /// Number of successful `update` calls.
    pub async fn update_count(&self) -> usize {
        self.inner.read().await.updates
    }
}

#[async_trait]
impl AnalysisRecordStore for InMemoryAnalysisStore {
    async fn insert(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        let mut table = self.inner.write().await;
        table.next_id += 1;
        let now = Utc::now();
        let record = AnalysisRecord {
            id: table.next_id,
            pet_id: new.pet_id,
            image_url: new.image_url,
            kind: new.kind,
            result: None,
            accuracy: None,
            status: AnalysisStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn find_by_pet_id(&self, pet_id: i64) -> Result<Vec<AnalysisRecord>, StoreError> {
        let table = self.inner.read().await;
        let mut records: Vec<_> = table
            .rows
            .values()
            .filter(|r| r.pet_id == pet_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn update(&self, record: &AnalysisRecord) -> Result<bool, StoreError> {
        let mut table = self.inner.write().await;
        match table.rows.get_mut(&record.id) {
            Some(row) if row.status == AnalysisStatus::Pending => {
                *row = record.clone();
                table.updates += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct InMemoryPetStore {
    inner: RwLock<PetTable>,
}

#[derive(Default)]
struct PetTable {
    rows: HashMap<i64, Pet>,
    updates: usize,
}

impl InMemoryPetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pets(pets: impl IntoIterator<Item = Pet>) -> Self {
        let rows = pets.into_iter().map(|p| (p.id, p)).collect();
        Self {
            inner: RwLock::new(PetTable { rows, updates: 0 }),
        }
    }

    pub async fn remove(&self, id: i64) -> Option<Pet> {
        self.inner.write().await.rows.remove(&id)
    }

    /// Number of successful `update` calls.
    pub async fn update_count(&self) -> usize {
        self.inner.read().await.updates
    }
}

#[async_trait]
impl PetStore for InMemoryPetStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Pet>, StoreError> {
        Ok(self.inner.read().await.rows.get(&id).cloned())
    }

    async fn update(&self, pet: &Pet) -> Result<(), StoreError> {
        let mut table = self.inner.write().await;
        if let Some(row) = table.rows.get_mut(&pet.id) {
            *row = pet.clone();
            row.updated_at = Utc::now();
            table.updates += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::AnalysisKind;

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids_in_pending() {
        let store = InMemoryAnalysisStore::new();
        let first = store
            .insert(NewAnalysis { pet_id: 1, image_url: None, kind: AnalysisKind::Breed })
            .await
            .unwrap();
        let second = store
            .insert(NewAnalysis { pet_id: 1, image_url: None, kind: AnalysisKind::Emotional })
            .await
            .unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, AnalysisStatus::Pending);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_find_by_pet_id_filters_and_orders_newest_first() {
        let store = InMemoryAnalysisStore::new();
        for pet_id in [1, 2, 1] {
            store
                .insert(NewAnalysis { pet_id, image_url: None, kind: AnalysisKind::Breed })
                .await
                .unwrap();
        }

        let ids: Vec<i64> = store
            .find_by_pet_id(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_update_only_applies_to_pending_rows() {
        let store = InMemoryAnalysisStore::new();
        let mut record = store
            .insert(NewAnalysis { pet_id: 1, image_url: None, kind: AnalysisKind::Breed })
            .await
            .unwrap();

        record.status = AnalysisStatus::Failure;
        record.result = Some("worker crashed".to_string());
        assert!(store.update(&record).await.unwrap());

        record.status = AnalysisStatus::Completed;
        record.result = Some("Labrador".to_string());
        assert!(!store.update(&record).await.unwrap());

        let stored = store.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnalysisStatus::Failure);
        assert_eq!(stored.result.as_deref(), Some("worker crashed"));
        assert_eq!(store.update_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_reports_false() {
        let store = InMemoryAnalysisStore::new();
        let record = store
            .insert(NewAnalysis { pet_id: 1, image_url: None, kind: AnalysisKind::Breed })
            .await
            .unwrap();
        store.remove(record.id).await;

        assert!(!store.update(&record).await.unwrap());
        assert_eq!(store.update_count().await, 0);
    }
}
