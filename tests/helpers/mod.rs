//! Shared wiring for lifecycle tests: in-memory stores, queue and image store.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use pets_analysis::db::memory::{InMemoryAnalysisStore, InMemoryPetStore};
use pets_analysis::db::{AnalysisRecordStore, StoreError};
use pets_analysis::models::analysis::{AnalysisRecord, NewAnalysis};
use pets_analysis::models::message::AnalysisResultMessage;
use pets_analysis::models::pet::{Pet, Species};
use pets_analysis::services::authorization::{Identity, RoleAuthorization};
use pets_analysis::services::coordinator::{AnalysisLifecycleCoordinator, CreateAnalysis};
use pets_analysis::services::dispatcher::OutboundDispatcher;
use pets_analysis::services::queue::InMemoryQueue;
use pets_analysis::services::reconciler::InboundReconciler;
use pets_analysis::services::storage::{ImageStore, ImageUpload, StorageError};

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

/// Image store that records uploads and hands out predictable URLs.
#[derive(Default)]
pub struct FakeImageStore {
    fail: bool,
    stored: Mutex<usize>,
}

impl FakeImageStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub async fn stored(&self) -> usize {
        *self.stored.lock().await
    }
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn store(&self, image: &ImageUpload) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Status(503));
        }
        let mut stored = self.stored.lock().await;
        *stored += 1;
        Ok(format!("https://images.test/analyses/{}.{}", *stored, image.extension()))
    }
}

/// Analysis store that yields after every read, so concurrent reconcilers
/// interleave between reading a record and writing it back. With
/// `delete_after_read` the row disappears right after it is read.
pub struct InterleavingStore {
    pub inner: Arc<InMemoryAnalysisStore>,
    pub delete_after_read: bool,
}

#[async_trait]
impl AnalysisRecordStore for InterleavingStore {
    async fn insert(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        self.inner.insert(new).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        let found = self.inner.find_by_id(id).await?;
        if self.delete_after_read {
            self.inner.remove(id).await;
        }
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn find_by_pet_id(&self, pet_id: i64) -> Result<Vec<AnalysisRecord>, StoreError> {
        self.inner.find_by_pet_id(pet_id).await
    }

    async fn update(&self, record: &AnalysisRecord) -> Result<bool, StoreError> {
        self.inner.update(record).await
    }
}

pub struct Harness {
    pub analyses: Arc<InMemoryAnalysisStore>,
    pub pets: Arc<InMemoryPetStore>,
    pub queue: Arc<InMemoryQueue>,
    pub images: Arc<FakeImageStore>,
    pub coordinator: AnalysisLifecycleCoordinator,
    pub reconciler: Arc<InboundReconciler>,
}

impl Harness {
    pub fn new(pets: Vec<Pet>) -> Self {
        Self::build(pets, InMemoryQueue::new(), FakeImageStore::default())
    }

    pub fn build(pets: Vec<Pet>, queue: InMemoryQueue, images: FakeImageStore) -> Self {
        let analyses = Arc::new(InMemoryAnalysisStore::new());
        let pets = Arc::new(InMemoryPetStore::with_pets(pets));
        let queue = Arc::new(queue);
        let images = Arc::new(images);

        let coordinator = AnalysisLifecycleCoordinator::new(
            analyses.clone(),
            pets.clone(),
            images.clone(),
            Arc::new(RoleAuthorization::new("admin")),
            OutboundDispatcher::new(queue.clone()),
        );
        let reconciler = Arc::new(InboundReconciler::new(analyses.clone(), pets.clone()));

        Self {
            analyses,
            pets,
            queue,
            images,
            coordinator,
            reconciler,
        }
    }
}

pub fn pet(id: i64, owner: &str, species: Species) -> Pet {
    Pet {
        id,
        owner_id: owner.to_string(),
        name: format!("pet-{id}"),
        species,
        breed: None,
        updated_at: Utc::now(),
    }
}

pub fn owner(user_id: &str) -> Identity {
    Identity::new(user_id, ["user"])
}

pub fn admin() -> Identity {
    Identity::new("ops", ["user", "admin"])
}

pub fn request(pet_id: Option<i64>, analysis_type: &str) -> CreateAnalysis {
    CreateAnalysis {
        pet_id,
        image: Some(PNG_BYTES.to_vec()),
        analysis_type: analysis_type.to_string(),
    }
}

pub fn result_message(
    analysis_id: i64,
    status: &str,
    result: &str,
    analysis_type: &str,
    accuracy: Option<f64>,
) -> AnalysisResultMessage {
    AnalysisResultMessage {
        analysis_id,
        result: result.to_string(),
        status: status.to_string(),
        analysis_type: analysis_type.to_string(),
        accuracy,
    }
}
