use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::analysis::{AnalysisRecord, NewAnalysis};
use crate::models::pet::Pet;

pub mod memory;
pub mod queries;

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Analysis {0} changed concurrently")]
    Conflict(i64),
}

/// Durable record of analysis requests.
#[async_trait]
pub trait AnalysisRecordStore: Send + Sync {
    /// Persist a new record in `PENDING` and return it with its assigned id.
    async fn insert(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError>;

    /// All analyses of a pet, newest first.
    async fn find_by_pet_id(&self, pet_id: i64) -> Result<Vec<AnalysisRecord>, StoreError>;

    /// Write result, accuracy and status, but only while the stored record is
    /// still `PENDING`. Returns `false` when no pending row with that id
    /// exists, either because it was deleted or because another writer already
    /// finished it.
    async fn update(&self, record: &AnalysisRecord) -> Result<bool, StoreError>;
}

/// Durable record of pets, as far as the analysis lifecycle needs it.
#[async_trait]
pub trait PetStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Pet>, StoreError>;

    async fn update(&self, pet: &Pet) -> Result<(), StoreError>;
}
