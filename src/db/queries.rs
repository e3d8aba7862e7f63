use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use crate::db::{AnalysisRecordStore, PetStore, StoreError};
use crate::models::analysis::{AnalysisKind, AnalysisRecord, AnalysisStatus, NewAnalysis};
use crate::models::pet::{Pet, Species};

const ANALYSIS_COLUMNS: &str =
    "id, pet_id, image_url, analysis_type, result, accuracy, status, created_at, updated_at";

/// PostgreSQL-backed analysis record store.
#[derive(Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn analysis_from_row(row: &PgRow) -> Result<AnalysisRecord, StoreError> {
    let kind: String = row.try_get("analysis_type")?;
    let status: String = row.try_get("status")?;

    Ok(AnalysisRecord {
        id: row.try_get("id")?,
        pet_id: row.try_get("pet_id")?,
        image_url: row.try_get("image_url")?,
        kind: AnalysisKind::from_str(&kind)
            .map_err(|_| StoreError::Corrupt(format!("analysis_type '{kind}'")))?,
        result: row.try_get("result")?,
        accuracy: row.try_get("accuracy")?,
        status: AnalysisStatus::from_str(&status)
            .map_err(|_| StoreError::Corrupt(format!("status '{status}'")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AnalysisRecordStore for PgAnalysisStore {
    async fn insert(&self, new: NewAnalysis) -> Result<AnalysisRecord, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO pet_analyses (pet_id, image_url, analysis_type, status)
            VALUES ($1, $2, $3, 'PENDING')
            RETURNING {ANALYSIS_COLUMNS}
            "#
        ))
        .bind(new.pet_id)
        .bind(new.image_url)
        .bind(new.kind.to_string())
        .fetch_one(&self.pool)
        .await?;

        analysis_from_row(&row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<AnalysisRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ANALYSIS_COLUMNS} FROM pet_analyses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(analysis_from_row).transpose()
    }

    async fn find_by_pet_id(&self, pet_id: i64) -> Result<Vec<AnalysisRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ANALYSIS_COLUMNS}
            FROM pet_analyses
            WHERE pet_id = $1
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(pet_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(analysis_from_row).collect()
    }

    async fn update(&self, record: &AnalysisRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pet_analyses
            SET result = $1,
                accuracy = $2,
                status = $3,
                updated_at = $4
            WHERE id = $5 AND status = 'PENDING'
            "#,
        )
        .bind(&record.result)
        .bind(record.accuracy)
        .bind(record.status.to_string())
        .bind(record.updated_at)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// PostgreSQL-backed pet store.
#[derive(Clone)]
pub struct PgPetStore {
    pool: PgPool,
}

impl PgPetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PetStore for PgPetStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Pet>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, name, species, breed, updated_at
            FROM pets
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => {
                let species: String = r.try_get("species")?;
                Some(Pet {
                    id: r.try_get("id")?,
                    owner_id: r.try_get("owner_id")?,
                    name: r.try_get("name")?,
                    species: Species::from_str(&species)
                        .map_err(|_| StoreError::Corrupt(format!("species '{species}'")))?,
                    breed: r.try_get("breed")?,
                    updated_at: r.try_get("updated_at")?,
                })
            }
            None => None,
        })
    }

    async fn update(&self, pet: &Pet) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE pets
            SET breed = $1,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(&pet.breed)
        .bind(pet.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
