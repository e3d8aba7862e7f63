use std::str::FromStr;
use std::sync::Arc;

use crate::db::{AnalysisRecordStore, PetStore};
use crate::error::{validate_id, AnalysisError, ValidationError};
use crate::models::analysis::{AnalysisKind, AnalysisRecord, NewAnalysis};
use crate::models::message::AnalysisJobMessage;
use crate::models::pet::Pet;
use crate::services::authorization::{AuthorizationOracle, Identity};
use crate::services::dispatcher::OutboundDispatcher;
use crate::services::storage::{ImageStore, ImageUpload};

/// Client request to analyse a pet photo.
#[derive(Debug, Clone)]
pub struct CreateAnalysis {
    pub pet_id: Option<i64>,
    /// Raw upload; format is checked once the caller is authorized.
    pub image: Option<Vec<u8>>,
    pub analysis_type: String,
}

/// Entry point of the analysis lifecycle: validates, persists the `PENDING`
/// record and publishes the job without waiting for the worker.
pub struct AnalysisLifecycleCoordinator {
    analyses: Arc<dyn AnalysisRecordStore>,
    pets: Arc<dyn PetStore>,
    images: Arc<dyn ImageStore>,
    oracle: Arc<dyn AuthorizationOracle>,
    dispatcher: OutboundDispatcher,
}

impl AnalysisLifecycleCoordinator {
    pub fn new(
        analyses: Arc<dyn AnalysisRecordStore>,
        pets: Arc<dyn PetStore>,
        images: Arc<dyn ImageStore>,
        oracle: Arc<dyn AuthorizationOracle>,
        dispatcher: OutboundDispatcher,
    ) -> Self {
        Self {
            analyses,
            pets,
            images,
            oracle,
            dispatcher,
        }
    }

    /// Create an analysis and dispatch its job.
    ///
    /// A publish failure returns [`AnalysisError::Dispatch`] carrying the
    /// record, which stays persisted in `PENDING`.
    pub async fn create_analysis(
        &self,
        request: CreateAnalysis,
        identity: &Identity,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let pet_id = validate_id(request.pet_id)?;
        let kind = AnalysisKind::from_str(&request.analysis_type)
            .map_err(|_| ValidationError::UnknownAnalysisKind(request.analysis_type.clone()))?;

        let pet = self.authorized_pet(pet_id, identity).await?;
        let image = request.image.map(ImageUpload::from_bytes).transpose()?;

        let image_url = match &image {
            Some(image) => match self.images.store(image).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(
                        pet_id,
                        error = %e,
                        "Image upload failed, creating analysis without image"
                    );
                    metrics::counter!("analysis_image_upload_failed").increment(1);
                    None
                }
            },
            None => None,
        };

        let record = self
            .analyses
            .insert(NewAnalysis {
                pet_id,
                image_url,
                kind,
            })
            .await?;

        metrics::counter!("analysis_requests_total").increment(1);
        tracing::info!(
            analysis_id = record.id,
            pet_id,
            analysis_type = %kind,
            user_id = %identity.user_id,
            "Analysis created"
        );

        let job =
            AnalysisJobMessage::new(record.id, record.image_url.clone(), pet.species, kind);
        if let Err(source) = self.dispatcher.publish(&job).await {
            tracing::error!(
                analysis_id = record.id,
                error = %source,
                "Analysis job dispatch failed, record left pending"
            );
            metrics::counter!("analysis_dispatch_failed").increment(1);
            return Err(AnalysisError::Dispatch {
                record: Box::new(record),
                source,
            });
        }

        Ok(record)
    }

    /// Fetch one analysis for a caller allowed to see its pet.
    pub async fn get_analysis(
        &self,
        analysis_id: Option<i64>,
        identity: &Identity,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let analysis_id = validate_id(analysis_id)?;
        let record = self
            .analyses
            .find_by_id(analysis_id)
            .await?
            .ok_or(AnalysisError::NotFound("Analysis"))?;

        self.authorized_pet(record.pet_id, identity).await?;
        Ok(record)
    }

    /// All analyses of a pet, newest first.
    pub async fn list_pet_analyses(
        &self,
        pet_id: Option<i64>,
        identity: &Identity,
    ) -> Result<Vec<AnalysisRecord>, AnalysisError> {
        let pet_id = validate_id(pet_id)?;
        self.authorized_pet(pet_id, identity).await?;
        Ok(self.analyses.find_by_pet_id(pet_id).await?)
    }

    async fn authorized_pet(&self, pet_id: i64, identity: &Identity) -> Result<Pet, AnalysisError> {
        let pet = self
            .pets
            .find_by_id(pet_id)
            .await?
            .ok_or(AnalysisError::NotFound("Pet"))?;

        if !self.oracle.is_owner_or_admin(&pet, identity) {
            tracing::warn!(pet_id, user_id = %identity.user_id, "Access to foreign pet denied");
            return Err(AnalysisError::Authorization);
        }
        Ok(pet)
    }
}
