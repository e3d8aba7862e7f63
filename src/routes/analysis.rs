use axum::extract::{FromRequestParts, Multipart, Path, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::app_state::AppState;
use crate::error::AnalysisError;
use crate::models::response::{AnalysisResponse, ErrorResponse};
use crate::services::authorization::Identity;
use crate::services::coordinator::CreateAnalysis;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLES_HEADER: &str = "x-user-roles";

/// Caller identity forwarded by the authenticating gateway.
pub struct Caller(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(ApiError::Unauthenticated)?;

        let roles = parts
            .headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Caller(Identity {
            user_id: user_id.to_string(),
            roles,
        }))
    }
}

/// POST /api/v1/pets/{pet_id}/analyses - submit a photo for analysis.
pub async fn create_analysis(
    State(state): State<AppState>,
    Path(pet_id): Path<i64>,
    Caller(identity): Caller,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<AnalysisResponse>), ApiError> {
    let mut analysis_type: Option<String> = None;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|_| ApiError::BadMultipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("analysis_type") => {
                analysis_type = Some(field.text().await.map_err(|_| ApiError::BadMultipart)?);
            }
            Some("image") => {
                let data = field.bytes().await.map_err(|_| ApiError::BadMultipart)?;
                if !data.is_empty() {
                    image = Some(data.to_vec());
                }
            }
            _ => {}
        }
    }

    let request = CreateAnalysis {
        pet_id: Some(pet_id),
        image,
        analysis_type: analysis_type.unwrap_or_default(),
    };

    match state.coordinator.create_analysis(request, &identity).await {
        Ok(record) => Ok((StatusCode::ACCEPTED, Json(record.into()))),
        Err(AnalysisError::Dispatch { record, source }) => {
            let mut body = AnalysisResponse::from(*record);
            body.dispatch_error = Some(source.to_string());
            Ok((StatusCode::ACCEPTED, Json(body)))
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /api/v1/analyses/{analysis_id}
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<i64>,
    Caller(identity): Caller,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let record = state
        .coordinator
        .get_analysis(Some(analysis_id), &identity)
        .await?;
    Ok(Json(record.into()))
}

/// GET /api/v1/pets/{pet_id}/analyses
pub async fn list_pet_analyses(
    State(state): State<AppState>,
    Path(pet_id): Path<i64>,
    Caller(identity): Caller,
) -> Result<Json<Vec<AnalysisResponse>>, ApiError> {
    let records = state
        .coordinator
        .list_pet_analyses(Some(pet_id), &identity)
        .await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Missing caller identity")]
    Unauthenticated,

    #[error("Malformed multipart body")]
    BadMultipart,

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::BadMultipart => StatusCode::BAD_REQUEST,
            ApiError::Analysis(e) => match e {
                AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
                AnalysisError::NotFound(_) => StatusCode::NOT_FOUND,
                AnalysisError::Authorization => StatusCode::FORBIDDEN,
                AnalysisError::Dispatch { .. } => StatusCode::ACCEPTED,
                AnalysisError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
