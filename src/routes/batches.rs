use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::CompanyIdentity,
    models::{
        batch::{Batch, BatchFilter, BatchWithItems, CreateBatchRequest, RetirementLine},
        common::SuccessResponse,
    },
};

/// POST /api/v1/retirement-batches
#[instrument(skip(state, identity, request))]
pub async fn create_batch(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Json(request): Json<CreateBatchRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<BatchWithItems>>)> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let items: Vec<RetirementLine> = request.items.into_iter().map(Into::into).collect();
    let batch = state
        .batch_service
        .create_batch(
            identity.company_id,
            identity.user_id,
            &request.name,
            request.description,
            items,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(batch))))
}

/// Parts of a CSV upload form
#[derive(Debug, Default)]
struct CsvUpload {
    file: Option<String>,
    file_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
}

impl CsvUpload {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut upload = CsvUpload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("Malformed multipart body: {}", e)))?
        {
            let part = field.name().map(str::to_string);
            match part.as_deref() {
                Some("file") => {
                    upload.file_name = field.file_name().map(str::to_string);
                    let text = field.text().await.map_err(|e| {
                        ApiError::InvalidFormat(format!("CSV file must be UTF-8 text: {}", e))
                    })?;
                    upload.file = Some(text);
                }
                Some("name") => upload.name = Some(read_text(field).await?),
                Some("description") => upload.description = Some(read_text(field).await?),
                _ => {}
            }
        }

        Ok(upload)
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("Malformed multipart field: {}", e)))
}

/// POST /api/v1/retirement-batches/csv
///
/// Multipart form with a required `file` part plus optional `name` (defaults to
/// the uploaded file name) and `description`.
#[instrument(skip(state, identity, multipart))]
pub async fn create_batch_from_csv(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SuccessResponse<BatchWithItems>>)> {
    let upload = CsvUpload::read(multipart).await?;

    let raw_csv = upload
        .file
        .ok_or_else(|| ApiError::Validation("Multipart part 'file' is required".to_string()))?;
    let name = upload
        .name
        .filter(|n| !n.trim().is_empty())
        .or(upload.file_name)
        .unwrap_or_default();
    let description = upload.description.filter(|d| !d.trim().is_empty());

    let batch = state
        .batch_service
        .create_batch_from_csv(
            identity.company_id,
            identity.user_id,
            &name,
            description,
            &raw_csv,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(batch))))
}

/// GET /api/v1/retirement-batches
#[instrument(skip(state, identity))]
pub async fn list_batches(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Query(filter): Query<BatchFilter>,
) -> Result<Json<SuccessResponse<Vec<Batch>>>> {
    let batches = state
        .batch_service
        .list_batches(identity.company_id, &filter)
        .await?;
    Ok(Json(SuccessResponse::new(batches)))
}

/// GET /api/v1/retirement-batches/{id}
#[instrument(skip(state, identity))]
pub async fn get_batch(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<BatchWithItems>>> {
    let batch = state.batch_service.get_batch(identity.company_id, id).await?;
    Ok(Json(SuccessResponse::new(batch)))
}
