use axum::{
    extract::{Path, Query, State},
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
        common::{MessageResponse, SuccessResponse},
        schedule::{
            CreateScheduleRequest, Execution, Schedule, ScheduleFilter, UpdateScheduleRequest,
        },
    },
};

/// POST /api/v1/retirement-schedules
#[instrument(skip(state, identity, request))]
pub async fn create_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Json(request): Json<CreateScheduleRequest>,
) -> Result<(StatusCode, Json<SuccessResponse<Schedule>>)> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let schedule = state
        .scheduling_service
        .create(
            identity.company_id,
            identity.user_id,
            request.into_new_schedule()?,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(SuccessResponse::new(schedule))))
}

/// GET /api/v1/retirement-schedules
#[instrument(skip(state, identity))]
pub async fn list_schedules(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Query(filter): Query<ScheduleFilter>,
) -> Result<Json<SuccessResponse<Vec<Schedule>>>> {
    let schedules = state
        .scheduling_service
        .list(identity.company_id, &filter)
        .await?;

    Ok(Json(SuccessResponse::new(schedules)))
}

/// GET /api/v1/retirement-schedules/{id}
#[instrument(skip(state, identity))]
pub async fn get_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Schedule>>> {
    let schedule = state.scheduling_service.get(identity.company_id, id).await?;
    Ok(Json(SuccessResponse::new(schedule)))
}

/// PATCH /api/v1/retirement-schedules/{id}
#[instrument(skip(state, identity, request))]
pub async fn update_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<SuccessResponse<Schedule>>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let schedule = state
        .scheduling_service
        .update(identity.company_id, id, request.into_patch()?)
        .await?;

    Ok(Json(SuccessResponse::new(schedule)))
}

/// DELETE /api/v1/retirement-schedules/{id}
#[instrument(skip(state, identity))]
pub async fn delete_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<MessageResponse>>> {
    state
        .scheduling_service
        .delete(identity.company_id, id)
        .await?;

    Ok(Json(SuccessResponse::new(MessageResponse::new(format!(
        "Schedule {} deleted",
        id
    )))))
}

/// POST /api/v1/retirement-schedules/{id}/pause
#[instrument(skip(state, identity))]
pub async fn pause_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Schedule>>> {
    let schedule = state
        .scheduling_service
        .pause(identity.company_id, id)
        .await?;
    Ok(Json(SuccessResponse::new(schedule)))
}

/// POST /api/v1/retirement-schedules/{id}/resume
#[instrument(skip(state, identity))]
pub async fn resume_schedule(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Schedule>>> {
    let schedule = state
        .scheduling_service
        .resume(identity.company_id, id)
        .await?;
    Ok(Json(SuccessResponse::new(schedule)))
}

/// POST /api/v1/retirement-schedules/{id}/execute
///
/// Responds 200 with the recorded execution even when the retirement itself
/// failed; the outcome is in the body.
#[instrument(skip(state, identity))]
pub async fn execute_schedule_now(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Execution>>> {
    let execution = state
        .scheduling_service
        .execute_now(identity.company_id, identity.user_id, id)
        .await?;
    Ok(Json(SuccessResponse::new(execution)))
}

/// GET /api/v1/retirement-schedules/{id}/executions
#[instrument(skip(state, identity))]
pub async fn list_executions(
    State(state): State<AppState>,
    identity: CompanyIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SuccessResponse<Vec<Execution>>>> {
    let executions = state
        .scheduling_service
        .list_executions(identity.company_id, id)
        .await?;
    Ok(Json(SuccessResponse::new(executions)))
}
