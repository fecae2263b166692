use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use uuid::Uuid;

use crate::dto::admin_dto::{AssessmentFlagsResponse, MasterSwitchRequest, SweepResponse};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/admin/assessments/{id}/activate",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses((status = 200, description = "Activated; other assessments of the same kind deactivated", body = AssessmentFlagsResponse))
)]
#[axum::debug_handler]
pub async fn activate(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<AssessmentFlagsResponse>> {
    tracing::info!(admin = %claims.sub, assessment_id = %assessment_id, "Activation requested");
    let assessment = state.sessions.activate(assessment_id).await?;
    Ok(Json(assessment.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/assessments/{id}/deactivate",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses((status = 200, description = "Deactivated", body = AssessmentFlagsResponse))
)]
#[axum::debug_handler]
pub async fn deactivate(
    State(state): State<AppState>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<AssessmentFlagsResponse>> {
    let assessment = state.sessions.deactivate(assessment_id).await?;
    Ok(Json(assessment.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/assessments/{id}/master",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    request_body = MasterSwitchRequest,
    responses((status = 200, description = "Master switch updated", body = AssessmentFlagsResponse))
)]
#[axum::debug_handler]
pub async fn set_master(
    State(state): State<AppState>,
    Path(assessment_id): Path<Uuid>,
    Json(req): Json<MasterSwitchRequest>,
) -> Result<Json<AssessmentFlagsResponse>> {
    let assessment = state
        .sessions
        .set_master_enabled(assessment_id, req.enabled)
        .await?;
    Ok(Json(assessment.into()))
}

#[utoipa::path(
    post,
    path = "/api/admin/sweep",
    responses((status = 200, description = "Overdue attempts sealed", body = SweepResponse))
)]
#[axum::debug_handler]
pub async fn sweep(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let sealed = state.sessions.expire_overdue().await?;
    Ok(Json(SweepResponse { sealed }))
}
