use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{
    AttemptResultResponse, AttemptView, HeartbeatResponse, RecordAnswerRequest,
    SessionStatusResponse, SnapshotRequest, StartSessionResponse, ToggleFlagRequest, WindowQuery,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::services::window_service::WindowEvaluation;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/assessments/{id}/window",
    params(
        ("id" = Uuid, Path, description = "Assessment ID"),
        WindowQuery
    ),
    responses(
        (status = 200, description = "Current window state", body = WindowEvaluation),
        (status = 404, description = "Assessment not found"),
    )
)]
#[axum::debug_handler]
pub async fn evaluate_window(
    State(state): State<AppState>,
    Path(assessment_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<WindowEvaluation>> {
    let now = query.at.unwrap_or_else(|| state.sessions.now());
    let evaluation = state.sessions.evaluate_window(assessment_id, now).await?;
    Ok(Json(evaluation))
}

#[utoipa::path(
    post,
    path = "/api/assessments/{id}/start",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses(
        (status = 201, description = "Attempt started", body = StartSessionResponse),
        (status = 200, description = "Open attempt resumed", body = StartSessionResponse),
        (status = 403, description = "Not eligible; `error` carries the reason"),
    )
)]
#[axum::debug_handler]
pub async fn start_or_resume(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Response> {
    let start = state
        .sessions
        .start_or_resume(&claims.sub, assessment_id)
        .await?;
    let status = if start.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(StartSessionResponse::from(start))).into_response())
}

#[utoipa::path(
    get,
    path = "/api/assessments/{id}/attempts",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses((status = 200, description = "Caller's attempts, newest first", body = [AttemptView]))
)]
#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<Vec<AttemptView>>> {
    let attempts = state
        .sessions
        .list_attempts(&claims.sub, assessment_id)
        .await?;
    Ok(Json(attempts.into_iter().map(AttemptView::from).collect()))
}

#[utoipa::path(
    patch,
    path = "/api/attempts/{id}/answer",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = RecordAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = AttemptView),
        (status = 409, description = "Attempt already completed"),
        (status = 410, description = "Deadline passed"),
        (status = 422, description = "Index out of range"),
    )
)]
#[axum::debug_handler]
pub async fn record_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<RecordAnswerRequest>,
) -> Result<Json<AttemptView>> {
    req.validate()?;
    let attempt = state
        .sessions
        .record_answer(&claims.sub, attempt_id, req.question_index, req.option_index)
        .await?;
    Ok(Json(attempt.into()))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/flag",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = ToggleFlagRequest,
    responses((status = 200, description = "Flag toggled", body = AttemptView))
)]
#[axum::debug_handler]
pub async fn toggle_flag(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<ToggleFlagRequest>,
) -> Result<Json<AttemptView>> {
    req.validate()?;
    let attempt = state
        .sessions
        .toggle_flag(&claims.sub, attempt_id, req.question_index)
        .await?;
    Ok(Json(attempt.into()))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/heartbeat",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = SnapshotRequest,
    responses((status = 200, description = "Snapshot acknowledged", body = HeartbeatResponse))
)]
#[axum::debug_handler]
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<HeartbeatResponse>> {
    req.validate()?;
    let ack = state
        .sessions
        .heartbeat(&claims.sub, attempt_id, req.into())
        .await?;
    Ok(Json(ack.into()))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/submit",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    request_body = SnapshotRequest,
    responses(
        (status = 200, description = "Attempt sealed, or the stored result if already sealed", body = AttemptView),
        (status = 410, description = "Deadline passed"),
    )
)]
#[axum::debug_handler]
pub async fn submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<AttemptView>> {
    req.validate()?;
    let attempt = state
        .sessions
        .submit(&claims.sub, attempt_id, req.into())
        .await?;
    Ok(Json(attempt.into()))
}

#[utoipa::path(
    post,
    path = "/api/attempts/{id}/force-submit",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses((status = 200, description = "Attempt sealed from the last saved snapshot", body = AttemptView))
)]
#[axum::debug_handler]
pub async fn force_submit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<AttemptView>> {
    let attempt = state.sessions.force_submit(&claims.sub, attempt_id).await?;
    Ok(Json(attempt.into()))
}

#[utoipa::path(
    get,
    path = "/api/attempts/{id}/status",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses((status = 200, description = "Authoritative remaining time", body = SessionStatusResponse))
)]
#[axum::debug_handler]
pub async fn session_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<SessionStatusResponse>> {
    let status = state
        .sessions
        .session_status(&claims.sub, attempt_id)
        .await?;
    Ok(Json(status.into()))
}

#[utoipa::path(
    get,
    path = "/api/attempts/{id}/result",
    params(("id" = Uuid, Path, description = "Attempt ID")),
    responses(
        (status = 200, description = "Score and per-question review", body = AttemptResultResponse),
        (status = 403, description = "Attempt belongs to another user"),
        (status = 409, description = "Attempt not submitted yet"),
    )
)]
#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Json<AttemptResultResponse>> {
    let result = state.sessions.get_result(attempt_id, &claims.sub).await?;
    Ok(Json(result.into()))
}
