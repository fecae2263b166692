use axum::response::Json;
use utoipa::OpenApi;

use crate::dto::admin_dto::{AssessmentFlagsResponse, MasterSwitchRequest, SweepResponse};
use crate::dto::session_dto::{
    AttemptResultResponse, AttemptView, HeartbeatResponse, RecordAnswerRequest,
    SessionStatusResponse, SnapshotRequest, StartSessionResponse, ToggleFlagRequest,
};
use crate::error::IneligibleReason;
use crate::models::assessment::AssessmentKind;
use crate::models::attempt::{ScoreSummary, SubmissionKind};
use crate::models::question::PublicQuestion;
use crate::services::grading_service::{AnswerOutcome, QuestionReview};
use crate::services::window_service::{WindowEvaluation, WindowStatus};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::health::health,
        super::session::evaluate_window,
        super::session::start_or_resume,
        super::session::list_attempts,
        super::session::record_answer,
        super::session::toggle_flag,
        super::session::heartbeat,
        super::session::submit,
        super::session::force_submit,
        super::session::session_status,
        super::session::get_result,
        super::admin::activate,
        super::admin::deactivate,
        super::admin::set_master,
        super::admin::sweep,
    ),
    components(schemas(
        AttemptView,
        StartSessionResponse,
        RecordAnswerRequest,
        ToggleFlagRequest,
        SnapshotRequest,
        HeartbeatResponse,
        SessionStatusResponse,
        AttemptResultResponse,
        AssessmentFlagsResponse,
        MasterSwitchRequest,
        SweepResponse,
        WindowEvaluation,
        WindowStatus,
        IneligibleReason,
        AssessmentKind,
        ScoreSummary,
        SubmissionKind,
        PublicQuestion,
        QuestionReview,
        AnswerOutcome,
    )),
    tags((name = "sessions", description = "Timed assessment sessions"))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
