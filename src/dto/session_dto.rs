use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt::{Attempt, ScoreSummary, SubmissionKind};
use crate::models::question::PublicQuestion;
use crate::services::grading_service::QuestionReview;
use crate::services::session_service::{
    AnswerSnapshot, HeartbeatAck, ScoredAttempt, SessionStart, SessionStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AttemptView {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub answers: Vec<Option<i32>>,
    pub flagged: Vec<usize>,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub submission: Option<SubmissionKind>,
    pub score: Option<ScoreSummary>,
    pub version: i64,
}

impl From<Attempt> for AttemptView {
    fn from(a: Attempt) -> Self {
        let (completed_at, submission, score) = match &a.completion {
            Some(c) => (Some(c.completed_at), Some(c.submission), Some(c.score)),
            None => (None, None, None),
        };
        Self {
            id: a.id,
            assessment_id: a.assessment_id,
            flagged: a.flagged.iter().copied().collect(),
            answers: a.answers,
            started_at: a.started_at,
            deadline_at: a.deadline_at,
            time_spent_seconds: a.time_spent_seconds,
            is_completed: a.is_completed,
            completed_at,
            submission,
            score,
            version: a.version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct StartSessionResponse {
    pub attempt: AttemptView,
    pub resumed: bool,
    pub remaining_seconds: i64,
    pub questions: Vec<PublicQuestion>,
}

impl From<SessionStart> for StartSessionResponse {
    fn from(start: SessionStart) -> Self {
        Self {
            attempt: start.attempt.into(),
            resumed: start.resumed,
            remaining_seconds: start.remaining_seconds,
            questions: start.questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct RecordAnswerRequest {
    pub question_index: usize,
    /// `null` clears the answer.
    #[validate(range(min = 0))]
    pub option_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct ToggleFlagRequest {
    pub question_index: usize,
}

/// Full client-side state, sent with heartbeats and the final submit.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct SnapshotRequest {
    pub answers: Vec<Option<i32>>,
    #[serde(default)]
    pub flagged: Vec<usize>,
    #[validate(range(min = 0))]
    pub time_spent_seconds: i64,
}

impl From<SnapshotRequest> for AnswerSnapshot {
    fn from(req: SnapshotRequest) -> Self {
        Self {
            answers: req.answers,
            flagged: req.flagged.into_iter().collect(),
            time_spent_seconds: req.time_spent_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HeartbeatResponse {
    pub accepted: bool,
    pub is_completed: bool,
    pub remaining_seconds: i64,
}

impl From<HeartbeatAck> for HeartbeatResponse {
    fn from(ack: HeartbeatAck) -> Self {
        Self {
            accepted: ack.accepted,
            is_completed: ack.is_completed,
            remaining_seconds: ack.remaining_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SessionStatusResponse {
    pub attempt_id: Uuid,
    pub is_completed: bool,
    pub remaining_seconds: i64,
    pub deadline_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub answered_count: usize,
    pub total_questions: usize,
}

impl From<SessionStatus> for SessionStatusResponse {
    fn from(s: SessionStatus) -> Self {
        Self {
            attempt_id: s.attempt_id,
            is_completed: s.is_completed,
            remaining_seconds: s.remaining_seconds,
            deadline_at: s.deadline_at,
            time_spent_seconds: s.time_spent_seconds,
            answered_count: s.answered_count,
            total_questions: s.total_questions,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AttemptResultResponse {
    pub attempt_id: Uuid,
    pub assessment_id: Uuid,
    pub title: String,
    pub score: ScoreSummary,
    pub submission: SubmissionKind,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub review: Vec<QuestionReview>,
}

impl From<ScoredAttempt> for AttemptResultResponse {
    fn from(r: ScoredAttempt) -> Self {
        Self {
            attempt_id: r.attempt_id,
            assessment_id: r.assessment_id,
            title: r.title,
            score: r.score,
            submission: r.submission,
            started_at: r.started_at,
            completed_at: r.completed_at,
            time_spent_seconds: r.time_spent_seconds,
            review: r.review,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WindowQuery {
    /// Evaluate as of this instant instead of the server clock.
    pub at: Option<DateTime<Utc>>,
}
