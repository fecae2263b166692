use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::database::repository::{AssessmentStore, AttemptStore};
use crate::error::{Error, IneligibleReason, Result};
use crate::models::assessment::{Assessment, AssessmentKind};
use crate::models::attempt::{
    AnswerSlot, Attempt, AttemptPatch, Completion, ScoreSummary, SubmissionKind,
};
use crate::models::question::{PublicQuestion, Question};
use crate::services::entitlement_service::{AlwaysEntitled, EntitlementCheck};
use crate::services::grading_service::{GradingService, QuestionReview};
use crate::services::window_service::{WindowEvaluation, WindowService};
use crate::utils::time::Clock;

/// Optimistic writes are retried this many times before surfacing `Conflict`.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Slack after the computed deadline during which writes are still accepted.
    pub submit_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            submit_grace: Duration::seconds(30),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            submit_grace: Duration::seconds(config.submit_grace_seconds.max(0)),
        }
    }
}

/// Everything the client holds while an attempt is open.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSnapshot {
    pub answers: Vec<AnswerSlot>,
    pub flagged: BTreeSet<usize>,
    pub time_spent_seconds: i64,
}

impl AnswerSnapshot {
    pub fn of(attempt: &Attempt) -> Self {
        Self {
            answers: attempt.answers.clone(),
            flagged: attempt.flagged.clone(),
            time_spent_seconds: attempt.time_spent_seconds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionStart {
    pub attempt: Attempt,
    pub resumed: bool,
    pub remaining_seconds: i64,
    pub questions: Vec<PublicQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatAck {
    /// False when the snapshot was not written: sealed, past the deadline, or
    /// older than what is stored.
    pub accepted: bool,
    pub is_completed: bool,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub attempt_id: Uuid,
    pub is_completed: bool,
    pub remaining_seconds: i64,
    pub deadline_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub answered_count: usize,
    pub total_questions: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredAttempt {
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

/// Attempt lifecycle for every assessment kind: start/resume, answer
/// recording, heartbeats, submission and timeout sealing.
#[derive(Clone)]
pub struct SessionService {
    attempts: Arc<dyn AttemptStore>,
    assessments: Arc<dyn AssessmentStore>,
    clock: Arc<dyn Clock>,
    default_entitlement: Arc<dyn EntitlementCheck>,
    entitlements: Arc<HashMap<AssessmentKind, Arc<dyn EntitlementCheck>>>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(
        attempts: Arc<dyn AttemptStore>,
        assessments: Arc<dyn AssessmentStore>,
        clock: Arc<dyn Clock>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            attempts,
            assessments,
            clock,
            default_entitlement: Arc::new(AlwaysEntitled),
            entitlements: Arc::new(HashMap::new()),
            settings,
        }
    }

    /// Gate starts of `kind` behind `check`. Kinds without a check are free.
    pub fn with_entitlement(
        mut self,
        kind: AssessmentKind,
        check: Arc<dyn EntitlementCheck>,
    ) -> Self {
        Arc::make_mut(&mut self.entitlements).insert(kind, check);
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings
    }

    fn entitlement_for(&self, kind: AssessmentKind) -> &Arc<dyn EntitlementCheck> {
        self.entitlements
            .get(&kind)
            .unwrap_or(&self.default_entitlement)
    }

    fn past_grace(&self, attempt: &Attempt, now: DateTime<Utc>) -> bool {
        now > attempt.deadline_at + self.settings.submit_grace
    }

    async fn load_assessment(&self, assessment_id: Uuid) -> Result<Assessment> {
        self.assessments
            .get(assessment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Assessment {} not found", assessment_id)))
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.attempts
            .get_by_id(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    async fn load_owned_attempt(&self, user_id: &str, attempt_id: Uuid) -> Result<Attempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.user_id != user_id {
            tracing::warn!(
                attempt_id = %attempt_id,
                requested_by = %user_id,
                "Cross-user attempt access rejected"
            );
            return Err(Error::AccessDenied(format!(
                "Attempt {} belongs to another user",
                attempt_id
            )));
        }
        Ok(attempt)
    }

    /// Questions drawn into `attempt`, in presentation order.
    fn drawn_questions(assessment: &Assessment, attempt: &Attempt) -> Result<Vec<Question>> {
        attempt
            .question_ids
            .iter()
            .map(|id| {
                assessment.question(*id).cloned().ok_or_else(|| {
                    Error::Internal(format!(
                        "Question {} of attempt {} is no longer part of assessment {}",
                        id, attempt.id, assessment.id
                    ))
                })
            })
            .collect()
    }

    fn draw_question_ids(assessment: &Assessment) -> Vec<i32> {
        let mut ids: Vec<i32> = assessment.questions.iter().map(|q| q.id).collect();
        if assessment.shuffle_questions {
            ids.shuffle(&mut rand::thread_rng());
        }
        ids.truncate(assessment.draw_size());
        ids
    }

    fn check_question_index(attempt: &Attempt, question_index: usize) -> Result<()> {
        if question_index >= attempt.total_questions() {
            return Err(Error::InvalidIndex(format!(
                "Question index {} is outside 0..{}",
                question_index,
                attempt.total_questions()
            )));
        }
        Ok(())
    }

    fn check_option(question: &Question, question_index: usize, option: AnswerSlot) -> Result<()> {
        match option {
            Some(opt) if !question.has_option(opt) => Err(Error::InvalidIndex(format!(
                "Option {} is outside 0..{} for question index {}",
                opt,
                question.options.len(),
                question_index
            ))),
            _ => Ok(()),
        }
    }

    fn check_snapshot(questions: &[Question], snapshot: &AnswerSnapshot) -> Result<()> {
        if snapshot.answers.len() != questions.len() {
            return Err(Error::InvalidIndex(format!(
                "Expected {} answer slots, got {}",
                questions.len(),
                snapshot.answers.len()
            )));
        }
        for (idx, (question, answer)) in questions.iter().zip(&snapshot.answers).enumerate() {
            Self::check_option(question, idx, *answer)?;
        }
        if let Some(bad) = snapshot.flagged.iter().find(|i| **i >= questions.len()) {
            return Err(Error::InvalidIndex(format!(
                "Flagged index {} is outside 0..{}",
                bad,
                questions.len()
            )));
        }
        if snapshot.time_spent_seconds < 0 {
            return Err(Error::BadRequest("time_spent_seconds must not be negative".into()));
        }
        Ok(())
    }

    /// Read-modify-write on an open attempt with optimistic versioning.
    async fn write_open<F>(
        &self,
        user_id: &str,
        attempt_id: Uuid,
        now: DateTime<Utc>,
        build: F,
    ) -> Result<Attempt>
    where
        F: Fn(&Attempt) -> Result<AttemptPatch> + Send + Sync,
    {
        let mut tries = 0;
        loop {
            tries += 1;
            let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
            if attempt.is_completed {
                return Err(Error::AttemptCompleted);
            }
            if self.past_grace(&attempt, now) {
                return Err(Error::DeadlinePassed);
            }
            let patch = build(&attempt)?;
            match self
                .attempts
                .update(attempt_id, Some(attempt.version), patch)
                .await
            {
                Err(Error::Conflict(msg)) if tries < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt_id = %attempt_id, "Retrying stale write: {}", msg);
                }
                other => return other,
            }
        }
    }

    /// Seal an open attempt. Re-reads on version conflicts; an attempt sealed
    /// by someone else in the meantime is returned as stored.
    async fn seal(
        &self,
        mut attempt: Attempt,
        assessment: &Assessment,
        snapshot: Option<AnswerSnapshot>,
        submission: SubmissionKind,
        now: DateTime<Utc>,
    ) -> Result<Attempt> {
        let questions = Self::drawn_questions(assessment, &attempt)?;
        let mut tries = 0;
        loop {
            if attempt.is_completed {
                return Ok(attempt);
            }
            tries += 1;

            let (answers, flagged, time_spent) = match &snapshot {
                Some(s) => (s.answers.clone(), s.flagged.clone(), s.time_spent_seconds),
                None => {
                    let elapsed = (now.min(attempt.deadline_at) - attempt.started_at)
                        .num_seconds()
                        .max(0);
                    (
                        attempt.answers.clone(),
                        attempt.flagged.clone(),
                        attempt.time_spent_seconds.max(elapsed),
                    )
                }
            };
            let score = GradingService::score(&questions, &answers);
            let patch = AttemptPatch {
                answers: Some(answers),
                flagged: Some(flagged),
                time_spent_seconds: Some(time_spent),
                last_heartbeat_at: None,
                completion: Some(Completion {
                    completed_at: now,
                    submission,
                    score,
                }),
            };

            match self
                .attempts
                .update(attempt.id, Some(attempt.version), patch)
                .await
            {
                Ok(sealed) => {
                    tracing::info!(
                        attempt_id = %sealed.id,
                        user_id = %sealed.user_id,
                        submission = submission.as_str(),
                        correct = score.correct_count,
                        unanswered = score.unanswered_count,
                        percentage = score.percentage,
                        "Attempt sealed"
                    );
                    return Ok(sealed);
                }
                Err(Error::Conflict(_)) | Err(Error::AttemptCompleted)
                    if tries < MAX_WRITE_ATTEMPTS =>
                {
                    attempt = self.load_attempt(attempt.id).await?;
                }
                Err(Error::AttemptCompleted) => return self.load_attempt(attempt.id).await,
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn evaluate_window(
        &self,
        assessment_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<WindowEvaluation> {
        let assessment = self.load_assessment(assessment_id).await?;
        Ok(WindowService::evaluate(&assessment, now))
    }

    async fn check_entitlement(
        &self,
        user_id: &str,
        assessment: &Assessment,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let check = self.entitlement_for(assessment.kind);
        if !check.is_entitled(user_id, assessment.id).await? {
            return Err(Error::NotEligible(IneligibleReason::Unentitled));
        }
        if let Some(expires_at) = check.expiry(user_id, assessment.id).await? {
            if expires_at <= now {
                return Err(Error::NotEligible(IneligibleReason::EntitlementExpired));
            }
        }
        Ok(())
    }

    async fn resume(
        &self,
        open: Attempt,
        assessment: &Assessment,
        now: DateTime<Utc>,
    ) -> Result<SessionStart> {
        let questions = Self::drawn_questions(assessment, &open)?
            .iter()
            .map(Question::to_public)
            .collect();

        if self.past_grace(&open, now) {
            tracing::info!(attempt_id = %open.id, "Resumed attempt is past its deadline, sealing");
            let sealed = self
                .seal(open, assessment, None, SubmissionKind::Timeout, now)
                .await?;
            return Ok(SessionStart {
                attempt: sealed,
                resumed: true,
                remaining_seconds: 0,
                questions,
            });
        }

        tracing::info!(attempt_id = %open.id, user_id = %open.user_id, "Attempt resumed");
        let remaining_seconds = WindowService::remaining_for_attempt(assessment, open.deadline_at, now);
        Ok(SessionStart {
            attempt: open,
            resumed: true,
            remaining_seconds,
            questions,
        })
    }

    /// Start a new attempt, or hand back the open one. Never creates a second
    /// open attempt for the same pair.
    pub async fn start_or_resume(&self, user_id: &str, assessment_id: Uuid) -> Result<SessionStart> {
        let now = self.clock.now();
        let assessment = self.load_assessment(assessment_id).await?;
        if !assessment.is_open_for_entry() {
            return Err(Error::NotEligible(IneligibleReason::Inactive));
        }

        if let Some(open) = self.attempts.get_open_attempt(user_id, assessment_id).await? {
            return self.resume(open, &assessment, now).await;
        }

        let window = WindowService::evaluate(&assessment, now);
        if let Some(reason) = window.ineligible_reason() {
            tracing::info!(
                assessment_id = %assessment_id,
                user_id = %user_id,
                reason = reason.as_str(),
                "Start refused"
            );
            return Err(Error::NotEligible(reason));
        }
        self.check_entitlement(user_id, &assessment, now).await?;

        let question_ids = Self::draw_question_ids(&assessment);
        let deadline_at = now + Duration::seconds(window.remaining_seconds);
        let attempt = Attempt::new(user_id, assessment_id, question_ids, now, deadline_at);

        match self.attempts.create(&attempt).await {
            Ok(created) => {
                tracing::info!(
                    attempt_id = %created.id,
                    user_id = %user_id,
                    assessment_id = %assessment_id,
                    allotted_seconds = window.remaining_seconds,
                    "Attempt started"
                );
                let questions = Self::drawn_questions(&assessment, &created)?
                    .iter()
                    .map(Question::to_public)
                    .collect();
                Ok(SessionStart {
                    attempt: created,
                    resumed: false,
                    remaining_seconds: window.remaining_seconds,
                    questions,
                })
            }
            Err(Error::Conflict(msg)) => {
                // Lost a start race against another client of the same user.
                match self.attempts.get_open_attempt(user_id, assessment_id).await? {
                    Some(open) => self.resume(open, &assessment, now).await,
                    None => Err(Error::Conflict(msg)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn record_answer(
        &self,
        user_id: &str,
        attempt_id: Uuid,
        question_index: usize,
        option_index: AnswerSlot,
    ) -> Result<Attempt> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        Self::check_question_index(&attempt, question_index)?;
        let assessment = self.load_assessment(attempt.assessment_id).await?;
        let question_id = attempt.question_ids[question_index];
        let question = assessment.question(question_id).ok_or_else(|| {
            Error::Internal(format!("Question {} missing from assessment", question_id))
        })?;
        Self::check_option(question, question_index, option_index)?;

        self.write_open(user_id, attempt_id, now, |current| {
            let mut answers = current.answers.clone();
            answers[question_index] = option_index;
            Ok(AttemptPatch {
                answers: Some(answers),
                ..Default::default()
            })
        })
        .await
    }

    pub async fn toggle_flag(
        &self,
        user_id: &str,
        attempt_id: Uuid,
        question_index: usize,
    ) -> Result<Attempt> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        Self::check_question_index(&attempt, question_index)?;

        self.write_open(user_id, attempt_id, now, |current| {
            let mut flagged = current.flagged.clone();
            if !flagged.remove(&question_index) {
                flagged.insert(question_index);
            }
            Ok(AttemptPatch {
                flagged: Some(flagged),
                ..Default::default()
            })
        })
        .await
    }

    /// Persist the client's whole snapshot. Sealed or expired attempts are
    /// acknowledged without writing so the caller can stop or force-submit.
    /// A snapshot with less time spent than the stored one is out of date and
    /// is not applied.
    pub async fn heartbeat(
        &self,
        user_id: &str,
        attempt_id: Uuid,
        snapshot: AnswerSnapshot,
    ) -> Result<HeartbeatAck> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        if attempt.is_completed {
            return Ok(HeartbeatAck {
                accepted: false,
                is_completed: true,
                remaining_seconds: 0,
            });
        }
        if self.past_grace(&attempt, now) {
            return Ok(HeartbeatAck {
                accepted: false,
                is_completed: false,
                remaining_seconds: 0,
            });
        }

        let assessment = self.load_assessment(attempt.assessment_id).await?;
        let questions = Self::drawn_questions(&assessment, &attempt)?;
        Self::check_snapshot(&questions, &snapshot)?;

        let written = self
            .write_open(user_id, attempt_id, now, |current| {
                // Heartbeats can arrive out of order; time spent orders them.
                if snapshot.time_spent_seconds < current.time_spent_seconds {
                    return Err(Error::StaleSnapshot);
                }
                Ok(AttemptPatch {
                    answers: Some(snapshot.answers.clone()),
                    flagged: Some(snapshot.flagged.clone()),
                    time_spent_seconds: Some(snapshot.time_spent_seconds),
                    last_heartbeat_at: Some(now),
                    completion: None,
                })
            })
            .await;

        match written {
            Ok(updated) => Ok(HeartbeatAck {
                accepted: true,
                is_completed: false,
                remaining_seconds: WindowService::remaining_for_attempt(
                    &assessment,
                    updated.deadline_at,
                    now,
                ),
            }),
            Err(Error::AttemptCompleted) => Ok(HeartbeatAck {
                accepted: false,
                is_completed: true,
                remaining_seconds: 0,
            }),
            Err(Error::StaleSnapshot) => {
                tracing::debug!(
                    attempt_id = %attempt_id,
                    time_spent_seconds = snapshot.time_spent_seconds,
                    "Out-of-order heartbeat ignored"
                );
                Ok(HeartbeatAck {
                    accepted: false,
                    is_completed: false,
                    remaining_seconds: WindowService::remaining_for_attempt(
                        &assessment,
                        attempt.deadline_at,
                        now,
                    ),
                })
            }
            Err(Error::DeadlinePassed) => Ok(HeartbeatAck {
                accepted: false,
                is_completed: false,
                remaining_seconds: 0,
            }),
            Err(e) => {
                tracing::warn!(attempt_id = %attempt_id, "Heartbeat not persisted: {}", e);
                Err(e)
            }
        }
    }

    /// Seal with the client's final answers. Submitting a sealed attempt
    /// returns the stored result untouched.
    pub async fn submit(
        &self,
        user_id: &str,
        attempt_id: Uuid,
        snapshot: AnswerSnapshot,
    ) -> Result<Attempt> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        if attempt.is_completed {
            return Ok(attempt);
        }
        if self.past_grace(&attempt, now) {
            tracing::warn!(
                attempt_id = %attempt_id,
                deadline_at = %attempt.deadline_at,
                "Late submit rejected"
            );
            return Err(Error::DeadlinePassed);
        }

        let assessment = self.load_assessment(attempt.assessment_id).await?;
        let questions = Self::drawn_questions(&assessment, &attempt)?;
        Self::check_snapshot(&questions, &snapshot)?;

        let snapshot = AnswerSnapshot {
            time_spent_seconds: snapshot.time_spent_seconds.max(attempt.time_spent_seconds),
            ..snapshot
        };
        self.seal(attempt, &assessment, Some(snapshot), SubmissionKind::Manual, now)
            .await
    }

    /// Seal with the last persisted snapshot. Used when time runs out.
    pub async fn force_submit(&self, user_id: &str, attempt_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        if attempt.is_completed {
            return Ok(attempt);
        }
        let assessment = self.load_assessment(attempt.assessment_id).await?;
        self.seal(attempt, &assessment, None, SubmissionKind::Timeout, now)
            .await
    }

    /// Authoritative remaining time, re-evaluated against the window.
    pub async fn session_status(&self, user_id: &str, attempt_id: Uuid) -> Result<SessionStatus> {
        let now = self.clock.now();
        let attempt = self.load_owned_attempt(user_id, attempt_id).await?;
        let remaining_seconds = if attempt.is_completed {
            0
        } else {
            let assessment = self.load_assessment(attempt.assessment_id).await?;
            WindowService::remaining_for_attempt(&assessment, attempt.deadline_at, now)
        };
        Ok(SessionStatus {
            attempt_id: attempt.id,
            is_completed: attempt.is_completed,
            remaining_seconds,
            deadline_at: attempt.deadline_at,
            time_spent_seconds: attempt.time_spent_seconds,
            answered_count: attempt.answered_count(),
            total_questions: attempt.total_questions(),
        })
    }

    pub async fn get_result(
        &self,
        attempt_id: Uuid,
        requesting_user_id: &str,
    ) -> Result<ScoredAttempt> {
        let attempt = self
            .load_owned_attempt(requesting_user_id, attempt_id)
            .await?;
        let Some(completion) = attempt.completion.clone() else {
            return Err(Error::NotSubmitted);
        };
        let assessment = self.load_assessment(attempt.assessment_id).await?;
        let questions = Self::drawn_questions(&assessment, &attempt)?;

        Ok(ScoredAttempt {
            attempt_id: attempt.id,
            assessment_id: assessment.id,
            title: assessment.title,
            score: completion.score,
            submission: completion.submission,
            started_at: attempt.started_at,
            completed_at: completion.completed_at,
            time_spent_seconds: attempt.time_spent_seconds,
            review: GradingService::review(&questions, &attempt.answers),
        })
    }

    pub async fn list_attempts(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        self.load_assessment(assessment_id).await?;
        self.attempts.list_for_user(user_id, assessment_id).await
    }

    /// Make `assessment_id` the single active assessment of its kind.
    pub async fn activate(&self, assessment_id: Uuid) -> Result<Assessment> {
        let assessment = self.load_assessment(assessment_id).await?;
        for other in self.assessments.list_active(assessment.kind).await? {
            if other.id != assessment_id {
                self.assessments
                    .set_flags(other.id, Some(false), None)
                    .await?;
                tracing::info!(
                    assessment_id = %other.id,
                    kind = assessment.kind.as_str(),
                    "Deactivated previous assessment"
                );
            }
        }
        let activated = self
            .assessments
            .set_flags(assessment_id, Some(true), None)
            .await?;
        tracing::info!(assessment_id = %assessment_id, kind = activated.kind.as_str(), "Assessment activated");
        Ok(activated)
    }

    pub async fn deactivate(&self, assessment_id: Uuid) -> Result<Assessment> {
        self.assessments
            .set_flags(assessment_id, Some(false), None)
            .await
    }

    pub async fn set_master_enabled(&self, assessment_id: Uuid, enabled: bool) -> Result<Assessment> {
        self.assessments
            .set_flags(assessment_id, None, Some(enabled))
            .await
    }

    /// Seal every open attempt whose deadline and grace have both passed.
    /// Returns how many were sealed; individual failures are logged and
    /// picked up again on the next sweep.
    pub async fn expire_overdue(&self) -> Result<usize> {
        let now = self.clock.now();
        let overdue = self
            .attempts
            .list_overdue(now - self.settings.submit_grace)
            .await?;

        let mut sealed = 0;
        for attempt in overdue {
            let attempt_id = attempt.id;
            let result = match self.load_assessment(attempt.assessment_id).await {
                Ok(assessment) => {
                    self.seal(attempt, &assessment, None, SubmissionKind::Timeout, now)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(_) => sealed += 1,
                Err(e) => tracing::error!(attempt_id = %attempt_id, "Failed to expire attempt: {}", e),
            }
        }
        if sealed > 0 {
            tracing::info!("Deadline sweep sealed {} attempt(s)", sealed);
        }
        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;
    use crate::models::assessment::Scheduling;
    use crate::services::entitlement_service::MockEntitlementCheck;
    use crate::utils::time::ManualClock;
    use chrono::TimeZone;

    fn assessment() -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            kind: AssessmentKind::RmExam,
            title: "RM mock".into(),
            questions: (0..4)
                .map(|i| Question {
                    id: i + 1,
                    text: format!("Q{}", i + 1),
                    options: vec!["a".into(), "b".into(), "c".into()],
                    correct_option_index: 0,
                    explanation: None,
                })
                .collect(),
            exam_duration_minutes: 30,
            total_questions: 4,
            scheduling: Scheduling::Unscheduled,
            shuffle_questions: false,
            is_active: true,
            master_enabled: true,
        }
    }

    async fn service_with(check: MockEntitlementCheck) -> (SessionService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let a = assessment();
        let id = a.id;
        store.insert_assessment(a).await;
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap(),
        ));
        let service = SessionService::new(store.clone(), store, clock, SessionSettings::default())
            .with_entitlement(AssessmentKind::RmExam, Arc::new(check));
        (service, id)
    }

    #[tokio::test]
    async fn unentitled_user_is_refused_with_reason() {
        let mut check = MockEntitlementCheck::new();
        check.expect_is_entitled().returning(|_, _| Ok(false));
        let (service, id) = service_with(check).await;

        let err = service.start_or_resume("u1", id).await.unwrap_err();
        assert!(matches!(err, Error::NotEligible(IneligibleReason::Unentitled)));
    }

    #[tokio::test]
    async fn expired_entitlement_is_refused() {
        let mut check = MockEntitlementCheck::new();
        check.expect_is_entitled().returning(|_, _| Ok(true));
        check
            .expect_expiry()
            .returning(|_, _| Ok(Some(Utc.with_ymd_and_hms(2026, 5, 31, 0, 0, 0).unwrap())));
        let (service, id) = service_with(check).await;

        let err = service.start_or_resume("u1", id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotEligible(IneligibleReason::EntitlementExpired)
        ));
    }

    #[tokio::test]
    async fn entitlement_is_not_consulted_on_resume() {
        let mut check = MockEntitlementCheck::new();
        check.expect_is_entitled().times(1).returning(|_, _| Ok(true));
        check.expect_expiry().times(1).returning(|_, _| Ok(None));
        let (service, id) = service_with(check).await;

        let first = service.start_or_resume("u1", id).await.unwrap();
        let second = service.start_or_resume("u1", id).await.unwrap();
        assert_eq!(first.attempt.id, second.attempt.id);
        assert!(second.resumed);
    }

    #[test]
    fn draw_respects_total_questions() {
        let mut a = assessment();
        a.total_questions = 2;
        assert_eq!(SessionService::draw_question_ids(&a), vec![1, 2]);

        a.total_questions = 10;
        assert_eq!(SessionService::draw_question_ids(&a).len(), 4);

        a.total_questions = 3;
        a.shuffle_questions = true;
        let drawn = SessionService::draw_question_ids(&a);
        assert_eq!(drawn.len(), 3);
        let unique: BTreeSet<_> = drawn.iter().collect();
        assert_eq!(unique.len(), 3);
    }
}
