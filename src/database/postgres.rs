use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::repository::{AssessmentStore, AttemptStore};
use crate::error::{Error, Result};
use crate::models::assessment::{Assessment, AssessmentKind, Scheduling};
use crate::models::attempt::{AnswerSlot, Attempt, AttemptPatch, Completion, ScoreSummary};
use crate::models::question::Question;
use crate::services::entitlement_service::EntitlementCheck;

const ATTEMPT_COLUMNS: &str = r#"
    id, user_id, assessment_id, question_ids, answers, flagged,
    started_at, deadline_at, completed_at, time_spent_seconds, is_completed,
    submission, correct_count, wrong_count, unanswered_count, percentage,
    last_heartbeat_at, version
"#;

const ASSESSMENT_COLUMNS: &str = r#"
    id, kind, title, questions, exam_duration_minutes, total_questions,
    window_opens_at, window_duration_minutes, shuffle_questions, is_active, master_enabled
"#;

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    user_id: String,
    assessment_id: Uuid,
    question_ids: Json<Vec<i32>>,
    answers: Json<Vec<AnswerSlot>>,
    flagged: Json<BTreeSet<usize>>,
    started_at: DateTime<Utc>,
    deadline_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    time_spent_seconds: i64,
    is_completed: bool,
    submission: Option<String>,
    correct_count: Option<i32>,
    wrong_count: Option<i32>,
    unanswered_count: Option<i32>,
    percentage: Option<i32>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    version: i64,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = Error;

    fn try_from(row: AttemptRow) -> Result<Self> {
        let completion = match (row.completed_at, row.submission) {
            (Some(completed_at), Some(submission)) if row.is_completed => Some(Completion {
                completed_at,
                submission: submission.parse().map_err(Error::Internal)?,
                score: ScoreSummary {
                    correct_count: row.correct_count.unwrap_or(0),
                    wrong_count: row.wrong_count.unwrap_or(0),
                    unanswered_count: row.unanswered_count.unwrap_or(0),
                    percentage: row.percentage.unwrap_or(0),
                },
            }),
            _ if row.is_completed => {
                return Err(Error::Internal(format!(
                    "Attempt {} is completed but has no completion record",
                    row.id
                )))
            }
            _ => None,
        };

        Ok(Attempt {
            id: row.id,
            user_id: row.user_id,
            assessment_id: row.assessment_id,
            question_ids: row.question_ids.0,
            answers: row.answers.0,
            flagged: row.flagged.0,
            started_at: row.started_at,
            deadline_at: row.deadline_at,
            time_spent_seconds: row.time_spent_seconds,
            is_completed: row.is_completed,
            completion,
            last_heartbeat_at: row.last_heartbeat_at,
            version: row.version,
        })
    }
}

#[derive(Debug, FromRow)]
struct AssessmentRow {
    id: Uuid,
    kind: String,
    title: String,
    questions: Json<Vec<Question>>,
    exam_duration_minutes: i32,
    total_questions: i32,
    window_opens_at: Option<DateTime<Utc>>,
    window_duration_minutes: Option<i32>,
    shuffle_questions: bool,
    is_active: bool,
    master_enabled: bool,
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = Error;

    fn try_from(row: AssessmentRow) -> Result<Self> {
        let scheduling = match (row.window_opens_at, row.window_duration_minutes) {
            (Some(window_opens_at), Some(window_duration_minutes)) => Scheduling::Scheduled {
                window_opens_at,
                window_duration_minutes,
            },
            _ => Scheduling::Unscheduled,
        };
        Ok(Assessment {
            id: row.id,
            kind: row.kind.parse::<AssessmentKind>().map_err(Error::Internal)?,
            title: row.title,
            questions: row.questions.0,
            exam_duration_minutes: row.exam_duration_minutes,
            total_questions: row.total_questions,
            scheduling,
            shuffle_questions: row.shuffle_questions,
            is_active: row.is_active,
            master_enabled: row.master_enabled,
        })
    }
}

/// PostgreSQL-backed stores and access grants.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_attempts(&self, sql: &str, binds: AttemptQuery<'_>) -> Result<Vec<Attempt>> {
        let query = sqlx::query_as::<_, AttemptRow>(sql);
        let rows = match binds {
            AttemptQuery::Cutoff(cutoff) => query.bind(cutoff).fetch_all(&self.pool).await?,
            AttemptQuery::Pair(user_id, assessment_id) => {
                query
                    .bind(user_id)
                    .bind(assessment_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Attempt::try_from).collect()
    }
}

enum AttemptQuery<'a> {
    Cutoff(DateTime<Utc>),
    Pair(&'a str, Uuid),
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn create(&self, attempt: &Attempt) -> Result<Attempt> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"
            INSERT INTO attempts (
                id, user_id, assessment_id, question_ids, answers, flagged,
                started_at, deadline_at, time_spent_seconds, is_completed, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, 0)
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(attempt.id)
        .bind(&attempt.user_id)
        .bind(attempt.assessment_id)
        .bind(Json(&attempt.question_ids))
        .bind(Json(&attempt.answers))
        .bind(Json(&attempt.flagged))
        .bind(attempt.started_at)
        .bind(attempt.deadline_at)
        .bind(attempt.time_spent_seconds)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_by_id(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {} FROM attempts WHERE id = $1",
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn get_open_attempt(
        &self,
        user_id: &str,
        assessment_id: Uuid,
    ) -> Result<Option<Attempt>> {
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"SELECT {} FROM attempts
               WHERE user_id = $1 AND assessment_id = $2 AND is_completed = FALSE
               ORDER BY started_at DESC
               LIMIT 1"#,
            ATTEMPT_COLUMNS
        ))
        .bind(user_id)
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn update(
        &self,
        attempt_id: Uuid,
        expected_version: Option<i64>,
        patch: AttemptPatch,
    ) -> Result<Attempt> {
        let completion = patch.completion.as_ref();
        let row = sqlx::query_as::<_, AttemptRow>(&format!(
            r#"
            UPDATE attempts SET
                answers = COALESCE($3, answers),
                flagged = COALESCE($4, flagged),
                time_spent_seconds = GREATEST(time_spent_seconds, COALESCE($5, time_spent_seconds)),
                last_heartbeat_at = COALESCE($6, last_heartbeat_at),
                is_completed = $7,
                completed_at = COALESCE($8, completed_at),
                submission = COALESCE($9, submission),
                correct_count = COALESCE($10, correct_count),
                wrong_count = COALESCE($11, wrong_count),
                unanswered_count = COALESCE($12, unanswered_count),
                percentage = COALESCE($13, percentage),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
              AND is_completed = FALSE
              AND ($2::BIGINT IS NULL OR version = $2)
            RETURNING {}
            "#,
            ATTEMPT_COLUMNS
        ))
        .bind(attempt_id)
        .bind(expected_version)
        .bind(patch.answers.as_ref().map(Json))
        .bind(patch.flagged.as_ref().map(Json))
        .bind(patch.time_spent_seconds)
        .bind(patch.last_heartbeat_at)
        .bind(completion.is_some())
        .bind(completion.map(|c| c.completed_at))
        .bind(completion.map(|c| c.submission.as_str()))
        .bind(completion.map(|c| c.score.correct_count))
        .bind(completion.map(|c| c.score.wrong_count))
        .bind(completion.map(|c| c.score.unanswered_count))
        .bind(completion.map(|c| c.score.percentage))
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Nothing matched: work out which guard refused the write.
        let state: Option<(bool, i64)> =
            sqlx::query_as("SELECT is_completed, version FROM attempts WHERE id = $1")
                .bind(attempt_id)
                .fetch_optional(&self.pool)
                .await?;
        match state {
            None => Err(Error::NotFound(format!("Attempt {} not found", attempt_id))),
            Some((true, _)) => Err(Error::AttemptCompleted),
            Some((false, version)) => Err(Error::Conflict(format!(
                "Attempt {} is at version {}, expected {:?}",
                attempt_id, version, expected_version
            ))),
        }
    }

    async fn list_overdue(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        self.fetch_attempts(
            &format!(
                r#"SELECT {} FROM attempts
                   WHERE is_completed = FALSE AND deadline_at <= $1
                   ORDER BY deadline_at ASC"#,
                ATTEMPT_COLUMNS
            ),
            AttemptQuery::Cutoff(cutoff),
        )
        .await
    }

    async fn list_for_user(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        self.fetch_attempts(
            &format!(
                r#"SELECT {} FROM attempts
                   WHERE user_id = $1 AND assessment_id = $2
                   ORDER BY started_at DESC"#,
                ATTEMPT_COLUMNS
            ),
            AttemptQuery::Pair(user_id, assessment_id),
        )
        .await
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn get(&self, assessment_id: Uuid) -> Result<Option<Assessment>> {
        let row = sqlx::query_as::<_, AssessmentRow>(&format!(
            "SELECT {} FROM assessments WHERE id = $1",
            ASSESSMENT_COLUMNS
        ))
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Assessment::try_from).transpose()
    }

    async fn list_active(&self, kind: AssessmentKind) -> Result<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, AssessmentRow>(&format!(
            "SELECT {} FROM assessments WHERE kind = $1 AND is_active = TRUE",
            ASSESSMENT_COLUMNS
        ))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Assessment::try_from).collect()
    }

    async fn set_flags(
        &self,
        assessment_id: Uuid,
        is_active: Option<bool>,
        master_enabled: Option<bool>,
    ) -> Result<Assessment> {
        let row = sqlx::query_as::<_, AssessmentRow>(&format!(
            r#"
            UPDATE assessments
            SET is_active = COALESCE($2, is_active),
                master_enabled = COALESCE($3, master_enabled),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ASSESSMENT_COLUMNS
        ))
        .bind(assessment_id)
        .bind(is_active)
        .bind(master_enabled)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Assessment {} not found", assessment_id)))?;
        row.try_into()
    }
}

#[async_trait]
impl EntitlementCheck for PgStore {
    async fn is_entitled(&self, user_id: &str, assessment_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (
                SELECT 1 FROM access_grants
                WHERE user_id = $1 AND assessment_id = $2 AND revoked = FALSE
            )"#,
        )
        .bind(user_id)
        .bind(assessment_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn expiry(&self, user_id: &str, assessment_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        // A grant without an expiry outranks any dated one.
        let expires_at: Option<Option<DateTime<Utc>>> = sqlx::query_scalar(
            r#"SELECT expires_at FROM access_grants
               WHERE user_id = $1 AND assessment_id = $2 AND revoked = FALSE
               ORDER BY expires_at DESC NULLS FIRST
               LIMIT 1"#,
        )
        .bind(user_id)
        .bind(assessment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(expires_at.flatten())
    }
}
