//! Narrow persistence interfaces the session engine talks to.
//!
//! Every operation is atomic on a single record; nothing here spans records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::assessment::{Assessment, AssessmentKind};
use crate::models::attempt::{Attempt, AttemptPatch};

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Insert a new attempt. Fails with `Conflict` if the pair already has an
    /// open attempt.
    async fn create(&self, attempt: &Attempt) -> Result<Attempt>;

    async fn get_by_id(&self, attempt_id: Uuid) -> Result<Option<Attempt>>;

    async fn get_open_attempt(&self, user_id: &str, assessment_id: Uuid)
        -> Result<Option<Attempt>>;

    /// Apply `patch` and bump the version.
    ///
    /// Fails with `NotFound` for an unknown id, `AttemptCompleted` once the
    /// attempt is sealed, and `Conflict` when `expected_version` is given and
    /// no longer matches.
    async fn update(
        &self,
        attempt_id: Uuid,
        expected_version: Option<i64>,
        patch: AttemptPatch,
    ) -> Result<Attempt>;

    /// Open attempts whose deadline is at or before `cutoff`.
    async fn list_overdue(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>>;

    /// All attempts of a user on one assessment, newest first.
    async fn list_for_user(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>>;
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn get(&self, assessment_id: Uuid) -> Result<Option<Assessment>>;

    async fn list_active(&self, kind: AssessmentKind) -> Result<Vec<Assessment>>;

    /// Update the activation gates; `None` leaves a flag unchanged.
    async fn set_flags(
        &self,
        assessment_id: Uuid,
        is_active: Option<bool>,
        master_enabled: Option<bool>,
    ) -> Result<Assessment>;
}
