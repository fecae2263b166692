//! In-process store used by tests and local runs without PostgreSQL.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::repository::{AssessmentStore, AttemptStore};
use crate::error::{Error, Result};
use crate::models::assessment::{Assessment, AssessmentKind};
use crate::models::attempt::{Attempt, AttemptPatch};
use crate::services::entitlement_service::EntitlementCheck;

#[derive(Debug, Default)]
pub struct MemoryStore {
    assessments: RwLock<HashMap<Uuid, Assessment>>,
    attempts: RwLock<HashMap<Uuid, Attempt>>,
    /// (user, assessment) -> optional expiry.
    grants: RwLock<HashMap<(String, Uuid), Option<DateTime<Utc>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_assessment(&self, assessment: Assessment) {
        self.assessments
            .write()
            .await
            .insert(assessment.id, assessment);
    }

    pub async fn grant_access(
        &self,
        user_id: &str,
        assessment_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) {
        self.grants
            .write()
            .await
            .insert((user_id.to_string(), assessment_id), expires_at);
    }

    pub async fn revoke_access(&self, user_id: &str, assessment_id: Uuid) {
        self.grants
            .write()
            .await
            .remove(&(user_id.to_string(), assessment_id));
    }

    pub async fn attempt_count(&self) -> usize {
        self.attempts.read().await.len()
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn create(&self, attempt: &Attempt) -> Result<Attempt> {
        let mut attempts = self.attempts.write().await;
        let duplicate = attempts.values().any(|a| {
            !a.is_completed && a.user_id == attempt.user_id && a.assessment_id == attempt.assessment_id
        });
        if duplicate {
            return Err(Error::Conflict(format!(
                "User {} already has an open attempt on assessment {}",
                attempt.user_id, attempt.assessment_id
            )));
        }
        if attempts.contains_key(&attempt.id) {
            return Err(Error::Conflict(format!("Attempt {} already exists", attempt.id)));
        }
        attempts.insert(attempt.id, attempt.clone());
        Ok(attempt.clone())
    }

    async fn get_by_id(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.attempts.read().await.get(&attempt_id).cloned())
    }

    async fn get_open_attempt(
        &self,
        user_id: &str,
        assessment_id: Uuid,
    ) -> Result<Option<Attempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .values()
            .find(|a| !a.is_completed && a.user_id == user_id && a.assessment_id == assessment_id)
            .cloned())
    }

    async fn update(
        &self,
        attempt_id: Uuid,
        expected_version: Option<i64>,
        patch: AttemptPatch,
    ) -> Result<Attempt> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .get_mut(&attempt_id)
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))?;

        if attempt.is_completed {
            return Err(Error::AttemptCompleted);
        }
        if let Some(expected) = expected_version {
            if attempt.version != expected {
                return Err(Error::Conflict(format!(
                    "Attempt {} is at version {}, expected {}",
                    attempt_id, attempt.version, expected
                )));
            }
        }

        attempt.apply(patch);
        Ok(attempt.clone())
    }

    async fn list_overdue(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        let mut overdue: Vec<Attempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| !a.is_completed && a.deadline_at <= cutoff)
            .cloned()
            .collect();
        overdue.sort_by_key(|a| a.deadline_at);
        Ok(overdue)
    }

    async fn list_for_user(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        let mut rows: Vec<Attempt> = self
            .attempts
            .read()
            .await
            .values()
            .filter(|a| a.user_id == user_id && a.assessment_id == assessment_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(rows)
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn get(&self, assessment_id: Uuid) -> Result<Option<Assessment>> {
        Ok(self.assessments.read().await.get(&assessment_id).cloned())
    }

    async fn list_active(&self, kind: AssessmentKind) -> Result<Vec<Assessment>> {
        Ok(self
            .assessments
            .read()
            .await
            .values()
            .filter(|a| a.kind == kind && a.is_active)
            .cloned()
            .collect())
    }

    async fn set_flags(
        &self,
        assessment_id: Uuid,
        is_active: Option<bool>,
        master_enabled: Option<bool>,
    ) -> Result<Assessment> {
        let mut assessments = self.assessments.write().await;
        let assessment = assessments
            .get_mut(&assessment_id)
            .ok_or_else(|| Error::NotFound(format!("Assessment {} not found", assessment_id)))?;
        if let Some(active) = is_active {
            assessment.is_active = active;
        }
        if let Some(enabled) = master_enabled {
            assessment.master_enabled = enabled;
        }
        Ok(assessment.clone())
    }
}

#[async_trait]
impl EntitlementCheck for MemoryStore {
    async fn is_entitled(&self, user_id: &str, assessment_id: Uuid) -> Result<bool> {
        Ok(self
            .grants
            .read()
            .await
            .contains_key(&(user_id.to_string(), assessment_id)))
    }

    async fn expiry(&self, user_id: &str, assessment_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .grants
            .read()
            .await
            .get(&(user_id.to_string(), assessment_id))
            .copied()
            .flatten())
    }
}
