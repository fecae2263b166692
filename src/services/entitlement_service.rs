use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

/// Answers "may this user start this assessment" on behalf of the payment
/// and access-grant subsystem.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntitlementCheck: Send + Sync {
    async fn is_entitled(&self, user_id: &str, assessment_id: Uuid) -> Result<bool>;

    /// When the user's access ends, if it ends at all.
    async fn expiry(&self, user_id: &str, assessment_id: Uuid) -> Result<Option<DateTime<Utc>>>;
}

/// Free assessments: everyone may enter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEntitled;

#[async_trait]
impl EntitlementCheck for AlwaysEntitled {
    async fn is_entitled(&self, _user_id: &str, _assessment_id: Uuid) -> Result<bool> {
        Ok(true)
    }

    async fn expiry(&self, _user_id: &str, _assessment_id: Uuid) -> Result<Option<DateTime<Utc>>> {
        Ok(None)
    }
}
