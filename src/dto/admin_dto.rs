use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::assessment::{Assessment, AssessmentKind};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, utoipa::ToSchema)]
pub struct MasterSwitchRequest {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AssessmentFlagsResponse {
    pub id: Uuid,
    pub kind: AssessmentKind,
    pub title: String,
    pub is_active: bool,
    pub master_enabled: bool,
}

impl From<Assessment> for AssessmentFlagsResponse {
    fn from(a: Assessment) -> Self {
        Self {
            id: a.id,
            kind: a.kind,
            title: a.title,
            is_active: a.is_active,
            master_enabled: a.master_enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct SweepResponse {
    pub sealed: usize,
}
