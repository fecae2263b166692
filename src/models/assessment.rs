use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::question::Question;

/// The product line an assessment belongs to. At most one assessment per
/// kind is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentKind {
    Weekly,
    RmExam,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Weekly => "weekly",
            AssessmentKind::RmExam => "rm_exam",
        }
    }
}

impl std::str::FromStr for AssessmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(AssessmentKind::Weekly),
            "rm_exam" => Ok(AssessmentKind::RmExam),
            other => Err(format!("unknown assessment kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Scheduling {
    /// Enterable whenever the assessment is active.
    Unscheduled,
    /// Shared entry window; `window_duration_minutes >= exam_duration_minutes`.
    Scheduled {
        window_opens_at: DateTime<Utc>,
        window_duration_minutes: i32,
    },
}

impl Scheduling {
    pub fn window_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            Scheduling::Unscheduled => None,
            Scheduling::Scheduled {
                window_opens_at,
                window_duration_minutes,
            } => Some((
                *window_opens_at,
                *window_opens_at + Duration::minutes(*window_duration_minutes as i64),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: Uuid,
    pub kind: AssessmentKind,
    pub title: String,
    pub questions: Vec<Question>,
    pub exam_duration_minutes: i32,
    pub total_questions: i32,
    pub scheduling: Scheduling,
    #[serde(default)]
    pub shuffle_questions: bool,
    pub is_active: bool,
    pub master_enabled: bool,
}

impl Assessment {
    /// Both gates must be open before anyone can start or resume.
    pub fn is_open_for_entry(&self) -> bool {
        self.is_active && self.master_enabled
    }

    pub fn exam_duration_seconds(&self) -> i64 {
        self.exam_duration_minutes.max(0) as i64 * 60
    }

    /// Number of questions an attempt draws, never more than the pool holds.
    pub fn draw_size(&self) -> usize {
        (self.total_questions.max(0) as usize).min(self.questions.len())
    }

    pub fn question(&self, id: i32) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}
