use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-question answer slot: the chosen option index, or `None` while unanswered.
pub type AnswerSlot = Option<i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// The entrant pressed submit.
    Manual,
    /// The allotted time or the window ran out.
    Timeout,
}

impl SubmissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionKind::Manual => "manual",
            SubmissionKind::Timeout => "timeout",
        }
    }
}

impl std::str::FromStr for SubmissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(SubmissionKind::Manual),
            "timeout" => Ok(SubmissionKind::Timeout),
            other => Err(format!("unknown submission kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ScoreSummary {
    pub correct_count: i32,
    pub wrong_count: i32,
    pub unanswered_count: i32,
    pub percentage: i32,
}

/// Fields written exactly once, when the attempt is sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub completed_at: DateTime<Utc>,
    pub submission: SubmissionKind,
    pub score: ScoreSummary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: Uuid,
    pub user_id: String,
    pub assessment_id: Uuid,
    /// Ids of the drawn questions, in presentation order.
    pub question_ids: Vec<i32>,
    pub answers: Vec<AnswerSlot>,
    pub flagged: BTreeSet<usize>,
    pub started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub time_spent_seconds: i64,
    pub is_completed: bool,
    pub completion: Option<Completion>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Attempt {
    pub fn new(
        user_id: impl Into<String>,
        assessment_id: Uuid,
        question_ids: Vec<i32>,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Self {
        let answers = vec![None; question_ids.len()];
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            assessment_id,
            question_ids,
            answers,
            flagged: BTreeSet::new(),
            started_at,
            deadline_at,
            time_spent_seconds: 0,
            is_completed: false,
            completion: None,
            last_heartbeat_at: None,
            version: 0,
        }
    }

    pub fn total_questions(&self) -> usize {
        self.question_ids.len()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn score(&self) -> Option<ScoreSummary> {
        self.completion.as_ref().map(|c| c.score)
    }

    /// Applies a patch in memory with the same rules the stores enforce.
    pub fn apply(&mut self, patch: AttemptPatch) {
        if let Some(answers) = patch.answers {
            self.answers = answers;
        }
        if let Some(flagged) = patch.flagged {
            self.flagged = flagged;
        }
        if let Some(seconds) = patch.time_spent_seconds {
            self.time_spent_seconds = self.time_spent_seconds.max(seconds);
        }
        if let Some(at) = patch.last_heartbeat_at {
            self.last_heartbeat_at = Some(at);
        }
        if let Some(completion) = patch.completion {
            self.completion = Some(completion);
            self.is_completed = true;
        }
        self.version += 1;
    }
}

/// Partial update of the mutable attempt fields. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptPatch {
    pub answers: Option<Vec<AnswerSlot>>,
    pub flagged: Option<BTreeSet<usize>>,
    pub time_spent_seconds: Option<i64>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub completion: Option<Completion>,
}
