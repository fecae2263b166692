#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use assessment_engine::database::memory::MemoryStore;
use assessment_engine::database::repository::AttemptStore;
use assessment_engine::error::{Error, Result};
use assessment_engine::models::assessment::{Assessment, AssessmentKind, Scheduling};
use assessment_engine::models::attempt::{Attempt, AttemptPatch};
use assessment_engine::models::question::Question;
use assessment_engine::services::session_service::{SessionService, SessionSettings};
use assessment_engine::utils::time::{Clock, ManualClock};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, hour, minute, 0).unwrap()
}

/// Questions whose correct option is always index 0.
pub fn questions(count: i32) -> Vec<Question> {
    (1..=count)
        .map(|id| Question {
            id,
            text: format!("Question {}", id),
            options: vec!["right".into(), "wrong".into(), "also wrong".into()],
            correct_option_index: 0,
            explanation: Some(format!("Option 0 answers question {}", id)),
        })
        .collect()
}

pub fn assessment(kind: AssessmentKind, question_count: i32, exam_minutes: i32) -> Assessment {
    Assessment {
        id: Uuid::new_v4(),
        kind,
        title: format!("{} assessment", kind.as_str()),
        questions: questions(question_count),
        exam_duration_minutes: exam_minutes,
        total_questions: question_count,
        scheduling: Scheduling::Unscheduled,
        shuffle_questions: false,
        is_active: true,
        master_enabled: true,
    }
}

pub fn scheduled(
    question_count: i32,
    exam_minutes: i32,
    opens_at: DateTime<Utc>,
    window_minutes: i32,
) -> Assessment {
    Assessment {
        scheduling: Scheduling::Scheduled {
            window_opens_at: opens_at,
            window_duration_minutes: window_minutes,
        },
        ..assessment(AssessmentKind::Weekly, question_count, exam_minutes)
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub service: SessionService,
}

impl Harness {
    pub async fn new(start: DateTime<Utc>, assessments: Vec<Assessment>) -> Self {
        let store = Arc::new(MemoryStore::new());
        for a in assessments {
            store.insert_assessment(a).await;
        }
        let clock = Arc::new(ManualClock::new(start));
        let service = SessionService::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            SessionSettings::default(),
        )
        .with_entitlement(AssessmentKind::RmExam, store.clone());
        Self {
            store,
            clock,
            service,
        }
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn stored(&self, attempt_id: Uuid) -> Attempt {
        self.store
            .get_by_id(attempt_id)
            .await
            .unwrap()
            .expect("attempt exists")
    }
}

/// Wall clock that follows tokio's (possibly paused) time.
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now().duration_since(self.origin);
        self.base + Duration::from_std(elapsed).unwrap()
    }
}

/// Attempt store whose writes can be made to fail on demand.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Persistence("store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for FlakyStore {
    async fn create(&self, attempt: &Attempt) -> Result<Attempt> {
        self.check()?;
        self.inner.create(attempt).await
    }

    async fn get_by_id(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        self.inner.get_by_id(attempt_id).await
    }

    async fn get_open_attempt(
        &self,
        user_id: &str,
        assessment_id: Uuid,
    ) -> Result<Option<Attempt>> {
        self.inner.get_open_attempt(user_id, assessment_id).await
    }

    async fn update(
        &self,
        attempt_id: Uuid,
        expected_version: Option<i64>,
        patch: AttemptPatch,
    ) -> Result<Attempt> {
        self.check()?;
        self.inner.update(attempt_id, expected_version, patch).await
    }

    async fn list_overdue(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        self.inner.list_overdue(cutoff).await
    }

    async fn list_for_user(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        self.inner.list_for_user(user_id, assessment_id).await
    }
}

/// Attempt store that hides the open attempt from the next lookup, as if a
/// second client created it between our lookup and our insert.
pub struct LaggingLookupStore {
    inner: Arc<MemoryStore>,
    hide_next: AtomicBool,
}

impl LaggingLookupStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            hide_next: AtomicBool::new(false),
        }
    }

    pub fn hide_next_lookup(&self) {
        self.hide_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AttemptStore for LaggingLookupStore {
    async fn create(&self, attempt: &Attempt) -> Result<Attempt> {
        self.inner.create(attempt).await
    }

    async fn get_by_id(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        self.inner.get_by_id(attempt_id).await
    }

    async fn get_open_attempt(
        &self,
        user_id: &str,
        assessment_id: Uuid,
    ) -> Result<Option<Attempt>> {
        if self.hide_next.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        self.inner.get_open_attempt(user_id, assessment_id).await
    }

    async fn update(
        &self,
        attempt_id: Uuid,
        expected_version: Option<i64>,
        patch: AttemptPatch,
    ) -> Result<Attempt> {
        self.inner.update(attempt_id, expected_version, patch).await
    }

    async fn list_overdue(&self, cutoff: DateTime<Utc>) -> Result<Vec<Attempt>> {
        self.inner.list_overdue(cutoff).await
    }

    async fn list_for_user(&self, user_id: &str, assessment_id: Uuid) -> Result<Vec<Attempt>> {
        self.inner.list_for_user(user_id, assessment_id).await
    }
}
