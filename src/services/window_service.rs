use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IneligibleReason;
use crate::models::assessment::{Assessment, Scheduling};
use crate::utils::time::seconds_until;

/// Remaining window at or below which a scheduled assessment reports `ClosingSoon`.
pub const CLOSING_SOON_SECONDS: i64 = 15 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowStatus {
    NotStarted,
    Active,
    ClosingSoon,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct WindowEvaluation {
    pub is_available: bool,
    /// Time a new entrant would be allotted right now.
    pub remaining_seconds: i64,
    pub status: WindowStatus,
}

impl WindowEvaluation {
    fn unavailable(status: WindowStatus) -> Self {
        Self {
            is_available: false,
            remaining_seconds: 0,
            status,
        }
    }

    pub fn ineligible_reason(&self) -> Option<IneligibleReason> {
        if self.is_available {
            return None;
        }
        Some(match self.status {
            WindowStatus::NotStarted => IneligibleReason::NotYetOpen,
            _ => IneligibleReason::Closed,
        })
    }
}

/// Exam-window arithmetic. Stateless; every function takes a single `now`.
pub struct WindowService;

impl WindowService {
    pub fn evaluate(assessment: &Assessment, now: DateTime<Utc>) -> WindowEvaluation {
        if !assessment.is_open_for_entry() {
            return WindowEvaluation::unavailable(WindowStatus::Closed);
        }

        let exam_seconds = assessment.exam_duration_seconds();
        // A zero-length exam would be sealed the moment it starts.
        if exam_seconds <= 0 {
            return WindowEvaluation::unavailable(WindowStatus::Closed);
        }
        let Some((opens_at, closes_at)) = assessment.scheduling.window_bounds() else {
            return WindowEvaluation {
                is_available: true,
                remaining_seconds: exam_seconds,
                status: WindowStatus::Active,
            };
        };

        if now < opens_at {
            return WindowEvaluation::unavailable(WindowStatus::NotStarted);
        }
        if now >= closes_at {
            return WindowEvaluation::unavailable(WindowStatus::Closed);
        }

        let window_remaining = seconds_until(now, closes_at);
        let allotted = exam_seconds.min(window_remaining);
        let status = if window_remaining <= CLOSING_SOON_SECONDS {
            WindowStatus::ClosingSoon
        } else {
            WindowStatus::Active
        };

        WindowEvaluation {
            is_available: allotted > 0,
            remaining_seconds: allotted,
            status,
        }
    }

    /// Seconds an entrant who already started has left: their personal
    /// deadline, further capped by the window close for scheduled assessments.
    pub fn remaining_for_attempt(
        assessment: &Assessment,
        deadline_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> i64 {
        let personal = seconds_until(now, deadline_at);
        match &assessment.scheduling {
            Scheduling::Unscheduled => personal,
            scheduled => scheduled
                .window_bounds()
                .map(|(_, closes_at)| personal.min(seconds_until(now, closes_at)))
                .unwrap_or(personal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assessment::AssessmentKind;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, 0).unwrap()
    }

    fn assessment(scheduling: Scheduling, exam_minutes: i32) -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            kind: AssessmentKind::RmExam,
            title: "Mock".into(),
            questions: Vec::new(),
            exam_duration_minutes: exam_minutes,
            total_questions: 0,
            scheduling,
            shuffle_questions: false,
            is_active: true,
            master_enabled: true,
        }
    }

    fn scheduled(window_minutes: i32, exam_minutes: i32) -> Assessment {
        assessment(
            Scheduling::Scheduled {
                window_opens_at: at(10, 0),
                window_duration_minutes: window_minutes,
            },
            exam_minutes,
        )
    }

    #[test]
    fn gates_closed_means_closed() {
        let mut a = assessment(Scheduling::Unscheduled, 90);
        a.master_enabled = false;
        let eval = WindowService::evaluate(&a, at(10, 0));
        assert_eq!(eval, WindowEvaluation::unavailable(WindowStatus::Closed));

        a.master_enabled = true;
        a.is_active = false;
        assert!(!WindowService::evaluate(&a, at(10, 0)).is_available);
    }

    #[test]
    fn unscheduled_grants_full_duration() {
        let a = assessment(Scheduling::Unscheduled, 90);
        for now in [at(0, 0), at(13, 37), at(23, 59)] {
            let eval = WindowService::evaluate(&a, now);
            assert!(eval.is_available);
            assert_eq!(eval.remaining_seconds, 5400);
            assert_eq!(eval.status, WindowStatus::Active);
        }
    }

    #[test]
    fn zero_length_exam_is_closed() {
        for scheduling in [
            Scheduling::Unscheduled,
            Scheduling::Scheduled {
                window_opens_at: at(10, 0),
                window_duration_minutes: 60,
            },
        ] {
            let eval = WindowService::evaluate(&assessment(scheduling, 0), at(10, 30));
            assert!(!eval.is_available);
            assert_eq!(eval.remaining_seconds, 0);
            assert_eq!(eval.status, WindowStatus::Closed);
            assert_eq!(eval.ineligible_reason(), Some(IneligibleReason::Closed));
        }
    }

    #[test]
    fn window_edges() {
        let a = scheduled(100, 90);
        let opens = at(10, 0);
        let closes = at(11, 40);

        let before = WindowService::evaluate(&a, opens - Duration::seconds(1));
        assert!(!before.is_available);
        assert_eq!(before.status, WindowStatus::NotStarted);
        assert_eq!(before.ineligible_reason(), Some(IneligibleReason::NotYetOpen));

        assert!(WindowService::evaluate(&a, opens).is_available);

        let at_close = WindowService::evaluate(&a, closes);
        assert!(!at_close.is_available);
        assert_eq!(at_close.status, WindowStatus::Closed);
        assert_eq!(at_close.ineligible_reason(), Some(IneligibleReason::Closed));
    }

    #[test]
    fn remaining_strictly_decreases_once_window_caps_allotment() {
        let a = scheduled(100, 90);
        let mut now = at(10, 11);
        let mut last = WindowService::evaluate(&a, now).remaining_seconds;
        while now < at(11, 39) {
            now += Duration::seconds(37);
            let next = WindowService::evaluate(&a, now).remaining_seconds;
            assert!(next < last, "{} !< {} at {}", next, last, now);
            last = next;
        }
    }

    #[test]
    fn allotment_capped_by_window() {
        let a = scheduled(90, 90);
        assert_eq!(WindowService::evaluate(&a, at(10, 0)).remaining_seconds, 90 * 60);

        let late = WindowService::evaluate(&a, at(11, 25));
        assert_eq!(late.remaining_seconds, 5 * 60);
        assert!(late.is_available);
    }

    #[test]
    fn scheduled_scenario() {
        let a = scheduled(100, 90);

        let early = WindowService::evaluate(&a, at(10, 5));
        assert_eq!(early.remaining_seconds, 90 * 60);
        assert_eq!(early.status, WindowStatus::Active);

        let late = WindowService::evaluate(&a, at(11, 30));
        assert_eq!(late.remaining_seconds, 10 * 60);
        assert_eq!(late.status, WindowStatus::ClosingSoon);

        let after = WindowService::evaluate(&a, at(11, 41));
        assert_eq!(after.status, WindowStatus::Closed);
        assert!(!after.is_available);
    }

    #[test]
    fn closing_soon_threshold_is_inclusive() {
        let a = scheduled(100, 90);
        let eval = WindowService::evaluate(&a, at(11, 25));
        assert_eq!(eval.status, WindowStatus::ClosingSoon);
        let eval = WindowService::evaluate(&a, at(11, 24));
        assert_eq!(eval.status, WindowStatus::Active);
    }

    #[test]
    fn attempt_remaining_respects_window_close() {
        let a = scheduled(100, 90);
        let deadline = at(11, 50);
        assert_eq!(
            WindowService::remaining_for_attempt(&a, deadline, at(11, 30)),
            10 * 60
        );
        let unscheduled = assessment(Scheduling::Unscheduled, 90);
        assert_eq!(
            WindowService::remaining_for_attempt(&unscheduled, deadline, at(11, 30)),
            20 * 60
        );
        assert_eq!(
            WindowService::remaining_for_attempt(&unscheduled, deadline, at(12, 0)),
            0
        );
    }
}
