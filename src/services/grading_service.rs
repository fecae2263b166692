use serde::{Deserialize, Serialize};

use crate::models::attempt::{AnswerSlot, ScoreSummary};
use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AnswerOutcome {
    Correct,
    Wrong,
    Unanswered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QuestionReview {
    pub question_id: i32,
    pub question_text: String,
    pub options: Vec<String>,
    pub selected_option: Option<i32>,
    pub correct_option: i32,
    pub outcome: AnswerOutcome,
    pub explanation: Option<String>,
}

pub struct GradingService;

impl GradingService {
    pub fn outcome(question: &Question, answer: AnswerSlot) -> AnswerOutcome {
        match answer {
            None => AnswerOutcome::Unanswered,
            Some(idx) if idx == question.correct_option_index => AnswerOutcome::Correct,
            Some(_) => AnswerOutcome::Wrong,
        }
    }

    /// Scores answers positionally against `questions`. Missing answer slots
    /// count as unanswered; an empty question list scores 0%.
    pub fn score(questions: &[Question], answers: &[AnswerSlot]) -> ScoreSummary {
        let mut correct_count = 0;
        let mut wrong_count = 0;
        let mut unanswered_count = 0;

        for (idx, q) in questions.iter().enumerate() {
            let answer = answers.get(idx).copied().flatten();
            match Self::outcome(q, answer) {
                AnswerOutcome::Correct => correct_count += 1,
                AnswerOutcome::Wrong => wrong_count += 1,
                AnswerOutcome::Unanswered => unanswered_count += 1,
            }
        }

        let total = questions.len();
        let percentage = if total > 0 {
            ((correct_count as f64 / total as f64) * 100.0).round() as i32
        } else {
            0
        };

        ScoreSummary {
            correct_count,
            wrong_count,
            unanswered_count,
            percentage,
        }
    }

    pub fn review(questions: &[Question], answers: &[AnswerSlot]) -> Vec<QuestionReview> {
        questions
            .iter()
            .enumerate()
            .map(|(idx, q)| {
                let selected = answers.get(idx).copied().flatten();
                QuestionReview {
                    question_id: q.id,
                    question_text: q.text.clone(),
                    options: q.options.clone(),
                    selected_option: selected,
                    correct_option: q.correct_option_index,
                    outcome: Self::outcome(q, selected),
                    explanation: q.explanation.clone(),
                }
            })
            .collect()
    }
}
