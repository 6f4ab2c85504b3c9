//! 自动批改引擎
//!
//! 客观题（单选、多选、判断、连线）走确定性比对；
//! 主观题（填空、简答）请 LLM 打分，失败时退回规则打分。
//!
//! 两个置信度阈值互相独立：
//! - 单题置信度低于 `review_threshold`（默认 0.8）标记 `needsReview`
//! - 任一主观题置信度低于 `auto_grade_threshold`（默认 0.9）时整卷不算全自动批改

pub mod objective;
pub mod subjective;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clients::AiOracle;
use crate::config::Config;
use crate::models::exam::{
    round2, AnswerValue, Answers, Exam, ExamQuestion, GradingDetail, GradingKind, GradingResult,
};
use crate::models::question::QuestionType;

pub use objective::ObjectiveVerdict;
pub use subjective::{heuristic_score, HEURISTIC_CONFIDENCE};

/// 批改引擎
pub struct GradingEngine {
    oracle: Arc<dyn AiOracle>,
    review_threshold: f64,
    auto_grade_threshold: f64,
}

impl GradingEngine {
    pub fn new(oracle: Arc<dyn AiOracle>, config: &Config) -> Self {
        Self {
            oracle,
            review_threshold: config.review_confidence_threshold,
            auto_grade_threshold: config.auto_grade_confidence_threshold,
        }
    }

    /// 批改一道题
    pub async fn grade_question(
        &self,
        question: &ExamQuestion,
        answer: Option<&AnswerValue>,
    ) -> GradingDetail {
        let verdict = match question.question_type {
            QuestionType::SingleChoice => objective::grade_single_choice(question, answer),
            QuestionType::MultipleChoice => objective::grade_multiple_choice(question, answer),
            QuestionType::TrueFalse => objective::grade_true_false(question, answer),
            QuestionType::Matching => objective::grade_matching(question, answer),
            QuestionType::FillBlank | QuestionType::Essay => {
                return self.grade_subjective(question, answer).await;
            }
        };

        GradingDetail {
            kind: GradingKind::Objective,
            question_type: question.question_type,
            student_answer: answer.cloned(),
            correct_answer: verdict.correct_answer,
            is_correct: Some(verdict.is_correct),
            ai_suggestion: None,
            score: verdict.score,
            max_score: question.max_score,
            feedback: verdict.feedback,
            needs_review: None,
        }
    }

    async fn grade_subjective(
        &self,
        question: &ExamQuestion,
        answer: Option<&AnswerValue>,
    ) -> GradingDetail {
        let suggestion = subjective::score_subjective(self.oracle.as_ref(), question, answer).await;

        GradingDetail {
            kind: GradingKind::Subjective,
            question_type: question.question_type,
            student_answer: answer.cloned(),
            correct_answer: question.correct_answer.to_display(),
            is_correct: None,
            score: suggestion.score,
            max_score: question.max_score,
            feedback: suggestion.reasoning.clone(),
            needs_review: Some(suggestion.confidence < self.review_threshold),
            ai_suggestion: Some(suggestion),
        }
    }

    /// 汇总单题结果
    pub fn aggregate(
        &self,
        exam: &Exam,
        details: BTreeMap<String, GradingDetail>,
    ) -> GradingResult {
        let total: f64 = details.values().map(|d| d.score).sum();
        let is_fully_auto_graded = details.values().all(|d| match (&d.kind, &d.ai_suggestion) {
            (GradingKind::Subjective, Some(s)) => s.confidence >= self.auto_grade_threshold,
            _ => true,
        });

        GradingResult {
            details,
            total_score: round2(total),
            max_score: exam.nominal_max_score(),
            is_fully_auto_graded,
        }
    }

    /// 批改整卷（按题目顺序逐题进行）
    pub async fn grade(&self, exam: &Exam, answers: &Answers) -> GradingResult {
        let mut details = BTreeMap::new();
        for question in &exam.questions {
            let detail = self.grade_question(question, answers.get(&question.id)).await;
            details.insert(question.id.clone(), detail);
        }
        self.aggregate(exam, details)
    }
}
