use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::models::question::QuestionType;

/// 作答 / 标准答案的表示形式
///
/// 不同题型使用不同形式：字符串、选项下标、下标列表或连线配对列表。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Index(usize),
    Number(f64),
    Text(String),
    Pairs(Vec<MatchPair>),
    Indices(Vec<usize>),
    Texts(Vec<String>),
}

/// 连线题的一组配对
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchPair {
    pub left: String,
    pub right: String,
}

impl MatchPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            right: right.into(),
        }
    }
}

impl AnswerValue {
    /// 是否为空作答
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(s) => s.trim().is_empty(),
            AnswerValue::Texts(v) => v.iter().all(|s| s.trim().is_empty()),
            AnswerValue::Indices(v) => v.is_empty(),
            AnswerValue::Pairs(v) => v.is_empty(),
            AnswerValue::Bool(_) | AnswerValue::Index(_) | AnswerValue::Number(_) => false,
        }
    }

    /// 转成便于展示和提示词使用的文本
    pub fn to_display(&self) -> String {
        match self {
            AnswerValue::Bool(b) => b.to_string(),
            AnswerValue::Index(i) => i.to_string(),
            AnswerValue::Number(n) => n.to_string(),
            AnswerValue::Text(s) => s.clone(),
            AnswerValue::Texts(v) => v.join("; "),
            AnswerValue::Indices(v) => {
                v.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",")
            }
            AnswerValue::Pairs(v) => v
                .iter()
                .map(|p| format!("{}-{}", p.left, p.right))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// 考试中的一道题（批改输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub options: Vec<String>,
    pub correct_answer: AnswerValue,
    pub max_score: f64,
}

/// 考试定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// 试卷标称总分；未设置时按各题满分求和
    #[serde(default)]
    pub total_score: Option<f64>,
    pub questions: Vec<ExamQuestion>,
}

impl Exam {
    pub fn nominal_max_score(&self) -> f64 {
        self.total_score
            .unwrap_or_else(|| self.questions.iter().map(|q| q.max_score).sum())
    }
}

/// 考生作答：题目 ID → 原始作答
pub type Answers = HashMap<String, AnswerValue>;

/// 单题批改类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingKind {
    Objective,
    Subjective,
}

/// 主观题评分建议的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// LLM 评分
    Ai,
    /// LLM 调用失败后的规则兜底
    Heuristic,
    /// 未作答，直接 0 分
    NoAnswer,
}

/// 主观题的评分建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSuggestion {
    pub score: f64,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub source: SuggestionSource,
}

/// 单题批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingDetail {
    #[serde(rename = "type")]
    pub kind: GradingKind,
    pub question_type: QuestionType,
    pub student_answer: Option<AnswerValue>,
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_suggestion: Option<AiSuggestion>,
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_review: Option<bool>,
}

/// 整卷批改结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResult {
    pub details: BTreeMap<String, GradingDetail>,
    pub total_score: f64,
    pub max_score: f64,
    pub is_fully_auto_graded: bool,
}

/// 提交记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Grading,
    Graded,
    Failed,
}

/// 考生提交记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub exam_id: String,
    pub learner_id: String,
    pub answers: Answers,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub result: Option<GradingResult>,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    /// 已批改或正在批改的记录会阻止再次提交
    pub fn blocks_resubmission(&self) -> bool {
        matches!(self.status, SubmissionStatus::Graded | SubmissionStatus::Grading)
    }
}

/// 四舍五入到两位小数
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_value_untagged_forms() {
        let v: AnswerValue = serde_json::from_str("\"A\"").unwrap();
        assert_eq!(v, AnswerValue::Text("A".into()));
        let v: AnswerValue = serde_json::from_str("2").unwrap();
        assert_eq!(v, AnswerValue::Index(2));
        let v: AnswerValue = serde_json::from_str("[0, 2]").unwrap();
        assert_eq!(v, AnswerValue::Indices(vec![0, 2]));
        let v: AnswerValue = serde_json::from_str("[\"A\", \"C\"]").unwrap();
        assert_eq!(v, AnswerValue::Texts(vec!["A".into(), "C".into()]));
        let v: AnswerValue = serde_json::from_str(r#"[{"left": "1", "right": "B"}]"#).unwrap();
        assert_eq!(v, AnswerValue::Pairs(vec![MatchPair::new("1", "B")]));
        let v: AnswerValue = serde_json::from_str("true").unwrap();
        assert_eq!(v, AnswerValue::Bool(true));
    }

    #[test]
    fn test_round2_and_nominal_score() {
        assert_eq!(round2(8.0 * 3.0 / 4.0), 6.0);
        assert_eq!(round2(10.0 / 3.0), 3.33);

        let exam = Exam {
            id: "e1".into(),
            title: String::new(),
            total_score: None,
            questions: vec![ExamQuestion {
                id: "q1".into(),
                question_type: QuestionType::Essay,
                content: "解释光合作用".into(),
                options: vec![],
                correct_answer: AnswerValue::Text("……".into()),
                max_score: 12.5,
            }],
        };
        assert_eq!(exam.nominal_max_score(), 12.5);
    }
}
