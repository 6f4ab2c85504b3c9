/// 题目合并去重服务
///
/// 多个处理单元的抽取结果按单元顺序拼接后交给这里：
/// 校验必填字段、归一化题型、按 (题型, 题干) 去重，先出现的保留。
use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::question::{CanonicalQuestion, ExtractedQuestion, QuestionType};
use crate::utils::truncate_text;

/// 被拒绝的条目
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedEntry {
    /// 在输入列表中的下标
    pub index: usize,
    pub reason: String,
}

/// 合并结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    pub questions: Vec<CanonicalQuestion>,
    pub rejected: Vec<RejectedEntry>,
    /// 被丢弃的重复条目数
    pub duplicates: usize,
}

/// 合并去重
pub fn merge_questions(entries: Vec<ExtractedQuestion>) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();
    let mut seen: HashSet<(QuestionType, String)> = HashSet::new();

    for (index, entry) in entries.into_iter().enumerate() {
        let content = entry.content.trim();
        let declared = entry.question_type.trim();

        if content.is_empty() {
            outcome.rejected.push(RejectedEntry {
                index,
                reason: format!("第 {} 条题目缺少题干", index + 1),
            });
            continue;
        }
        if declared.is_empty() {
            outcome.rejected.push(RejectedEntry {
                index,
                reason: format!("第 {} 条题目缺少题型: {}", index + 1, truncate_text(content, 30)),
            });
            continue;
        }

        if QuestionType::from_label(declared).is_none() {
            warn!("未识别的题型 '{}'，按单选题处理", declared);
        }
        let question = canonicalize(entry);

        if !seen.insert(question.dedup_key()) {
            debug!("丢弃重复题目: {}", truncate_text(&question.content, 30));
            outcome.duplicates += 1;
            continue;
        }

        outcome.questions.push(question);
    }

    outcome
}

fn canonicalize(entry: ExtractedQuestion) -> CanonicalQuestion {
    CanonicalQuestion {
        question_type: QuestionType::normalize_extracted(&entry.question_type),
        content: entry.content.trim().to_string(),
        options: entry.options,
        answer: entry.answer,
        explanation: entry.explanation,
        tags: entry.tags,
        difficulty: entry.difficulty,
        knowledge_point: entry.knowledge_point,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(content: &str, t: &str) -> ExtractedQuestion {
        ExtractedQuestion {
            content: content.to_string(),
            question_type: t.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_occurrence_wins_and_order_is_stable() {
        let a = q("1. 水的化学式是？", "单选题");
        let b = q("2. 简述光合作用。", "简答题");
        // 同题干、题型别名不同，归一化后是同一道题
        let a2 = q("  1. 水的化学式是？ ", "single_choice");

        let outcome = merge_questions(vec![a, b, a2]);
        assert_eq!(outcome.questions.len(), 2);
        assert_eq!(outcome.questions[0].content, "1. 水的化学式是？");
        assert_eq!(outcome.questions[1].question_type, QuestionType::Essay);
        assert_eq!(outcome.duplicates, 1);
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_same_content_different_type_is_kept() {
        let outcome = merge_questions(vec![q("地球是圆的", "判断题"), q("地球是圆的", "简答题")]);
        assert_eq!(outcome.questions.len(), 2);
    }

    #[test]
    fn test_rejects_missing_fields() {
        let outcome = merge_questions(vec![q("  ", "单选题"), q("有题干", ""), q("ok", "填空")]);
        assert_eq!(outcome.questions.len(), 1);
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].index, 0);
        assert_eq!(outcome.rejected[1].index, 1);
    }

    #[test]
    fn test_unknown_type_defaults_to_single_choice() {
        let outcome =
            merge_questions(vec![q("连线：国家-首都", "连线题"), q("其他", "奇怪的题型")]);
        assert!(outcome
            .questions
            .iter()
            .all(|q| q.question_type == QuestionType::SingleChoice));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let input = vec![
            q("A", "单选"),
            q("B", "多选"),
            q("A", "选择题"),
            q("C", "essay"),
            q("B", "multiple"),
        ];
        let first = merge_questions(input);
        let again = merge_questions(first.questions.iter().cloned().map(Into::into).collect());

        assert_eq!(again.questions, first.questions);
        assert_eq!(again.duplicates, 0);
        assert!(again.rejected.is_empty());
    }
}
