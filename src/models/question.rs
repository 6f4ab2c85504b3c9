use phf::phf_map;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// 题型枚举
///
/// 抽取流程只会产出前五种；`Matching`（连线题）只出现在考试定义里。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// 单选
    SingleChoice,
    /// 多选
    MultipleChoice,
    /// 判断
    TrueFalse,
    /// 填空
    FillBlank,
    /// 简答 / 论述
    Essay,
    /// 连线 / 匹配
    Matching,
}

/// 题型标签词表（已转小写、去空白）
static TYPE_ALIASES: phf::Map<&'static str, QuestionType> = phf_map! {
    "single_choice" => QuestionType::SingleChoice,
    "single" => QuestionType::SingleChoice,
    "choice" => QuestionType::SingleChoice,
    "radio" => QuestionType::SingleChoice,
    "单选" => QuestionType::SingleChoice,
    "单选题" => QuestionType::SingleChoice,
    "选择题" => QuestionType::SingleChoice,
    "单项选择题" => QuestionType::SingleChoice,
    "multiple_choice" => QuestionType::MultipleChoice,
    "multi_choice" => QuestionType::MultipleChoice,
    "multiple" => QuestionType::MultipleChoice,
    "multi" => QuestionType::MultipleChoice,
    "checkbox" => QuestionType::MultipleChoice,
    "多选" => QuestionType::MultipleChoice,
    "多选题" => QuestionType::MultipleChoice,
    "多项选择题" => QuestionType::MultipleChoice,
    "不定项选择题" => QuestionType::MultipleChoice,
    "true_false" => QuestionType::TrueFalse,
    "truefalse" => QuestionType::TrueFalse,
    "judge" => QuestionType::TrueFalse,
    "judgement" => QuestionType::TrueFalse,
    "boolean" => QuestionType::TrueFalse,
    "tf" => QuestionType::TrueFalse,
    "判断" => QuestionType::TrueFalse,
    "判断题" => QuestionType::TrueFalse,
    "是非题" => QuestionType::TrueFalse,
    "fill_blank" => QuestionType::FillBlank,
    "fill_in_blank" => QuestionType::FillBlank,
    "fill" => QuestionType::FillBlank,
    "blank" => QuestionType::FillBlank,
    "cloze" => QuestionType::FillBlank,
    "填空" => QuestionType::FillBlank,
    "填空题" => QuestionType::FillBlank,
    "essay" => QuestionType::Essay,
    "subjective" => QuestionType::Essay,
    "short_answer" => QuestionType::Essay,
    "简答" => QuestionType::Essay,
    "简答题" => QuestionType::Essay,
    "问答题" => QuestionType::Essay,
    "论述题" => QuestionType::Essay,
    "解答题" => QuestionType::Essay,
    "计算题" => QuestionType::Essay,
    "作文" => QuestionType::Essay,
    "matching" => QuestionType::Matching,
    "match" => QuestionType::Matching,
    "连线" => QuestionType::Matching,
    "连线题" => QuestionType::Matching,
    "匹配题" => QuestionType::Matching,
};

impl QuestionType {
    /// 稳定的英文标识
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::FillBlank => "fill_blank",
            QuestionType::Essay => "essay",
            QuestionType::Matching => "matching",
        }
    }

    /// 获取中文名称
    pub fn name(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "单选题",
            QuestionType::MultipleChoice => "多选题",
            QuestionType::TrueFalse => "判断题",
            QuestionType::FillBlank => "填空题",
            QuestionType::Essay => "简答题",
            QuestionType::Matching => "连线题",
        }
    }

    /// 需要 AI 辅助评分的题型
    pub fn is_subjective(self) -> bool {
        matches!(self, QuestionType::FillBlank | QuestionType::Essay)
    }

    /// 智能解析题型标签（精确匹配词表，失败后按关键字模糊匹配）
    pub fn from_label(label: &str) -> Option<Self> {
        let key: String = label
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c })
            .collect();

        if let Some(t) = TYPE_ALIASES.get(key.as_str()) {
            return Some(*t);
        }

        // 模糊匹配（"多选" 要先于 "选择" 判断）
        if key.contains("多选") || key.contains("multi") {
            return Some(QuestionType::MultipleChoice);
        }
        if key.contains("单选") || key.contains("选择") || key.contains("single") {
            return Some(QuestionType::SingleChoice);
        }
        if key.contains("判断") || key.contains("true") {
            return Some(QuestionType::TrueFalse);
        }
        if key.contains("填空") || key.contains("blank") {
            return Some(QuestionType::FillBlank);
        }
        if key.contains("连线") || key.contains("匹配") || key.contains("match") {
            return Some(QuestionType::Matching);
        }
        if key.contains("简答")
            || key.contains("问答")
            || key.contains("论述")
            || key.contains("essay")
        {
            return Some(QuestionType::Essay);
        }

        None
    }

    /// 抽取结果的题型归一化：只映射到五种题型，无法识别时默认单选题
    pub fn normalize_extracted(label: &str) -> Self {
        match Self::from_label(label) {
            Some(QuestionType::Matching) | None => QuestionType::SingleChoice,
            Some(t) => t,
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// 考试定义里的题型可以写中文或英文别名
impl<'de> Deserialize<'de> for QuestionType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Visitor;

        struct TypeVisitor;

        impl<'de> Visitor<'de> for TypeVisitor {
            type Value = QuestionType;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a question type label such as \"single_choice\" or \"单选题\"")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                QuestionType::from_label(value)
                    .ok_or_else(|| E::custom(format!("unknown question type: {}", value)))
            }
        }

        deserializer.deserialize_str(TypeVisitor)
    }
}

/// 单个处理单元（一块文本 / 一页图片）抽取出的原始题目
///
/// 来自 LLM，不可信：任何字段都可能缺失。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedQuestion {
    pub content: String,
    /// 模型声明的题型（自由文本，合并时再归一化）
    pub question_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_point: Option<String>,
}

/// 合并去重后的题目，可以直接入库
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalQuestion {
    pub content: String,
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_point: Option<String>,
}

impl CanonicalQuestion {
    /// 去重键：(归一化题型, 去首尾空白的题干)
    pub fn dedup_key(&self) -> (QuestionType, String) {
        (self.question_type, self.content.trim().to_string())
    }
}

impl From<CanonicalQuestion> for ExtractedQuestion {
    fn from(q: CanonicalQuestion) -> Self {
        Self {
            content: q.content,
            question_type: q.question_type.as_str().to_string(),
            options: q.options,
            answer: q.answer,
            explanation: q.explanation,
            tags: q.tags,
            difficulty: q.difficulty,
            knowledge_point: q.knowledge_point,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_label_exact_and_fuzzy() {
        assert_eq!(QuestionType::from_label("单选题"), Some(QuestionType::SingleChoice));
        assert_eq!(
            QuestionType::from_label(" Multiple-Choice "),
            Some(QuestionType::MultipleChoice)
        );
        assert_eq!(QuestionType::from_label("判断"), Some(QuestionType::TrueFalse));
        assert_eq!(
            QuestionType::from_label("一、多选题（每题3分）"),
            Some(QuestionType::MultipleChoice)
        );
        assert_eq!(QuestionType::from_label("名词解释"), None);
    }

    #[test]
    fn test_normalize_extracted_defaults_to_single_choice() {
        assert_eq!(QuestionType::normalize_extracted("名词解释"), QuestionType::SingleChoice);
        assert_eq!(QuestionType::normalize_extracted("连线题"), QuestionType::SingleChoice);
        assert_eq!(QuestionType::normalize_extracted("填空题"), QuestionType::FillBlank);
    }

    #[test]
    fn test_deserialize_alias() {
        let t: QuestionType = serde_json::from_str("\"论述题\"").unwrap();
        assert_eq!(t, QuestionType::Essay);
        let t: QuestionType = serde_json::from_str("\"matching\"").unwrap();
        assert_eq!(t, QuestionType::Matching);
        assert!(serde_json::from_str::<QuestionType>("\"???\"").is_err());
    }
}
