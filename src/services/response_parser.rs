//! LLM 抽取结果解析
//!
//! 模型回复的形状不固定：带 `questions` 数组的对象、裸数组、单个题目对象、空对象，
//! 外面还可能包着说明文字和代码块。这里统一解码成 [`UnitOutcome`]。

use serde_json::{Map, Value as JsonValue};

use crate::models::question::ExtractedQuestion;
use crate::utils::json_extract::extract_json;

/// 表示"这一块 / 这一页确实没有题目"的回复用语
const NOTHING_PHRASES: &[&str] = &[
    "no questions detected",
    "no questions found",
    "cover page",
    "blank page",
    "未检测到题目",
    "没有检测到题目",
    "未发现题目",
    "没有题目",
    "封面",
    "空白页",
];

/// 解码后的模型回复形状
#[derive(Debug, Clone, PartialEq)]
pub enum AiPayload {
    /// `{"questions": [...]}`
    QuestionList(Vec<JsonValue>),
    /// `[...]`
    BareArray(Vec<JsonValue>),
    /// 单个题目对象
    Single(JsonValue),
    /// `{}`
    Empty,
}

impl AiPayload {
    /// 按形状解码；其他形状（数字、字符串、无关对象）返回错误说明
    pub fn decode(value: JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Array(items) => Ok(AiPayload::BareArray(items)),
            JsonValue::Object(obj) if obj.is_empty() => Ok(AiPayload::Empty),
            JsonValue::Object(obj) => {
                for key in ["questions", "data", "items"] {
                    if let Some(list) = obj.get(key) {
                        return match list {
                            JsonValue::Array(items) => Ok(AiPayload::QuestionList(items.clone())),
                            other => Err(format!("字段 {} 不是数组: {}", key, other)),
                        };
                    }
                }
                if first_str(&obj, CONTENT_KEYS).is_some() {
                    Ok(AiPayload::Single(JsonValue::Object(obj)))
                } else {
                    Err("对象中既没有 questions 数组也不像单个题目".to_string())
                }
            }
            other => Err(format!("无法识别的回复类型: {}", other)),
        }
    }

    pub fn into_entries(self) -> Vec<JsonValue> {
        match self {
            AiPayload::QuestionList(items) | AiPayload::BareArray(items) => items,
            AiPayload::Single(item) => vec![item],
            AiPayload::Empty => Vec::new(),
        }
    }
}

/// 单个处理单元的解析结果
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    /// 抽取到题目（条目可能残缺，由合并阶段校验）
    Questions(Vec<ExtractedQuestion>),
    /// 明确没有题目（封面、空白页等），不算失败
    NothingFound(String),
    /// 回复无法解析，计为一次部分失败
    ParseFailure(String),
}

/// 解析一次抽取调用的原始回复
pub fn parse_unit_response(raw: &str) -> UnitOutcome {
    let nothing_phrase = find_nothing_phrase(raw);

    let value = match extract_json(raw) {
        Some(value) => value,
        None => {
            return match nothing_phrase {
                Some(phrase) => UnitOutcome::NothingFound(phrase.to_string()),
                None => UnitOutcome::ParseFailure("回复中没有可解析的 JSON".to_string()),
            };
        }
    };

    let payload = match AiPayload::decode(value) {
        Ok(payload) => payload,
        Err(reason) => return UnitOutcome::ParseFailure(reason),
    };

    let entries = payload.into_entries();
    if entries.is_empty() {
        let reason = nothing_phrase.unwrap_or("模型未返回题目");
        return UnitOutcome::NothingFound(reason.to_string());
    }

    UnitOutcome::Questions(entries.iter().map(decode_question).collect())
}

fn find_nothing_phrase(raw: &str) -> Option<&'static str> {
    let lower = raw.to_lowercase();
    NOTHING_PHRASES.iter().copied().find(|p| lower.contains(p))
}

const CONTENT_KEYS: &[&str] = &["content", "question", "stem", "text", "题干"];
const TYPE_KEYS: &[&str] = &["type", "questionType", "question_type", "题型"];
const ANSWER_KEYS: &[&str] = &["answer", "correctAnswer", "correct_answer", "答案"];
const EXPLANATION_KEYS: &[&str] = &["explanation", "analysis", "解析"];
const KNOWLEDGE_KEYS: &[&str] = &["knowledgePoint", "knowledge_point", "知识点"];

/// 宽松地把一个条目解码成题目；不是对象时返回空题目，交给合并阶段拒绝
pub fn decode_question(value: &JsonValue) -> ExtractedQuestion {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return ExtractedQuestion::default(),
    };

    ExtractedQuestion {
        content: first_str(obj, CONTENT_KEYS).unwrap_or_default(),
        question_type: first_str(obj, TYPE_KEYS).unwrap_or_default(),
        options: obj.get("options").and_then(decode_options),
        answer: ANSWER_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .filter(|v| !v.is_null())
            .cloned(),
        explanation: first_str(obj, EXPLANATION_KEYS).filter(|s| !s.trim().is_empty()),
        tags: decode_tags(obj.get("tags")),
        difficulty: obj.get("difficulty").and_then(scalar_to_string),
        knowledge_point: first_str(obj, KNOWLEDGE_KEYS).filter(|s| !s.trim().is_empty()),
    }
}

fn first_str(obj: &Map<String, JsonValue>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| obj.get(*k)).and_then(scalar_to_string)
}

fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 选项可以是字符串数组、`{label, text}` 对象数组或 `{"A": "..."}` 映射
fn decode_options(value: &JsonValue) -> Option<Vec<String>> {
    let options: Vec<String> = match value {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                JsonValue::Object(o) => {
                    let text = first_str(o, &["text", "content", "value"])?;
                    Some(match first_str(o, &["label", "key"]) {
                        Some(label) => format!("{}. {}", label, text),
                        None => text,
                    })
                }
                other => scalar_to_string(other),
            })
            .collect(),
        JsonValue::Object(map) => map
            .iter()
            .filter_map(|(label, text)| scalar_to_string(text).map(|t| format!("{}. {}", label, t)))
            .collect(),
        _ => return None,
    };

    if options.is_empty() {
        None
    } else {
        Some(options)
    }
}

fn decode_tags(value: Option<&JsonValue>) -> Vec<String> {
    match value {
        Some(JsonValue::Array(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(JsonValue::String(s)) => s
            .split([',', '，', '、'])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_with_questions() {
        let raw = r#"```json
{"questions": [
  {"content": "1+1=?", "type": "单选题", "options": ["A. 1", "B. 2"], "answer": "B", "tags": "数学, 加法"},
  {"stem": "地球是圆的", "questionType": "判断", "answer": true, "difficulty": 2}
]}
```"#;
        match parse_unit_response(raw) {
            UnitOutcome::Questions(qs) => {
                assert_eq!(qs.len(), 2);
                assert_eq!(qs[0].options.as_ref().unwrap().len(), 2);
                assert_eq!(qs[0].tags, vec!["数学", "加法"]);
                assert_eq!(qs[1].content, "地球是圆的");
                assert_eq!(qs[1].question_type, "判断");
                assert_eq!(qs[1].answer, Some(json!(true)));
                assert_eq!(qs[1].difficulty.as_deref(), Some("2"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_bare_array_and_single_object() {
        let raw = r#"[{"question": "a", "type": "essay"}]"#;
        assert!(matches!(parse_unit_response(raw), UnitOutcome::Questions(q) if q.len() == 1));

        let raw = r#"识别结果：{"content": "b", "type": "填空题", "options": {"A": "x", "B": "y"}}"#;
        match parse_unit_response(raw) {
            UnitOutcome::Questions(qs) => {
                assert_eq!(qs[0].options, Some(vec!["A. x".to_string(), "B. y".to_string()]));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_nothing_found_vs_parse_failure() {
        for raw in ["这一页是封面，没有内容", "Blank page.", "{}", r#"{"questions": []}"#] {
            assert!(matches!(parse_unit_response(raw), UnitOutcome::NothingFound(_)), "{}", raw);
        }
        for raw in ["抱歉，我无法处理", "42", r#"{"status": "ok"}"#, r#"{"questions": "none"}"#] {
            assert!(matches!(parse_unit_response(raw), UnitOutcome::ParseFailure(_)), "{}", raw);
        }
    }

    #[test]
    fn test_non_object_entry_decodes_to_empty_question() {
        let q = decode_question(&json!("just text"));
        assert!(q.content.is_empty());
        assert!(q.question_type.is_empty());
    }

    #[test]
    fn test_option_objects_with_labels() {
        let raw = json!([{"label": "A", "text": "鲸"}, {"content": "鲨"}]);
        let opts = decode_options(&raw).unwrap();
        assert_eq!(opts, vec!["A. 鲸", "鲨"]);
    }
}
