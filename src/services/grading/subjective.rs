//! 主观题评分
//!
//! 优先请 LLM 打分；调用失败或回复无法解析时退回到规则打分，
//! 规则打分的置信度固定为 0.3，保证进入人工复核。

use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::clients::AiOracle;
use crate::models::exam::{round2, AiSuggestion, AnswerValue, ExamQuestion, SuggestionSource};
use crate::services::prompts::{build_grading_prompt, GRADING_SYSTEM};
use crate::utils::{extract_json, truncate_text};

/// 规则打分的固定置信度
pub const HEURISTIC_CONFIDENCE: f64 = 0.3;

/// LLM 回复里的评分结构（字段宽松解析）
#[derive(Debug, Deserialize)]
struct OracleScore {
    score: JsonValue,
    #[serde(default, alias = "reason", alias = "explanation")]
    reasoning: String,
    #[serde(default)]
    suggestions: JsonValue,
    #[serde(default)]
    confidence: Option<JsonValue>,
}

/// 未作答：0 分，置信度 1.0，不需要复核
pub fn no_answer_suggestion() -> AiSuggestion {
    AiSuggestion {
        score: 0.0,
        reasoning: "未作答".to_string(),
        suggestions: Vec::new(),
        confidence: 1.0,
        source: SuggestionSource::NoAnswer,
    }
}

/// 给一道主观题打分
pub async fn score_subjective(
    oracle: &dyn AiOracle,
    question: &ExamQuestion,
    answer: Option<&AnswerValue>,
) -> AiSuggestion {
    let answer = match answer.filter(|a| !a.is_blank()) {
        Some(answer) => answer,
        None => return no_answer_suggestion(),
    };

    match ask_oracle(oracle, question, answer).await {
        Ok(suggestion) => suggestion,
        Err(e) => {
            warn!("题目 {} AI 评分失败，使用规则评分: {:#}", question.id, e);
            heuristic_score(
                &question.correct_answer.to_display(),
                &answer.to_display(),
                question.max_score,
            )
        }
    }
}

async fn ask_oracle(
    oracle: &dyn AiOracle,
    question: &ExamQuestion,
    answer: &AnswerValue,
) -> Result<AiSuggestion> {
    let prompt = build_grading_prompt(
        &question.content,
        &question.correct_answer,
        answer,
        question.max_score,
    );

    let response = oracle.complete(GRADING_SYSTEM, &prompt).await?;
    debug!("题目 {} AI 评分回复: {}", question.id, truncate_text(&response, 120));

    parse_oracle_score(&response, question.max_score)
}

/// 解析 LLM 评分回复；分数截断到 [0, 满分]，置信度截断到 [0, 1]
pub fn parse_oracle_score(response: &str, max_score: f64) -> Result<AiSuggestion> {
    let value = extract_json(response).context("评分回复中没有 JSON")?;
    let parsed: OracleScore = serde_json::from_value(value).context("评分回复格式不正确")?;

    let score = as_number(&parsed.score).context("评分回复缺少有效分数")?;
    if !score.is_finite() {
        anyhow::bail!("评分回复分数无效: {}", score);
    }
    let confidence = parsed
        .confidence
        .as_ref()
        .and_then(as_number)
        .filter(|c| c.is_finite())
        .unwrap_or(0.0);

    let suggestions = match parsed.suggestions {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        JsonValue::String(s) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    };

    Ok(AiSuggestion {
        score: round2(score.clamp(0.0, max_score.max(0.0))),
        reasoning: parsed.reasoning,
        suggestions,
        confidence: confidence.clamp(0.0, 1.0),
        source: SuggestionSource::Ai,
    })
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 规则打分
///
/// 空作答、纯数字、单字符重复直接 0 分；
/// 其余按 0.3 × 长度比 + 0.7 × 参考答案关键词覆盖率，最高 1.0。
pub fn heuristic_score(reference: &str, answer: &str, max_score: f64) -> AiSuggestion {
    let trimmed = answer.trim();

    if let Some(reason) = reject_reason(trimmed) {
        return AiSuggestion {
            score: 0.0,
            reasoning: reason.to_string(),
            suggestions: vec!["请认真作答".to_string()],
            confidence: HEURISTIC_CONFIDENCE,
            source: SuggestionSource::Heuristic,
        };
    }

    let reference_len = reference.trim().chars().count();
    let answer_len = trimmed.chars().count();
    let length_ratio = if reference_len == 0 {
        1.0
    } else {
        (answer_len as f64 / reference_len as f64).min(1.0)
    };

    let reference_keywords = keywords(reference);
    let answer_keywords = keywords(trimmed);
    let overlap = if reference_keywords.is_empty() {
        0.0
    } else {
        reference_keywords.intersection(&answer_keywords).count() as f64
            / reference_keywords.len() as f64
    };

    let ratio = (0.3 * length_ratio + 0.7 * overlap).min(1.0);

    AiSuggestion {
        score: round2(max_score * ratio),
        reasoning: format!(
            "AI 评分不可用，按规则估分：长度比 {:.2}，关键词覆盖率 {:.2}",
            length_ratio, overlap
        ),
        suggestions: vec!["需要人工复核".to_string()],
        confidence: HEURISTIC_CONFIDENCE,
        source: SuggestionSource::Heuristic,
    }
}

fn reject_reason(answer: &str) -> Option<&'static str> {
    if answer.is_empty() {
        return Some("作答为空");
    }
    let digits_only = answer
        .chars()
        .filter(|c| !c.is_whitespace())
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
    if digits_only {
        return Some("作答只有数字");
    }
    let mut chars = answer.chars().filter(|c| !c.is_whitespace());
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            return Some("作答为单一重复字符");
        }
    }
    None
}

/// 关键词：两个字母以上的英文单词 + 相邻汉字二元组
fn keywords(text: &str) -> HashSet<String> {
    let mut result = HashSet::new();

    let mut word = String::new();
    for c in text.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_alphanumeric() {
            word.push(c.to_ascii_lowercase());
        } else {
            if word.chars().count() >= 2 {
                result.insert(std::mem::take(&mut word));
            }
            word.clear();
        }
    }

    let chars: Vec<char> = text.chars().collect();
    for pair in chars.windows(2) {
        if is_cjk(pair[0]) && is_cjk(pair[1]) {
            result.insert(pair.iter().collect());
        }
    }

    result
}

fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oracle_score_clamps() {
        let s = parse_oracle_score(
            r#"好的：```json
{"score": 12, "reasoning": "很好", "suggestions": ["无"], "confidence": 1.4}
```"#,
            10.0,
        )
        .unwrap();
        assert_eq!(s.score, 10.0);
        assert_eq!(s.confidence, 1.0);
        assert_eq!(s.source, SuggestionSource::Ai);

        let s = parse_oracle_score(r#"{"score": "-3", "reason": "差"}"#, 10.0).unwrap();
        assert_eq!(s.score, 0.0);
        assert_eq!(s.confidence, 0.0);
        assert_eq!(s.reasoning, "差");

        assert!(parse_oracle_score("我觉得可以给 8 分", 10.0).is_err());
        assert!(parse_oracle_score(r#"{"reasoning": "x"}"#, 10.0).is_err());
    }

    #[test]
    fn test_heuristic_rejects_degenerate_answers() {
        for bad in ["", "   ", "12345", "3.14", "啊啊啊啊", "aaaa"] {
            let s = heuristic_score("光合作用把光能转化为化学能", bad, 10.0);
            assert_eq!(s.score, 0.0, "answer {:?}", bad);
            assert_eq!(s.confidence, HEURISTIC_CONFIDENCE);
        }
    }

    #[test]
    fn test_heuristic_uses_length_and_keywords() {
        let reference = "光合作用把光能转化为化学能";
        let full = heuristic_score(reference, reference, 10.0);
        assert_eq!(full.score, 10.0);
        assert_eq!(full.source, SuggestionSource::Heuristic);

        let partial = heuristic_score(reference, "光合作用", 10.0);
        assert!(partial.score > 0.0 && partial.score < 10.0);

        let unrelated = heuristic_score(reference, "今天天气不错", 10.0);
        assert!(unrelated.score < partial.score);
    }

    #[test]
    fn test_keywords() {
        let k = keywords("Photosynthesis 是 a 光合作用");
        assert!(k.contains("photosynthesis"));
        assert!(!k.contains("a"));
        assert!(k.contains("光合"));
        assert!(k.contains("作用"));
        assert!(!k.contains("是光"));
    }
}
