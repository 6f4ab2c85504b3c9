//! 客观题比对
//!
//! 纯函数，不依赖 LLM：相同的 (题目, 作答) 永远得到相同结果。

use std::collections::{BTreeSet, HashMap, HashSet};

use phf::phf_set;

use crate::models::exam::{round2, AnswerValue, ExamQuestion, MatchPair};

/// 判断题"正确"的同义词（已转小写）
static TRUE_TOKENS: phf::Set<&'static str> = phf_set! {
    "true", "t", "yes", "y", "1", "right", "correct",
    "对", "正确", "是", "√", "✓", "✔",
};

/// 判断题"错误"的同义词（已转小写）
static FALSE_TOKENS: phf::Set<&'static str> = phf_set! {
    "false", "f", "no", "n", "0", "wrong", "incorrect",
    "错", "错误", "否", "×", "✗", "✘", "x",
};

/// 客观题比对结果
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectiveVerdict {
    pub is_correct: bool,
    pub score: f64,
    /// 规范化后的标准答案（用于展示）
    pub correct_answer: String,
    pub feedback: String,
}

impl ObjectiveVerdict {
    fn all_or_nothing(is_correct: bool, max_score: f64, correct_answer: String) -> Self {
        let feedback = if is_correct { "回答正确" } else { "回答错误" };
        Self {
            is_correct,
            score: if is_correct { max_score } else { 0.0 },
            correct_answer,
            feedback: feedback.to_string(),
        }
    }

    fn missing(correct_answer: String) -> Self {
        Self {
            is_correct: false,
            score: 0.0,
            correct_answer,
            feedback: "未作答".to_string(),
        }
    }
}

/// 单选题：字母 / 下标先解析成选项内容再比较
pub fn grade_single_choice(
    question: &ExamQuestion,
    answer: Option<&AnswerValue>,
) -> ObjectiveVerdict {
    let correct = single_choice_token(&question.correct_answer, &question.options);
    let answer = match answer.filter(|a| !a.is_blank()) {
        Some(answer) => answer,
        None => return ObjectiveVerdict::missing(correct),
    };

    let given = single_choice_token(answer, &question.options);
    let is_correct = !correct.is_empty() && normalize(&given) == normalize(&correct);
    ObjectiveVerdict::all_or_nothing(is_correct, question.max_score, correct)
}

/// 判断题：同义词折叠成 true / false 两个值
pub fn grade_true_false(question: &ExamQuestion, answer: Option<&AnswerValue>) -> ObjectiveVerdict {
    let correct = truth_value(&question.correct_answer);
    let correct_display = match correct {
        Some(true) => "正确".to_string(),
        Some(false) => "错误".to_string(),
        None => question.correct_answer.to_display(),
    };

    let answer = match answer.filter(|a| !a.is_blank()) {
        Some(answer) => answer,
        None => return ObjectiveVerdict::missing(correct_display),
    };

    let is_correct = correct.is_some() && truth_value(answer) == correct;
    ObjectiveVerdict::all_or_nothing(is_correct, question.max_score, correct_display)
}

/// 多选题：选项集合完全相同才得分，不给部分分
pub fn grade_multiple_choice(
    question: &ExamQuestion,
    answer: Option<&AnswerValue>,
) -> ObjectiveVerdict {
    let correct = choice_set(&question.correct_answer, &question.options);
    let correct_display = correct.iter().cloned().collect::<Vec<_>>().join(", ");

    let answer = match answer.filter(|a| !a.is_blank()) {
        Some(answer) => answer,
        None => return ObjectiveVerdict::missing(correct_display),
    };

    let given = choice_set(answer, &question.options);
    let is_correct = !correct.is_empty() && given == correct;
    ObjectiveVerdict::all_or_nothing(is_correct, question.max_score, correct_display)
}

/// 连线题：得分 = 满分 × 正确配对数 / 配对总数，保留两位小数
pub fn grade_matching(question: &ExamQuestion, answer: Option<&AnswerValue>) -> ObjectiveVerdict {
    let correct = match_pairs(&question.correct_answer);
    let correct_display = question.correct_answer.to_display();

    let answer = match answer.filter(|a| !a.is_blank()) {
        Some(answer) => answer,
        None => return ObjectiveVerdict::missing(correct_display),
    };

    // 同一个左项连了多个右项，整项算错
    let mut given: HashMap<String, Vec<String>> = HashMap::new();
    for (left, right) in match_pairs(answer) {
        given.entry(left).or_default().push(right);
    }
    let total = correct.len();
    let matched = correct
        .iter()
        .filter(|(left, right)| {
            matches!(given.get(left).map(Vec::as_slice), Some([r]) if r == right)
        })
        .count();

    let score = if total == 0 {
        0.0
    } else {
        round2(question.max_score * matched as f64 / total as f64)
    };
    let is_correct = total > 0 && matched == total;

    ObjectiveVerdict {
        is_correct,
        score,
        correct_answer: correct_display,
        feedback: format!("连线正确 {} / {}", matched, total),
    }
}

/// 比较用的规范化：去掉选项标号、空白，转小写
fn normalize(text: &str) -> String {
    strip_option_label(text)
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 去掉 "A." / "A、" / "(A)" 这类选项标号前缀
pub fn strip_option_label(text: &str) -> &str {
    let t = text.trim();
    let mut chars = t.char_indices();

    let rest = match chars.next() {
        Some((_, '(' | '（')) => match (chars.next(), chars.next()) {
            (Some((_, l)), Some((i, ')' | '）'))) if is_label(l) => &t[i + char_len(t, i)..],
            _ => return t,
        },
        Some((_, l)) if is_label(l) => match chars.next() {
            Some((i, '.' | '．' | '、' | ':' | '：' | ')' | '）')) => &t[i + char_len(t, i)..],
            _ => return t,
        },
        _ => return t,
    };
    rest.trim()
}

fn char_len(text: &str, index: usize) -> usize {
    text[index..].chars().next().map_or(0, char::len_utf8)
}

fn is_label(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), 'A'..='H')
}

/// 单个字母（可带标点 / 括号）对应的选项下标
fn letter_index(token: &str) -> Option<usize> {
    let core: Vec<char> = token
        .trim()
        .trim_matches(|c: char| matches!(c, '(' | ')' | '（' | '）' | '.' | '．' | '、'))
        .chars()
        .collect();
    match core.as_slice() {
        [c] if is_label(*c) => Some((c.to_ascii_uppercase() as u8 - b'A') as usize),
        _ => None,
    }
}

/// 把字母或下标解析成选项内容；解析不了时原样返回
fn resolve_option(token: &str, options: &[String]) -> String {
    letter_index(token)
        .and_then(|i| options.get(i))
        .map(|opt| strip_option_label(opt).to_string())
        .unwrap_or_else(|| strip_option_label(token).to_string())
}

fn resolve_index(index: usize, options: &[String]) -> String {
    options
        .get(index)
        .map(|opt| strip_option_label(opt).to_string())
        .unwrap_or_else(|| index.to_string())
}

fn single_choice_token(value: &AnswerValue, options: &[String]) -> String {
    match value {
        AnswerValue::Index(i) => resolve_index(*i, options),
        AnswerValue::Text(s) => resolve_option(s, options),
        AnswerValue::Texts(v) if v.len() == 1 => resolve_option(&v[0], options),
        AnswerValue::Indices(v) if v.len() == 1 => resolve_index(v[0], options),
        other => other.to_display(),
    }
}

fn truth_value(value: &AnswerValue) -> Option<bool> {
    match value {
        AnswerValue::Bool(b) => Some(*b),
        AnswerValue::Index(1) => Some(true),
        AnswerValue::Index(0) => Some(false),
        AnswerValue::Text(s) => {
            let token = s.trim().to_lowercase();
            if TRUE_TOKENS.contains(token.as_str()) {
                Some(true)
            } else if FALSE_TOKENS.contains(token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// 多选作答解析成（规范化后的）选项内容集合
///
/// 文本作答支持 "A,B"、"A、C"、"A B" 以及连写的 "ABD"。
fn choice_set(value: &AnswerValue, options: &[String]) -> BTreeSet<String> {
    let tokens: Vec<String> = match value {
        AnswerValue::Index(i) => vec![resolve_index(*i, options)],
        AnswerValue::Indices(v) => v.iter().map(|i| resolve_index(*i, options)).collect(),
        AnswerValue::Texts(v) => v.iter().map(|s| resolve_option(s, options)).collect(),
        AnswerValue::Text(s) => split_choice_text(s, options)
            .iter()
            .map(|t| resolve_option(t, options))
            .collect(),
        other => vec![other.to_display()],
    };

    tokens
        .iter()
        .map(|t| normalize(t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// 连写字母只认大写，且整串不能恰好是某个选项的内容（如 "bad"、"CAFE"）
fn split_choice_text(text: &str, options: &[String]) -> Vec<String> {
    let trimmed = text.trim();
    let is_option_text = options.iter().any(|opt| normalize(opt) == normalize(trimmed));
    if is_option_text {
        return vec![trimmed.to_string()];
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, 'A'..='H')) {
        return trimmed.chars().map(|c| c.to_string()).collect();
    }
    trimmed
        .split([',', '，', '、', ';', '；', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// 配对规范化成 (left, right)；文本形式支持 "左-右" / "左:右" / "左=右"
fn match_pairs(value: &AnswerValue) -> Vec<(String, String)> {
    let pairs: Vec<MatchPair> = match value {
        AnswerValue::Pairs(v) => v.clone(),
        AnswerValue::Texts(v) => v.iter().filter_map(|s| parse_pair(s)).collect(),
        AnswerValue::Text(s) => s
            .split([',', '，', ';', '；', '\n'])
            .filter_map(parse_pair)
            .collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .map(|p| (normalize(&p.left), normalize(&p.right)))
        .filter(|p| seen.insert(p.clone()))
        .collect()
}

fn parse_pair(text: &str) -> Option<MatchPair> {
    let (left, right) = text.split_once(['-', ':', '：', '=', '→'])?;
    let (left, right) = (left.trim(), right.trim());
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some(MatchPair::new(left, right))
}
