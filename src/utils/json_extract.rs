//! 从 LLM 的原始回复中提取 JSON
//!
//! 模型经常在 JSON 前后加上说明文字或 ```json 代码块，
//! 这里找到第一个括号平衡、且能被解析的对象或数组。

use serde_json::Value as JsonValue;

/// 返回第一个括号平衡的 JSON 片段（对象或数组），不做解析
pub fn first_balanced_json(text: &str) -> Option<&str> {
    balanced_candidates(text).next()
}

/// 提取并解析第一个合法的 JSON 对象或数组
///
/// 如果第一个平衡片段不是合法 JSON（例如说明文字里的 `[注]`），
/// 继续尝试后面的候选。
pub fn extract_json(text: &str) -> Option<JsonValue> {
    balanced_candidates(text).find_map(|candidate| serde_json::from_str(candidate).ok())
}

fn balanced_candidates(text: &str) -> impl Iterator<Item = &str> {
    let starts: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .map(|(i, _)| i)
        .collect();

    starts.into_iter().filter_map(move |start| balanced_from(text, start))
}

/// 从 `start` 处的开括号开始，找到与之配对的闭括号
fn balanced_from(text: &str, start: usize) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.pop() != Some(c) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}
