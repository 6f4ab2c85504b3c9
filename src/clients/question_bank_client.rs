/// 题库 API 客户端
///
/// 把合并后的题目写入远程题库，实现 [`QuestionStore`]
use crate::config::Config;
use crate::infrastructure::QuestionStore;
use crate::models::question::CanonicalQuestion;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// 题库 API 客户端
pub struct QuestionBankClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl QuestionBankClient {
    /// 创建新的题库客户端
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.question_bank_api_base_url.trim_end_matches('/').to_string(),
            token: config.question_bank_token.clone(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json, text/plain, */*")
            .header("token", &self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("题库请求失败: {}", url))?;

        let result: Value = response
            .json()
            .await
            .with_context(|| format!("题库响应不是合法 JSON: {}", url))?;

        if !is_success_response(&result) {
            anyhow::bail!("题库返回错误响应 ({}): {}", url, result);
        }

        Ok(result)
    }
}

#[async_trait]
impl QuestionStore for QuestionBankClient {
    async fn insert(&self, question: &CanonicalQuestion) -> Result<String> {
        let body = build_question_data(question);
        let result = self.post("/question/save", &body).await?;

        extract_question_id(&result).context("题库响应中缺少题目ID")
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.post("/question/delete", &json!({ "id": id })).await?;
        Ok(())
    }
}

/// 构建题目数据
fn build_question_data(question: &CanonicalQuestion) -> Value {
    let mut data = serde_json::to_value(question).unwrap_or_else(|_| json!({}));
    data["questionTypeName"] = json!(question.question_type.name());
    data["inputType"] = json!(1);
    data
}

/// 检查响应是否成功
fn is_success_response(result: &Value) -> bool {
    result.get("code").and_then(|v| v.as_u64()) == Some(200)
}

fn extract_question_id(result: &Value) -> Option<String> {
    let data = result.get("data")?;
    let id = data.get("id").unwrap_or(data);
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;

    #[test]
    fn test_response_helpers() {
        assert!(is_success_response(&json!({"code": 200, "data": {"id": 7}})));
        assert!(!is_success_response(&json!({"code": 500})));
        assert!(!is_success_response(&json!({"error": "boom"})));

        assert_eq!(extract_question_id(&json!({"code": 200, "data": {"id": 7}})), Some("7".into()));
        assert_eq!(extract_question_id(&json!({"code": 200, "data": "q-1"})), Some("q-1".into()));
        assert_eq!(extract_question_id(&json!({"code": 200})), None);
    }

    #[test]
    fn test_build_question_data() {
        let q = CanonicalQuestion {
            content: "地球绕太阳公转一周约为一年。".into(),
            question_type: QuestionType::TrueFalse,
            options: None,
            answer: Some(json!(true)),
            explanation: None,
            tags: vec!["地理".into()],
            difficulty: None,
            knowledge_point: None,
        };
        let data = build_question_data(&q);
        assert_eq!(data["questionType"], "true_false");
        assert_eq!(data["questionTypeName"], "判断题");
        assert_eq!(data["tags"][0], "地理");
    }
}
