use crate::models::exam::{Answers, Exam};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// 答题卡文件
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSheet {
    #[serde(default)]
    pub learner_id: Option<String>,
    #[serde(default)]
    pub answers: Answers,
}

/// 从 TOML 文件加载考试定义
pub async fn load_exam(toml_file_path: &Path) -> Result<Exam> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let exam: Exam = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "成功加载考试 {} ({} 道题)",
        exam.id,
        exam.questions.len()
    );

    Ok(exam)
}

/// 从 TOML 文件加载答题卡
pub async fn load_answer_sheet(toml_file_path: &Path) -> Result<AnswerSheet> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let sheet: AnswerSheet = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(sheet)
}
