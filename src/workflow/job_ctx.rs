//! 任务上下文
//!
//! 封装"我正在处理哪个任务 / 哪份提交"这一信息，主要用于日志前缀

use std::fmt::Display;

use crate::models::progress::JobMode;

/// 抽取任务上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    /// 任务ID
    pub job_id: String,

    /// 处理模式
    pub mode: JobMode,

    /// 文档名称（仅用于日志显示）
    pub document_name: String,
}

impl JobCtx {
    pub fn new(job_id: impl Into<String>, mode: JobMode, document_name: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            mode,
            document_name: document_name.into(),
        }
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {}]", self.job_id)
    }
}

/// 批改提交上下文
#[derive(Debug, Clone)]
pub struct SubmissionCtx {
    /// 关联键（批改通道的任务ID）
    pub correlation_key: String,
    pub exam_id: String,
    pub learner_id: String,
}

impl SubmissionCtx {
    pub fn new(
        correlation_key: impl Into<String>,
        exam_id: impl Into<String>,
        learner_id: impl Into<String>,
    ) -> Self {
        Self {
            correlation_key: correlation_key.into(),
            exam_id: exam_id.into(),
            learner_id: learner_id.into(),
        }
    }

    /// (考试, 考生) 对，同一对同时只能有一次批改
    pub fn pair(&self) -> (String, String) {
        (self.exam_id.clone(), self.learner_id.clone())
    }
}

impl Display for SubmissionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[提交 {}/{}]", self.exam_id, self.learner_id)
    }
}
