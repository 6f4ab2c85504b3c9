use thiserror::Error;

/// 应用程序错误类型
///
/// 单元级（某一块文本 / 某一页）的失败不会出现在这里，
/// 它们在流程内被记录为部分失败；这里只包含会终止整个任务的错误。
#[derive(Debug, Error)]
pub enum AppError {
    /// 输入错误：文档为空或无法解析，不重试
    #[error("输入错误: {0}")]
    Input(String),

    /// 文档与模型组合不受支持，直接拒绝
    #[error("不支持的处理模式: {0}")]
    UnsupportedMode(String),

    /// 文档渲染（转图片）失败
    #[error("文档渲染失败: {0}")]
    Rendering(String),

    /// 题目或提交记录持久化失败
    #[error("持久化失败: {0}")]
    Persistence(String),

    /// 所有处理单元都失败
    #[error("全部 {total} 个处理单元均失败")]
    AllUnitsFailed { total: usize },

    /// 考试不存在
    #[error("考试不存在: {0}")]
    ExamNotFound(String),

    /// 同一考生重复提交
    #[error("考生 {learner_id} 已提交过考试 {exam_id}")]
    AlreadySubmitted { exam_id: String, learner_id: String },

    /// 调用方等待超时（任务本身仍在运行）
    #[error("等待任务 {job_id} 超时 ({secs} 秒)")]
    Timeout { job_id: String, secs: u64 },

    /// 任务不存在或已被丢弃
    #[error("任务不存在: {0}")]
    JobNotFound(String),

    /// 任务以 error 终止事件结束（等待方看到的结果）
    #[error("任务失败 [{kind}]: {message}")]
    JobFailed { kind: String, message: String },

    /// 其他错误（用于包装第三方库错误）
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建持久化错误
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        AppError::Persistence(err.to_string())
    }

    /// 创建渲染错误
    pub fn rendering(err: impl std::fmt::Display) -> Self {
        AppError::Rendering(err.to_string())
    }

    /// 是否为重复提交（调用方需要区分于一般错误）
    pub fn is_already_submitted(&self) -> bool {
        match self {
            AppError::AlreadySubmitted { .. } => true,
            AppError::JobFailed { kind, .. } => kind == "already_submitted",
            _ => false,
        }
    }

    /// 终止事件里使用的错误类别
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Input(_) => "input",
            AppError::UnsupportedMode(_) => "unsupported_mode",
            AppError::Rendering(_) => "rendering",
            AppError::Persistence(_) => "persistence",
            AppError::AllUnitsFailed { .. } => "all_units_failed",
            AppError::ExamNotFound(_) => "exam_not_found",
            AppError::AlreadySubmitted { .. } => "already_submitted",
            AppError::Timeout { .. } => "timeout",
            AppError::JobNotFound(_) => "job_not_found",
            AppError::JobFailed { .. } => "job_failed",
            AppError::Other(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Other(err.into())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
