use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 进度阶段需要实现的能力
pub trait ProgressStage: Clone + Send + Sync + 'static {
    /// 是否为终止阶段（完成 / 出错）
    fn is_terminal(&self) -> bool;
}

/// 抽取任务的阶段
///
/// 顺序：received → extracting_text | converting_to_images → chunked_text（仅文本模式）
/// → calling_ai → ai_response_received → merging_questions → saving_questions → done；
/// error 可以在任意阶段出现并终止任务。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Received,
    ExtractingText,
    ConvertingToImages,
    ChunkedText,
    CallingAi,
    AiResponseReceived,
    MergingQuestions,
    SavingQuestions,
    Done,
    Error,
}

impl ProgressStage for ExtractionStage {
    fn is_terminal(&self) -> bool {
        matches!(self, ExtractionStage::Done | ExtractionStage::Error)
    }
}

/// 批改通道的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingStage {
    Received,
    Grading,
    Complete,
    Error,
}

impl ProgressStage for GradingStage {
    fn is_terminal(&self) -> bool {
        matches!(self, GradingStage::Complete | GradingStage::Error)
    }
}

/// 抽取任务的处理模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Text,
    Vision,
    Rejected,
}

impl JobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMode::Text => "text",
            JobMode::Vision => "vision",
            JobMode::Rejected => "rejected",
        }
    }
}

/// 一条进度事件，追加后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent<S> {
    /// 毫秒时间戳，由进度日志在追加时赋值，同一任务内严格递增
    pub timestamp: i64,
    pub stage: S,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
}

impl<S: ProgressStage> ProgressEvent<S> {
    pub fn new(stage: S, message: impl Into<String>) -> Self {
        Self {
            timestamp: 0,
            stage,
            message: message.into(),
            current: None,
            total: None,
            metadata: None,
            result: None,
        }
    }

    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_result(mut self, result: JsonValue) -> Self {
        self.result = Some(result);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// 推送订阅产生的条目
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamItem<S> {
    Event(ProgressEvent<S>),
    /// 空闲心跳，保持长连接
    Heartbeat { timestamp: i64 },
}

/// 抽取任务终止事件里的结果摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    /// 成功入库的题目数
    pub success: usize,
    /// 失败的处理单元数 + 被拒绝的题目数
    pub failed: usize,
    /// 被去重丢弃的题目数
    pub duplicates: usize,
    pub units_total: usize,
    pub units_failed: usize,
    pub question_ids: Vec<String>,
    pub errors: Vec<String>,
}
