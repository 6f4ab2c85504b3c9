//! # Exam Question Pipeline
//!
//! 把非结构化的试卷材料（文本、扫描页）抽取成结构化题目，并自动批改考生答卷
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 进度日志和外部协作方接口
//! - `ProgressLog` - 按任务划分、容量有上限的只追加事件日志
//! - `QuestionStore` / `ExamStore` / `DocumentRenderer` - 存储与渲染能力边界
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `TextSegmenter` - 文本切分
//! - `response_parser` - 模型回复解析
//! - `merge_service` - 合并去重
//! - `GradingEngine` - 客观题比对 + 主观题 AI 评分
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整处理流程
//! - `JobCtx` / `SubmissionCtx` - 上下文封装
//! - `ExtractionFlow` - 抽取流程（切分 / 渲染 → 逐单元调用 → 合并 → 入库）
//! - `GradingFlow` - 批改流程（查重 → 逐题批改 → 保存结果）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_dispatcher` - 任务分发、并发控制、进度查询
//! - `orchestrator/app` - 命令行应用
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{AiOracle, OpenAiOracle, QuestionBankClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::ProgressLog;
pub use models::{
    CanonicalQuestion, Exam, ExtractedQuestion, ExtractionSummary, GradingResult, QuestionType,
};
pub use orchestrator::{App, Collaborators, IngestionRequest, JobDispatcher};
pub use workflow::{DocumentSource, SubmissionRequest};
