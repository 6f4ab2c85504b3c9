//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务派发和并发调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `job_dispatcher` - 任务分发器
//! - 持有两份进度日志（抽取任务 / 批改通道）
//! - 提交即返回任务 ID，后台 `tokio::spawn` 执行
//! - 控制并发数量（Semaphore）
//! - 拦截同一考生的并发重复批改
//! - 轮询、推送订阅、带超时的等待
//!
//! ### `app` - 命令行应用
//! - 组装协作方（LLM、题库、内存存储）
//! - 提交任务并跟随进度输出统计信息
//!
//! ## 层次关系
//!
//! ```text
//! app (命令行)
//!     ↓
//! job_dispatcher (处理多个任务)
//!     ↓
//! workflow::ExtractionFlow / GradingFlow (处理单个任务)
//!     ↓
//! services (能力层：切分 / 解析 / 合并 / 批改)
//!     ↓
//! infrastructure (基础设施：进度日志、存储接口)
//! ```

pub mod app;
pub mod job_dispatcher;

// 重新导出主要类型
pub use app::App;
pub use job_dispatcher::{Collaborators, IngestionRequest, JobDispatcher};
