//! 命令行应用
//!
//! 负责组装协作方、提交任务并跟随推送流把进度打印到日志。

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{info, warn};

use crate::clients::{OpenAiOracle, QuestionBankClient};
use crate::config::Config;
use crate::infrastructure::{
    MemoryExamStore, MemoryQuestionStore, PassthroughRenderer, QuestionStore,
};
use crate::models::progress::{ProgressEvent, ProgressStage, StreamItem};
use crate::models::{load_answer_sheet, load_exam};
use crate::orchestrator::job_dispatcher::{Collaborators, IngestionRequest, JobDispatcher};
use crate::utils::logging::log_startup;
use crate::workflow::SubmissionRequest;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "text"];
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// 应用主结构
pub struct App {
    dispatcher: JobDispatcher,
    exams: Arc<MemoryExamStore>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        log_startup(config.max_concurrent_jobs, &config.llm_model_name);

        let questions: Arc<dyn QuestionStore> =
            if config.question_bank_api_base_url.trim().is_empty() {
                warn!("⚠️ 未配置题库 API，题目只保存在内存中");
                Arc::new(MemoryQuestionStore::new())
            } else {
                Arc::new(QuestionBankClient::new(&config))
            };
        let exams = Arc::new(MemoryExamStore::new());

        let collaborators = Collaborators {
            oracle: Arc::new(OpenAiOracle::new(&config)),
            questions,
            exams: exams.clone(),
            renderer: Arc::new(PassthroughRenderer),
        };
        let dispatcher = JobDispatcher::new(config, collaborators)?;

        Ok(Self { dispatcher, exams })
    }

    /// 抽取一个文件中的题目
    pub async fn extract(&self, path: &Path) -> Result<()> {
        let request = build_request(path).await?;
        info!("📄 开始抽取: {}", request.name);

        let job_id = self.dispatcher.submit_extraction(request);
        follow(self.dispatcher.subscribe_extraction(&job_id)).await;

        let summary = self.dispatcher.await_extraction(&job_id, None).await?;
        info!("{}", "=".repeat(60));
        info!("📊 抽取统计");
        info!("   成功入库: {} 道", summary.success);
        info!(
            "   失败: {} 项（失败单元 {} / {}）",
            summary.failed, summary.units_failed, summary.units_total
        );
        info!("   重复: {} 道", summary.duplicates);
        for err in &summary.errors {
            warn!("   - {}", err);
        }
        info!("{}", "=".repeat(60));

        self.dispatcher.discard_extraction(&job_id);
        Ok(())
    }

    /// 批改一份答卷
    pub async fn grade(
        &self,
        exam_path: &Path,
        answers_path: &Path,
        learner_id: &str,
    ) -> Result<()> {
        let exam = load_exam(exam_path).await?;
        let sheet = load_answer_sheet(answers_path).await?;
        let learner_id = sheet.learner_id.unwrap_or_else(|| learner_id.to_string());
        info!("📝 批改考试 {}（{} 题），考生 {}", exam.id, exam.questions.len(), learner_id);

        let request = SubmissionRequest {
            exam_id: exam.id.clone(),
            learner_id,
            answers: sheet.answers,
        };
        self.exams.add_exam(exam);

        let key = self.dispatcher.submit_grading(request);
        follow(self.dispatcher.subscribe_grading(&key)).await;

        let result = self.dispatcher.await_grading(&key, None).await?;
        info!("{}", "=".repeat(60));
        info!("📊 总分: {} / {}", result.total_score, result.max_score);
        let auto = if result.is_fully_auto_graded { "是" } else { "否，需人工复核" };
        info!("   全自动批改: {}", auto);
        for (id, detail) in &result.details {
            let review = if detail.needs_review == Some(true) { " [待复核]" } else { "" };
            info!(
                "   {} {}: {} / {} {}{}",
                id, detail.question_type, detail.score, detail.max_score, detail.feedback, review
            );
        }
        info!("{}", "=".repeat(60));

        self.dispatcher.discard_grading(&key);
        Ok(())
    }
}

/// 按扩展名决定文档来源：文本走文本模式，图片走图片模式，其余原样上传
async fn build_request(path: &Path) -> Result<IngestionRequest> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    Ok(if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        IngestionRequest::text(name, String::from_utf8_lossy(&bytes).into_owned())
    } else if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        IngestionRequest::pages(name, bytes)
    } else {
        IngestionRequest::file(name, bytes)
    })
}

/// 跟随推送流，把每条事件写到日志
async fn follow<S, St>(stream: St)
where
    S: ProgressStage + std::fmt::Debug,
    St: futures::Stream<Item = StreamItem<S>>,
{
    let mut stream = Box::pin(stream);
    while let Some(item) = stream.next().await {
        match item {
            StreamItem::Event(event) => log_event(&event),
            StreamItem::Heartbeat { .. } => info!("⏳ 处理中..."),
        }
    }
}

fn log_event<S: ProgressStage + std::fmt::Debug>(event: &ProgressEvent<S>) {
    match (event.current, event.total) {
        (Some(current), Some(total)) => {
            info!("  [{:?}] ({}/{}) {}", event.stage, current, total, event.message)
        }
        _ => info!("  [{:?}] {}", event.stage, event.message),
    }
}
