//! 任务分发器 - 编排层
//!
//! ## 职责
//!
//! 1. **提交即返回**：`submit_*` 只创建任务、派发到后台，立即返回任务 ID
//! 2. **并发控制**：所有任务共享一个 Semaphore
//! 3. **进度查询**：轮询（`*_progress`）、推送订阅（`subscribe_*`）、等待终止（`await_*`）
//! 4. **重复批改拦截**：同一 (考试, 考生) 同时只允许一次批改
//!
//! 等待超时只影响调用方，后台任务照常运行到结束。

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::Stream;
use tokio::sync::Semaphore;
use tracing::{error, info};
use uuid::Uuid;

use crate::clients::AiOracle;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::{DocumentRenderer, ExamStore, ProgressLog, QuestionStore};
use crate::models::exam::GradingResult;
use crate::models::progress::{
    ExtractionStage, ExtractionSummary, GradingStage, ProgressEvent, ProgressStage, StreamItem,
};
use crate::services::GradingEngine;
use crate::workflow::{
    resolve_mode, DocumentSource, ExtractionFlow, GradingFlow, JobCtx, SubmissionCtx,
    SubmissionRequest,
};

/// 外部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub oracle: Arc<dyn AiOracle>,
    pub questions: Arc<dyn QuestionStore>,
    pub exams: Arc<dyn ExamStore>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

/// 一次抽取请求
#[derive(Debug, Clone)]
pub struct IngestionRequest {
    /// 文档名称（仅用于日志和提示）
    pub name: String,
    pub source: DocumentSource,
}

impl IngestionRequest {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: DocumentSource::Text(text.into()),
        }
    }

    pub fn pages(name: impl Into<String>, document: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            source: DocumentSource::Pages(document),
        }
    }

    pub fn file(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            source: DocumentSource::File {
                name: name.clone(),
                bytes,
            },
            name,
        }
    }
}

type InFlight = DashMap<(String, String), String>;

/// 批改结束（无论成败）时释放 (考试, 考生) 占位
struct InFlightGuard {
    map: Arc<InFlight>,
    pair: (String, String),
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.map.remove_if(&self.pair, |_, key| key == &self.key);
    }
}

/// 任务分发器
pub struct JobDispatcher {
    config: Config,
    extraction_log: Arc<ProgressLog<ExtractionStage>>,
    grading_log: Arc<ProgressLog<GradingStage>>,
    extraction_flow: Arc<ExtractionFlow>,
    grading_flow: Arc<GradingFlow>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
}

impl JobDispatcher {
    pub fn new(config: Config, collaborators: Collaborators) -> AppResult<Self> {
        let extraction_log = Arc::new(ProgressLog::new(config.max_events_per_job));
        let grading_log = Arc::new(ProgressLog::new(config.max_events_per_job));

        let extraction_flow = ExtractionFlow::new(
            &config,
            Arc::clone(&collaborators.oracle),
            collaborators.questions,
            collaborators.renderer,
            Arc::clone(&extraction_log),
        )?;
        let engine = GradingEngine::new(collaborators.oracle, &config);
        let grading_flow = GradingFlow::new(engine, collaborators.exams, Arc::clone(&grading_log));

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            config,
            extraction_log,
            grading_log,
            extraction_flow: Arc::new(extraction_flow),
            grading_flow: Arc::new(grading_flow),
            in_flight: Arc::new(DashMap::new()),
        })
    }

    // ========== 抽取任务 ==========

    /// 提交抽取任务，立即返回任务 ID
    pub fn submit_extraction(&self, request: IngestionRequest) -> String {
        let job_id = Uuid::new_v4().to_string();
        self.extraction_log.create_job(&job_id);

        let mode = resolve_mode(&request.source, self.extraction_flow.supports_vision()).mode();
        let ctx = JobCtx::new(job_id.clone(), mode, request.name);
        info!(
            "{} 📝 已提交抽取任务，模式: {}（日志中共 {} 个任务）",
            ctx,
            mode.as_str(),
            self.extraction_log.job_count()
        );

        let flow = Arc::clone(&self.extraction_flow);
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("{} ❌ 无法获取执行许可: {}", ctx, e);
                    return;
                }
            };
            // 结果已经写入进度日志
            let _ = flow.run(&ctx, request.source).await;
        });

        job_id
    }

    pub fn extraction_progress(
        &self,
        job_id: &str,
        since: Option<i64>,
    ) -> AppResult<Vec<ProgressEvent<ExtractionStage>>> {
        read_progress(&self.extraction_log, job_id, since)
    }

    pub fn subscribe_extraction(
        &self,
        job_id: &str,
    ) -> impl Stream<Item = StreamItem<ExtractionStage>> + Send + 'static {
        self.extraction_log
            .subscribe(job_id, self.config.poll_interval(), self.config.heartbeat_interval())
    }

    /// 等待抽取任务结束；`timeout` 为空时使用配置的超时时间
    pub async fn await_extraction(
        &self,
        job_id: &str,
        timeout: Option<Duration>,
    ) -> AppResult<ExtractionSummary> {
        let event = self.wait_terminal(&self.extraction_log, job_id, timeout).await?;
        match event.stage {
            ExtractionStage::Done => Ok(serde_json::from_value(event.result.unwrap_or_default())?),
            _ => Err(job_failed(&event)),
        }
    }

    pub fn discard_extraction(&self, job_id: &str) {
        self.extraction_log.discard(job_id);
    }

    // ========== 批改任务 ==========

    /// 提交批改，立即返回关联键
    ///
    /// 同一 (考试, 考生) 的批改正在进行时，新提交直接以 `already_submitted` 结束。
    pub fn submit_grading(&self, request: SubmissionRequest) -> String {
        let key = Uuid::new_v4().to_string();
        self.grading_log.create_job(&key);

        let ctx = SubmissionCtx::new(
            key.clone(),
            request.exam_id.clone(),
            request.learner_id.clone(),
        );
        let pair = ctx.pair();

        let accepted = match self.in_flight.entry(pair.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(key.clone());
                true
            }
        };
        if !accepted {
            self.grading_flow.fail(
                &ctx,
                &AppError::AlreadySubmitted {
                    exam_id: ctx.exam_id.clone(),
                    learner_id: ctx.learner_id.clone(),
                },
            );
            return key;
        }

        info!("{} 📝 已提交批改", ctx);

        let guard = InFlightGuard {
            map: Arc::clone(&self.in_flight),
            pair,
            key: key.clone(),
        };
        let flow = Arc::clone(&self.grading_flow);
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _guard = guard;
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("{} ❌ 无法获取执行许可: {}", ctx, e);
                    return;
                }
            };
            let _ = flow.run(&ctx, request).await;
        });

        key
    }

    pub fn grading_progress(
        &self,
        key: &str,
        since: Option<i64>,
    ) -> AppResult<Vec<ProgressEvent<GradingStage>>> {
        read_progress(&self.grading_log, key, since)
    }

    pub fn subscribe_grading(
        &self,
        key: &str,
    ) -> impl Stream<Item = StreamItem<GradingStage>> + Send + 'static {
        self.grading_log
            .subscribe(key, self.config.poll_interval(), self.config.heartbeat_interval())
    }

    pub async fn await_grading(
        &self,
        key: &str,
        timeout: Option<Duration>,
    ) -> AppResult<GradingResult> {
        let event = self.wait_terminal(&self.grading_log, key, timeout).await?;
        match event.stage {
            GradingStage::Complete => Ok(serde_json::from_value(event.result.unwrap_or_default())?),
            _ => Err(job_failed(&event)),
        }
    }

    pub fn discard_grading(&self, key: &str) {
        self.grading_log.discard(key);
    }

    /// 轮询直到出现终止事件；超时只返回错误，不取消任务
    async fn wait_terminal<S: ProgressStage>(
        &self,
        log: &ProgressLog<S>,
        job_id: &str,
        timeout: Option<Duration>,
    ) -> AppResult<ProgressEvent<S>> {
        let timeout = timeout.unwrap_or_else(|| self.config.job_timeout());
        let poll = self.config.poll_interval();

        let wait = async {
            loop {
                if let Some(event) = log.terminal_event(job_id) {
                    return Ok(event);
                }
                if !log.contains(job_id) {
                    return Err(AppError::JobNotFound(job_id.to_string()));
                }
                tokio::time::sleep(poll).await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| AppError::Timeout {
                job_id: job_id.to_string(),
                secs: timeout.as_secs(),
            })?
    }
}

fn read_progress<S: ProgressStage>(
    log: &ProgressLog<S>,
    job_id: &str,
    since: Option<i64>,
) -> AppResult<Vec<ProgressEvent<S>>> {
    if !log.contains(job_id) {
        return Err(AppError::JobNotFound(job_id.to_string()));
    }
    Ok(log.read_since(job_id, since))
}

fn job_failed<S>(event: &ProgressEvent<S>) -> AppError {
    let kind = event
        .metadata
        .as_ref()
        .and_then(|m| m.get("kind"))
        .and_then(|k| k.as_str())
        .unwrap_or("unknown");
    AppError::JobFailed {
        kind: kind.to_string(),
        message: event.message.clone(),
    }
}
