//! 题目抽取流程 - 流程层
//!
//! 核心职责：定义"一份文档"的完整抽取流程
//!
//! 流程顺序：
//! 1. received
//! 2. 文本模式：extracting_text → chunked_text；图片模式：converting_to_images
//! 3. 逐个处理单元：calling_ai → ai_response_received（单元失败只记录，不中断）
//! 4. merging_questions → saving_questions → done
//!
//! 任何致命错误都以一条 error 终止事件结束；每个任务恰好一条终止事件。

use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use tracing::{debug, error, info, warn};

use crate::clients::AiOracle;
use crate::config::{Config, RetryPolicy};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{DocumentRenderer, ProgressLog, QuestionStore};
use crate::models::progress::{ExtractionStage, ExtractionSummary, JobMode, ProgressEvent};
use crate::models::question::{CanonicalQuestion, ExtractedQuestion};
use crate::services::prompts::{
    build_text_prompt, TEXT_EXTRACTION_SYSTEM, VISION_EXTRACTION_SYSTEM,
};
use crate::services::{
    augment_with_lead_in, merge_questions, normalize_text, parse_unit_response, TextSegmenter,
    UnitOutcome,
};
use crate::utils::truncate_text;
use crate::workflow::job_ctx::JobCtx;

/// 上传的文档
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// 已经提取好的纯文本
    Text(String),
    /// 需要渲染成逐页图片的文档（扫描件、图片）
    Pages(Vec<u8>),
    /// 原始文件直接交给模型
    File { name: String, bytes: Vec<u8> },
}

/// 模式判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum ModeDecision {
    Text,
    Vision,
    /// 附带给用户的指引
    Rejected(String),
}

impl ModeDecision {
    pub fn mode(&self) -> JobMode {
        match self {
            ModeDecision::Text => JobMode::Text,
            ModeDecision::Vision => JobMode::Vision,
            ModeDecision::Rejected(_) => JobMode::Rejected,
        }
    }
}

/// 根据文档类型和模型能力决定处理模式
pub fn resolve_mode(source: &DocumentSource, supports_vision: bool) -> ModeDecision {
    match source {
        DocumentSource::Text(_) => ModeDecision::Text,
        DocumentSource::Pages(_) if supports_vision => ModeDecision::Vision,
        DocumentSource::Pages(_) => ModeDecision::Rejected(
            "当前模型不支持图片识别，请先提取文档文本后再上传，或配置支持图片的模型".to_string(),
        ),
        DocumentSource::File { name, .. } => ModeDecision::Rejected(format!(
            "不支持把文件 {} 直接交给模型，请上传提取后的文本或逐页图片",
            name
        )),
    }
}

/// 一个处理单元：一块文本或一页图片
enum Unit<'a> {
    Text(String),
    Page(&'a [u8]),
}

/// 处理单元的累计结果
#[derive(Default)]
struct UnitTally {
    extracted: Vec<ExtractedQuestion>,
    units_total: usize,
    units_failed: usize,
    /// 重试耗尽、模型调用本身失败的单元；回复无法解析不计入
    calls_failed: usize,
    errors: Vec<String>,
}

/// 题目抽取流程
///
/// - 编排单个文档的完整抽取流程
/// - 只向该任务自己的进度日志写事件
/// - 处理单元串行调用模型，事件顺序即实际完成顺序
pub struct ExtractionFlow {
    oracle: Arc<dyn AiOracle>,
    store: Arc<dyn QuestionStore>,
    renderer: Arc<dyn DocumentRenderer>,
    segmenter: TextSegmenter,
    lead_in_chars: usize,
    retry: RetryPolicy,
    log: Arc<ProgressLog<ExtractionStage>>,
}

impl ExtractionFlow {
    /// 创建新的抽取流程
    pub fn new(
        config: &Config,
        oracle: Arc<dyn AiOracle>,
        store: Arc<dyn QuestionStore>,
        renderer: Arc<dyn DocumentRenderer>,
        log: Arc<ProgressLog<ExtractionStage>>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            oracle,
            store,
            renderer,
            segmenter: TextSegmenter::new(config.segmenter())?,
            lead_in_chars: config.lead_in_chars,
            retry: config.retry_policy(),
            log,
        })
    }

    pub fn supports_vision(&self) -> bool {
        self.oracle.supports_vision()
    }

    /// 运行抽取任务，结束时追加恰好一条终止事件
    pub async fn run(&self, ctx: &JobCtx, source: DocumentSource) -> AppResult<ExtractionSummary> {
        let decision = resolve_mode(&source, self.supports_vision());

        info!(
            "{} 📥 开始处理文档 {}，模式: {}，模型: {}",
            ctx,
            ctx.document_name,
            decision.mode().as_str(),
            self.oracle.model_name()
        );
        self.emit(
            ctx,
            ProgressEvent::new(
                ExtractionStage::Received,
                format!("已接收文档 {}", ctx.document_name),
            )
            .with_metadata(json!({ "mode": decision.mode().as_str() })),
        );

        let mut errors = Vec::new();
        let outcome = self.execute(ctx, source, decision, &mut errors).await;

        match &outcome {
            Ok(summary) => {
                info!(
                    "{} ✅ 处理完成：入库 {} 道，失败 {} 项，重复 {} 道",
                    ctx, summary.success, summary.failed, summary.duplicates
                );
                let result = serde_json::to_value(summary).unwrap_or(JsonValue::Null);
                self.emit(
                    ctx,
                    ProgressEvent::new(
                        ExtractionStage::Done,
                        format!(
                            "处理完成：成功 {} 道，失败 {} 项",
                            summary.success, summary.failed
                        ),
                    )
                    .with_result(result),
                );
            }
            Err(e) => {
                error!("{} ❌ 处理失败: {}", ctx, e);
                self.emit(
                    ctx,
                    ProgressEvent::new(ExtractionStage::Error, e.to_string())
                        .with_metadata(json!({ "kind": e.kind(), "errors": errors })),
                );
            }
        }

        outcome
    }

    async fn execute(
        &self,
        ctx: &JobCtx,
        source: DocumentSource,
        decision: ModeDecision,
        errors: &mut Vec<String>,
    ) -> AppResult<ExtractionSummary> {
        let tally = match (decision, source) {
            (ModeDecision::Rejected(guidance), _) => {
                warn!("{} ⚠️ 拒绝处理: {}", ctx, guidance);
                return Err(AppError::UnsupportedMode(guidance));
            }
            (ModeDecision::Text, DocumentSource::Text(raw)) => {
                self.extract_text(ctx, &raw).await?
            }
            (ModeDecision::Vision, DocumentSource::Pages(bytes)) => {
                self.extract_pages(ctx, &bytes).await?
            }
            (decision, _) => {
                return Err(AppError::UnsupportedMode(format!(
                    "文档类型与处理模式 {} 不匹配",
                    decision.mode().as_str()
                )));
            }
        };

        errors.extend(tally.errors.iter().cloned());

        if tally.units_total > 0 && tally.calls_failed == tally.units_total {
            return Err(AppError::AllUnitsFailed {
                total: tally.units_total,
            });
        }

        // ========== 合并去重 ==========
        self.emit(
            ctx,
            ProgressEvent::new(
                ExtractionStage::MergingQuestions,
                format!("正在合并 {} 道题目", tally.extracted.len()),
            ),
        );
        let merged = merge_questions(tally.extracted);
        info!(
            "{} 🔗 合并完成：保留 {} 道，重复 {} 道，拒绝 {} 道",
            ctx,
            merged.questions.len(),
            merged.duplicates,
            merged.rejected.len()
        );
        errors.extend(merged.rejected.iter().map(|r| r.reason.clone()));

        // ========== 入库 ==========
        self.emit(
            ctx,
            ProgressEvent::new(
                ExtractionStage::SavingQuestions,
                format!("正在保存 {} 道题目", merged.questions.len()),
            )
            .with_counts(0, merged.questions.len()),
        );
        let question_ids = self.persist(ctx, &merged.questions).await?;

        Ok(ExtractionSummary {
            success: question_ids.len(),
            failed: tally.units_failed + merged.rejected.len(),
            duplicates: merged.duplicates,
            units_total: tally.units_total,
            units_failed: tally.units_failed,
            question_ids,
            errors: errors.clone(),
        })
    }

    /// 文本模式：归一化 → 切分 → 逐块调用
    async fn extract_text(&self, ctx: &JobCtx, raw: &str) -> AppResult<UnitTally> {
        self.emit(ctx, ProgressEvent::new(ExtractionStage::ExtractingText, "正在整理文档文本"));

        let text = normalize_text(raw);
        if text.is_empty() {
            return Err(AppError::Input("文档中没有可识别的文本".to_string()));
        }

        let chunks = self.segmenter.segment(&text);
        let incomplete = chunks.iter().filter(|c| c.looks_incomplete).count();
        info!("{} ✂️ 文本共 {} 字，切分为 {} 块", ctx, text.chars().count(), chunks.len());
        self.emit(
            ctx,
            ProgressEvent::new(
                ExtractionStage::ChunkedText,
                format!("文本已切分为 {} 块", chunks.len()),
            )
            .with_counts(chunks.len(), chunks.len())
            .with_metadata(json!({
                "chunks": chunks.len(),
                "chars": text.chars().count(),
                "incomplete": incomplete,
            })),
        );

        let units = (0..chunks.len())
            .map(|i| Unit::Text(augment_with_lead_in(&chunks, i, self.lead_in_chars)))
            .collect();
        Ok(self.process_units(ctx, units).await)
    }

    /// 图片模式：渲染 → 逐页调用
    async fn extract_pages(&self, ctx: &JobCtx, document: &[u8]) -> AppResult<UnitTally> {
        self.emit(
            ctx,
            ProgressEvent::new(ExtractionStage::ConvertingToImages, "正在把文档转换为图片"),
        );

        let pages = self
            .renderer
            .page_images(document)
            .await
            .map_err(|e| AppError::rendering(format!("{:#}", e)))?;
        if pages.is_empty() {
            return Err(AppError::rendering("文档没有可识别的页面"));
        }
        info!("{} 🖼️ 文档共 {} 页", ctx, pages.len());

        let units = pages.iter().map(|p| Unit::Page(p.as_slice())).collect();
        Ok(self.process_units(ctx, units).await)
    }

    /// 串行处理全部单元
    async fn process_units(&self, ctx: &JobCtx, units: Vec<Unit<'_>>) -> UnitTally {
        let total = units.len();
        let mut tally = UnitTally {
            units_total: total,
            ..Default::default()
        };

        for (idx, unit) in units.iter().enumerate() {
            let current = idx + 1;
            let label = match unit {
                Unit::Text(_) => format!("第 {} 块", current),
                Unit::Page(_) => format!("第 {} 页", current),
            };

            self.emit(
                ctx,
                ProgressEvent::new(ExtractionStage::CallingAi, format!("正在识别{}", label))
                    .with_counts(current, total),
            );

            let response = match self.call_with_retry(ctx, unit, current, total, &label).await {
                Ok(response) => response,
                Err(e) => {
                    let message = format!("{}识别失败: {:#}", label, e);
                    error!("{} ❌ {}", ctx, message);
                    tally.units_failed += 1;
                    tally.calls_failed += 1;
                    tally.errors.push(message);
                    self.emit(
                        ctx,
                        ProgressEvent::new(
                            ExtractionStage::AiResponseReceived,
                            format!("{}识别失败", label),
                        )
                        .with_counts(current, total)
                        .with_metadata(json!({ "status": "failed", "questions": 0 })),
                    );
                    continue;
                }
            };

            let (status, count) = match parse_unit_response(&response) {
                UnitOutcome::Questions(questions) => {
                    let count = questions.len();
                    tally.extracted.extend(questions);
                    ("ok", count)
                }
                UnitOutcome::NothingFound(reason) => {
                    debug!("{} {}没有题目: {}", ctx, label, reason);
                    ("empty", 0)
                }
                UnitOutcome::ParseFailure(reason) => {
                    warn!(
                        "{} ⚠️ {}回复无法解析: {} | {}",
                        ctx,
                        label,
                        reason,
                        truncate_text(&response, 80)
                    );
                    tally.units_failed += 1;
                    tally.errors.push(format!("{}回复无法解析: {}", label, reason));
                    ("unparseable", 0)
                }
            };

            info!("{} ✓ {}识别到 {} 道题目", ctx, label, count);
            self.emit(
                ctx,
                ProgressEvent::new(
                    ExtractionStage::AiResponseReceived,
                    format!("{}识别到 {} 道题目", label, count),
                )
                .with_counts(current, total)
                .with_metadata(json!({ "status": status, "questions": count })),
            );
        }

        tally
    }

    /// 调用模型，失败后按固定间隔重试
    async fn call_with_retry(
        &self,
        ctx: &JobCtx,
        unit: &Unit<'_>,
        current: usize,
        total: usize,
        label: &str,
    ) -> anyhow::Result<String> {
        let mut attempt = 1;
        loop {
            let result = match unit {
                Unit::Text(chunk) => {
                    let prompt = build_text_prompt(chunk, current, total);
                    self.oracle.complete(TEXT_EXTRACTION_SYSTEM, &prompt).await
                }
                Unit::Page(image) => {
                    self.oracle.complete_vision(VISION_EXTRACTION_SYSTEM, image).await
                }
            };

            match result {
                Ok(response) => return Ok(response),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        "{} ⚠️ {}第 {} 次调用失败，{:?} 后重试: {:#}",
                        ctx, label, attempt, self.retry.delay, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.context(format!("已尝试 {} 次", attempt))),
            }
        }
    }

    /// 逐题入库；中途失败时删除已入库的题目，不留下部分结果
    async fn persist(
        &self,
        ctx: &JobCtx,
        questions: &[CanonicalQuestion],
    ) -> AppResult<Vec<String>> {
        let total = questions.len();
        let mut ids: Vec<String> = Vec::with_capacity(total);

        for (idx, question) in questions.iter().enumerate() {
            match self.store.insert(question).await {
                Ok(id) => {
                    debug!("{} 💾 已保存第 {}/{} 道题目: {}", ctx, idx + 1, total, id);
                    ids.push(id);
                }
                Err(e) => {
                    error!(
                        "{} ❌ 保存第 {} 道题目失败，回滚 {} 道已保存题目",
                        ctx,
                        idx + 1,
                        ids.len()
                    );
                    for id in &ids {
                        if let Err(rollback_err) = self.store.remove(id).await {
                            warn!("{} ⚠️ 回滚题目 {} 失败: {:#}", ctx, id, rollback_err);
                        }
                    }
                    return Err(AppError::persistence(format!(
                        "保存第 {} 道题目失败: {:#}",
                        idx + 1,
                        e
                    )));
                }
            }
        }

        Ok(ids)
    }

    fn emit(&self, ctx: &JobCtx, event: ProgressEvent<ExtractionStage>) {
        self.log.append(&ctx.job_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mode() {
        assert_eq!(resolve_mode(&DocumentSource::Text("x".into()), false), ModeDecision::Text);
        assert_eq!(resolve_mode(&DocumentSource::Pages(vec![1]), true), ModeDecision::Vision);
        assert!(matches!(
            resolve_mode(&DocumentSource::Pages(vec![1]), false),
            ModeDecision::Rejected(_)
        ));

        let file = DocumentSource::File {
            name: "exam.pdf".into(),
            bytes: vec![],
        };
        match resolve_mode(&file, true) {
            ModeDecision::Rejected(guidance) => assert!(guidance.contains("exam.pdf")),
            other => panic!("unexpected decision: {:?}", other),
        }
    }
}
