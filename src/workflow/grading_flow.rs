//! 批改流程 - 流程层
//!
//! 流程顺序：
//! 1. received
//! 2. 查考试、查重复提交，写入 grading 状态的提交记录
//! 3. 逐题批改（每题一条 grading 事件）
//! 4. 更新提交记录为 graded，追加 complete 终止事件（携带批改结果）
//!
//! 任何一步失败都追加 error 终止事件；重复提交的错误类别为 `already_submitted`。

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::infrastructure::{ExamStore, ProgressLog};
use crate::models::exam::{Answers, GradingResult, Submission, SubmissionStatus};
use crate::models::progress::{GradingStage, ProgressEvent};
use crate::services::GradingEngine;
use crate::workflow::job_ctx::SubmissionCtx;

/// 一次批改请求
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub exam_id: String,
    pub learner_id: String,
    pub answers: Answers,
}

/// 批改流程
pub struct GradingFlow {
    engine: GradingEngine,
    exams: Arc<dyn ExamStore>,
    log: Arc<ProgressLog<GradingStage>>,
}

impl GradingFlow {
    pub fn new(
        engine: GradingEngine,
        exams: Arc<dyn ExamStore>,
        log: Arc<ProgressLog<GradingStage>>,
    ) -> Self {
        Self { engine, exams, log }
    }

    /// 运行批改，结束时追加恰好一条终止事件
    pub async fn run(
        &self,
        ctx: &SubmissionCtx,
        request: SubmissionRequest,
    ) -> AppResult<GradingResult> {
        info!("{} 📥 收到提交，共 {} 个作答", ctx, request.answers.len());
        self.emit(ctx, ProgressEvent::new(GradingStage::Received, "已收到提交"));

        let outcome = self.execute(ctx, request).await;

        match &outcome {
            Ok(result) => {
                info!(
                    "{} ✅ 批改完成：{} / {}，全自动: {}",
                    ctx, result.total_score, result.max_score, result.is_fully_auto_graded
                );
                self.emit(
                    ctx,
                    ProgressEvent::new(
                        GradingStage::Complete,
                        format!("批改完成，总分 {}", result.total_score),
                    )
                    .with_result(serde_json::to_value(result).unwrap_or(JsonValue::Null)),
                );
            }
            Err(e) => self.fail(ctx, e),
        }

        outcome
    }

    /// 追加 error 终止事件
    pub fn fail(&self, ctx: &SubmissionCtx, err: &AppError) {
        if err.is_already_submitted() {
            warn!("{} ⚠️ {}", ctx, err);
        } else {
            error!("{} ❌ 批改失败: {}", ctx, err);
        }
        self.emit(
            ctx,
            ProgressEvent::new(GradingStage::Error, err.to_string()).with_metadata(json!({
                "kind": err.kind(),
                "examId": ctx.exam_id,
                "learnerId": ctx.learner_id,
            })),
        );
    }

    async fn execute(
        &self,
        ctx: &SubmissionCtx,
        request: SubmissionRequest,
    ) -> AppResult<GradingResult> {
        let exam = self
            .exams
            .find_exam(&request.exam_id)
            .await
            .map_err(AppError::persistence)?
            .ok_or_else(|| AppError::ExamNotFound(request.exam_id.clone()))?;

        let existing = self
            .exams
            .find_submission(&request.exam_id, &request.learner_id)
            .await
            .map_err(AppError::persistence)?;

        if let Some(existing) = &existing {
            if existing.blocks_resubmission() {
                return Err(AppError::AlreadySubmitted {
                    exam_id: request.exam_id,
                    learner_id: request.learner_id,
                });
            }
            info!("{} 上次批改失败，重新批改", ctx);
        }

        let mut submission = Submission {
            id: existing.map(|s| s.id).unwrap_or_else(|| Uuid::new_v4().to_string()),
            exam_id: request.exam_id,
            learner_id: request.learner_id,
            answers: request.answers,
            status: SubmissionStatus::Grading,
            result: None,
            submitted_at: Utc::now(),
        };
        self.exams
            .upsert_submission(&submission)
            .await
            .map_err(AppError::persistence)?;

        // ========== 逐题批改 ==========
        let total = exam.questions.len();
        let mut details = BTreeMap::new();
        for (idx, question) in exam.questions.iter().enumerate() {
            self.emit(
                ctx,
                ProgressEvent::new(GradingStage::Grading, format!("正在批改第 {} 题", idx + 1))
                    .with_counts(idx + 1, total)
                    .with_metadata(json!({ "questionId": question.id })),
            );
            let detail = self
                .engine
                .grade_question(question, submission.answers.get(&question.id))
                .await;
            details.insert(question.id.clone(), detail);
        }

        let result = self.engine.aggregate(&exam, details);

        submission.status = SubmissionStatus::Graded;
        submission.result = Some(result.clone());
        if let Err(e) = self.exams.upsert_submission(&submission).await {
            submission.status = SubmissionStatus::Failed;
            submission.result = None;
            if let Err(mark_err) = self.exams.upsert_submission(&submission).await {
                warn!("{} ⚠️ 标记提交失败状态时出错: {:#}", ctx, mark_err);
            }
            return Err(AppError::persistence(format!("{:#}", e)));
        }

        Ok(result)
    }

    fn emit(&self, ctx: &SubmissionCtx, event: ProgressEvent<GradingStage>) {
        self.log.append(&ctx.correlation_key, event);
    }
}
