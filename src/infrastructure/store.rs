//! 外部协作方接口 - 基础设施层
//!
//! 题目存储、考试 / 提交存储和文档渲染都由外部系统提供，
//! 这里只定义能力边界，并附带内存实现（命令行和测试使用）。

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::exam::{Exam, Submission};
use crate::models::question::CanonicalQuestion;

/// 题目存储
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// 保存一道题，返回题目 ID
    async fn insert(&self, question: &CanonicalQuestion) -> Result<String>;

    /// 删除一道题（持久化中途失败时回滚用）
    async fn remove(&self, id: &str) -> Result<()>;
}

/// 考试与提交记录存储
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>>;

    async fn find_submission(&self, exam_id: &str, learner_id: &str) -> Result<Option<Submission>>;

    async fn upsert_submission(&self, submission: &Submission) -> Result<()>;
}

/// 文档渲染：把文档拆成按页排列的图片
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn page_images(&self, document: &[u8]) -> Result<Vec<Vec<u8>>>;
}

/// 内存题目存储
#[derive(Default)]
pub struct MemoryQuestionStore {
    questions: Mutex<Vec<(String, CanonicalQuestion)>>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的全部题目（按插入顺序）
    pub fn all(&self) -> Vec<(String, CanonicalQuestion)> {
        self.questions.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn insert(&self, question: &CanonicalQuestion) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.questions
            .lock()
            .map_err(|_| anyhow!("题目存储锁已损坏"))?
            .push((id.clone(), question.clone()));
        Ok(id)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.questions
            .lock()
            .map_err(|_| anyhow!("题目存储锁已损坏"))?
            .retain(|(qid, _)| qid != id);
        Ok(())
    }
}

/// 内存考试 / 提交存储
#[derive(Default)]
pub struct MemoryExamStore {
    exams: DashMap<String, Exam>,
    submissions: DashMap<(String, String), Submission>,
}

impl MemoryExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exams(exams: impl IntoIterator<Item = Exam>) -> Self {
        let store = Self::new();
        for exam in exams {
            store.add_exam(exam);
        }
        store
    }

    pub fn add_exam(&self, exam: Exam) {
        self.exams.insert(exam.id.clone(), exam);
    }

    pub fn submissions(&self) -> HashMap<(String, String), Submission> {
        self.submissions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn find_exam(&self, exam_id: &str) -> Result<Option<Exam>> {
        Ok(self.exams.get(exam_id).map(|e| e.clone()))
    }

    async fn find_submission(&self, exam_id: &str, learner_id: &str) -> Result<Option<Submission>> {
        let key = (exam_id.to_string(), learner_id.to_string());
        Ok(self.submissions.get(&key).map(|s| s.clone()))
    }

    async fn upsert_submission(&self, submission: &Submission) -> Result<()> {
        let key = (submission.exam_id.clone(), submission.learner_id.clone());
        self.submissions.insert(key, submission.clone());
        Ok(())
    }
}

/// 上传的就是一张图片：整个文档即为唯一的一页
pub struct PassthroughRenderer;

#[async_trait]
impl DocumentRenderer for PassthroughRenderer {
    async fn page_images(&self, document: &[u8]) -> Result<Vec<Vec<u8>>> {
        if document.is_empty() {
            anyhow::bail!("文档内容为空");
        }
        Ok(vec![document.to_vec()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionType;

    fn question(content: &str) -> CanonicalQuestion {
        CanonicalQuestion {
            content: content.to_string(),
            question_type: QuestionType::SingleChoice,
            options: None,
            answer: None,
            explanation: None,
            tags: vec![],
            difficulty: None,
            knowledge_point: None,
        }
    }

    #[tokio::test]
    async fn test_memory_question_store_insert_and_remove() {
        let store = MemoryQuestionStore::new();
        let id1 = store.insert(&question("a")).await.unwrap();
        let _id2 = store.insert(&question("b")).await.unwrap();
        store.remove(&id1).await.unwrap();

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1.content, "b");
    }

    #[tokio::test]
    async fn test_passthrough_renderer_rejects_empty_document() {
        assert!(PassthroughRenderer.page_images(&[]).await.is_err());
        let pages = PassthroughRenderer.page_images(&[1, 2, 3]).await.unwrap();
        assert_eq!(pages, vec![vec![1, 2, 3]]);
    }
}
