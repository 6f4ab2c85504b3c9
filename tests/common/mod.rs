//! 集成测试共用的脚本化协作方
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use exam_question_pipeline::infrastructure::{
    DocumentRenderer, MemoryExamStore, MemoryQuestionStore, PassthroughRenderer, QuestionStore,
};
use exam_question_pipeline::models::CanonicalQuestion;
use exam_question_pipeline::{AiOracle, Collaborators, Config, JobDispatcher};
use serde_json::json;

/// 按顺序返回预设回复的模型；脚本用完后回复 "no questions detected"
pub struct ScriptedOracle {
    vision: bool,
    script: Mutex<VecDeque<Result<String, String>>>,
    /// 文本调用收到的用户消息
    pub text_calls: Mutex<Vec<String>>,
    /// 图片调用收到的图片
    pub vision_calls: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedOracle {
    pub fn new(vision: bool) -> Self {
        Self {
            vision,
            script: Mutex::new(VecDeque::new()),
            text_calls: Mutex::new(Vec::new()),
            vision_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, response: impl Into<String>) -> Self {
        self.script.lock().unwrap().push_back(Ok(response.into()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn text_calls(&self) -> Vec<String> {
        self.text_calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.text_calls.lock().unwrap().len() + self.vision_calls.lock().unwrap().len()
    }

    fn next(&self) -> Result<String> {
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok("no questions detected".to_string()),
        }
    }
}

#[async_trait]
impl AiOracle for ScriptedOracle {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn supports_vision(&self) -> bool {
        self.vision
    }

    async fn complete(&self, _system_prompt: &str, user_content: &str) -> Result<String> {
        self.text_calls.lock().unwrap().push(user_content.to_string());
        self.next()
    }

    async fn complete_vision(&self, _system_prompt: &str, image: &[u8]) -> Result<String> {
        self.vision_calls.lock().unwrap().push(image.to_vec());
        self.next()
    }
}

/// 无视文档内容，返回固定页面
pub struct FixedPagesRenderer(pub Vec<Vec<u8>>);

#[async_trait]
impl DocumentRenderer for FixedPagesRenderer {
    async fn page_images(&self, _document: &[u8]) -> Result<Vec<Vec<u8>>> {
        Ok(self.0.clone())
    }
}

/// 第 `fail_on` 次插入失败的题目存储
pub struct FlakyQuestionStore {
    pub inner: MemoryQuestionStore,
    fail_on: usize,
    inserts: AtomicUsize,
    pub removed: Mutex<Vec<String>>,
}

impl FlakyQuestionStore {
    pub fn failing_on(fail_on: usize) -> Self {
        Self {
            inner: MemoryQuestionStore::new(),
            fail_on,
            inserts: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QuestionStore for FlakyQuestionStore {
    async fn insert(&self, question: &CanonicalQuestion) -> Result<String> {
        let n = self.inserts.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_on {
            return Err(anyhow!("数据库连接断开"));
        }
        self.inner.insert(question).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.removed.lock().unwrap().push(id.to_string());
        self.inner.remove(id).await
    }
}

/// 测试用配置：重试间隔和轮询间隔都很短
pub fn test_config() -> Config {
    Config {
        max_concurrent_jobs: 4,
        retry_delay_ms: 5,
        poll_interval_ms: 5,
        heartbeat_interval_secs: 1,
        job_timeout_secs: 10,
        ..Config::default()
    }
}

pub struct Harness {
    pub dispatcher: JobDispatcher,
    pub oracle: Arc<ScriptedOracle>,
    pub exams: Arc<MemoryExamStore>,
}

pub fn harness(
    config: Config,
    oracle: ScriptedOracle,
    questions: Arc<dyn QuestionStore>,
    renderer: Arc<dyn DocumentRenderer>,
) -> Harness {
    let oracle = Arc::new(oracle);
    let exams = Arc::new(MemoryExamStore::new());
    let collaborators = Collaborators {
        oracle: oracle.clone(),
        questions,
        exams: exams.clone(),
        renderer,
    };
    let dispatcher = JobDispatcher::new(config, collaborators).unwrap();
    Harness {
        dispatcher,
        oracle,
        exams,
    }
}

pub fn text_harness(config: Config, oracle: ScriptedOracle) -> (Harness, Arc<MemoryQuestionStore>) {
    let store = Arc::new(MemoryQuestionStore::new());
    let h = harness(config, oracle, store.clone(), Arc::new(PassthroughRenderer));
    (h, store)
}

/// 一组题目的模型回复
pub fn questions_reply(stems: &[&str]) -> String {
    let questions: Vec<_> = stems
        .iter()
        .map(|stem| {
            json!({
                "content": stem,
                "type": "单选题",
                "options": ["A. 对", "B. 错"],
                "answer": "A",
            })
        })
        .collect();
    format!("识别结果如下：\n```json\n{}\n```", json!({ "questions": questions }))
}
