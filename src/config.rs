use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::services::segmenter::SegmenterConfig;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时运行的任务数量（抽取 + 批改）
    pub max_concurrent_jobs: usize,
    /// 单个任务保留的进度事件上限
    pub max_events_per_job: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 识别页面图片使用的模型，为空时表示不支持图片模式
    pub llm_vision_model_name: String,
    pub llm_max_tokens: u32,
    // --- 文本切分 ---
    pub max_chunk_chars: usize,
    pub chunk_overlap_chars: usize,
    pub min_chunk_chars: usize,
    pub incomplete_tail_chars: usize,
    pub lead_in_chars: usize,
    // --- 重试与超时 ---
    pub unit_max_attempts: usize,
    pub retry_delay_ms: u64,
    pub job_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
    // --- 批改阈值 ---
    pub review_confidence_threshold: f64,
    pub auto_grade_confidence_threshold: f64,
    // --- 题库 API 配置 ---
    pub question_bank_api_base_url: String,
    pub question_bank_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 8,
            max_events_per_job: 200,
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            llm_vision_model_name: "gpt-4o".to_string(),
            llm_max_tokens: 4096,
            max_chunk_chars: 6000,
            chunk_overlap_chars: 300,
            min_chunk_chars: 1500,
            incomplete_tail_chars: 200,
            lead_in_chars: 500,
            unit_max_attempts: 2,
            retry_delay_ms: 1500,
            job_timeout_secs: 300,
            poll_interval_ms: 500,
            heartbeat_interval_secs: 15,
            review_confidence_threshold: 0.8,
            auto_grade_confidence_threshold: 0.9,
            question_bank_api_base_url: String::new(),
            question_bank_token: String::new(),
        }
    }
}

/// 单元级重试策略（固定间隔，不做指数退避）
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Config {
    /// 先读取 TOML 配置文件（如果存在），再用环境变量覆盖
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("EXAM_PIPELINE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let base = if Path::new(&path).exists() {
            Self::from_toml_file(&path)?
        } else {
            Self::default()
        };
        Ok(base.with_env_overrides())
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(self) -> Self {
        let d = self;
        Self {
            max_concurrent_jobs: env_parse("MAX_CONCURRENT_JOBS").unwrap_or(d.max_concurrent_jobs),
            max_events_per_job: env_parse("MAX_EVENTS_PER_JOB").unwrap_or(d.max_events_per_job),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(d.verbose_logging),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(d.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(d.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(d.llm_model_name),
            llm_vision_model_name: std::env::var("LLM_VISION_MODEL_NAME")
                .unwrap_or(d.llm_vision_model_name),
            llm_max_tokens: env_parse("LLM_MAX_TOKENS").unwrap_or(d.llm_max_tokens),
            max_chunk_chars: env_parse("MAX_CHUNK_CHARS").unwrap_or(d.max_chunk_chars),
            chunk_overlap_chars: env_parse("CHUNK_OVERLAP_CHARS").unwrap_or(d.chunk_overlap_chars),
            min_chunk_chars: env_parse("MIN_CHUNK_CHARS").unwrap_or(d.min_chunk_chars),
            incomplete_tail_chars: env_parse("INCOMPLETE_TAIL_CHARS")
                .unwrap_or(d.incomplete_tail_chars),
            lead_in_chars: env_parse("LEAD_IN_CHARS").unwrap_or(d.lead_in_chars),
            unit_max_attempts: env_parse("UNIT_MAX_ATTEMPTS").unwrap_or(d.unit_max_attempts),
            retry_delay_ms: env_parse("RETRY_DELAY_MS").unwrap_or(d.retry_delay_ms),
            job_timeout_secs: env_parse("JOB_TIMEOUT_SECS").unwrap_or(d.job_timeout_secs),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS").unwrap_or(d.poll_interval_ms),
            heartbeat_interval_secs: env_parse("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or(d.heartbeat_interval_secs),
            review_confidence_threshold: env_parse("REVIEW_CONFIDENCE_THRESHOLD")
                .unwrap_or(d.review_confidence_threshold),
            auto_grade_confidence_threshold: env_parse("AUTO_GRADE_CONFIDENCE_THRESHOLD")
                .unwrap_or(d.auto_grade_confidence_threshold),
            question_bank_api_base_url: std::env::var("QUESTION_BANK_API_BASE_URL")
                .unwrap_or(d.question_bank_api_base_url),
            question_bank_token: std::env::var("QUESTION_BANK_TOKEN")
                .unwrap_or(d.question_bank_token),
        }
    }

    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            max_chunk_chars: self.max_chunk_chars.max(1),
            overlap_chars: self.chunk_overlap_chars,
            min_chunk_chars: self.min_chunk_chars,
            tail_window_chars: self.incomplete_tail_chars.max(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.unit_max_attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_partial_override_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            max_chunk_chars = 800
            llm_model_name = "qwen-plus"
            review_confidence_threshold = 0.75
            "#,
        )
        .unwrap();

        assert_eq!(config.max_chunk_chars, 800);
        assert_eq!(config.llm_model_name, "qwen-plus");
        assert_eq!(config.review_confidence_threshold, 0.75);
        // 未出现的字段保持默认值
        assert_eq!(config.chunk_overlap_chars, 300);
        assert_eq!(config.unit_max_attempts, 2);
    }

    #[test]
    fn test_derived_values() {
        let config = Config {
            unit_max_attempts: 0,
            retry_delay_ms: 250,
            ..Config::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(250));
        assert_eq!(config.segmenter().overlap_chars, 300);
        assert_eq!(config.job_timeout(), Duration::from_secs(300));
    }
}
