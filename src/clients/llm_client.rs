//! LLM 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! 上层只依赖 [`AiOracle`]，测试里可以替换成脚本化的实现。

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, warn};

use crate::config::Config;

/// AI 能力边界：文本补全 + 图片识别
#[async_trait]
pub trait AiOracle: Send + Sync {
    /// 当前使用的模型（仅用于日志）
    fn model_name(&self) -> &str;

    /// 是否支持图片输入
    fn supports_vision(&self) -> bool;

    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String>;

    async fn complete_vision(&self, system_prompt: &str, image: &[u8]) -> Result<String>;
}

/// 基于 OpenAI 兼容接口的实现
pub struct OpenAiOracle {
    client: Client<OpenAIConfig>,
    model_name: String,
    vision_model_name: Option<String>,
    max_tokens: u32,
}

impl OpenAiOracle {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        let vision_model_name = Some(config.llm_vision_model_name.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
            vision_model_name,
            max_tokens: config.llm_max_tokens,
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `model`: 模型名称
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    /// - `imgs`: 图片 URL 列表（可选，支持 data URL），会追加到用户消息中
    async fn send_to_llm(
        &self,
        model: &str,
        user_message: &str,
        system_message: Option<&str>,
        imgs: Option<&[String]>,
    ) -> Result<String> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = match imgs {
            Some(img_urls) if !img_urls.is_empty() => {
                // Vision API：文本 + 图片
                let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                    Vec::new();

                content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: user_message.to_string(),
                    },
                ));

                for url in img_urls.iter() {
                    content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                        ChatCompletionRequestMessageContentPartImage {
                            image_url: ImageUrl {
                                url: url.clone(),
                                detail: Some(ImageDetail::High),
                            },
                        },
                    ));
                }

                debug!("使用 Vision API，包含 {} 张图片", img_urls.len());

                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                    .build()?
            }
            _ => ChatCompletionRequestUserMessageArgs::default()
                .content(user_message)
                .build()?,
        };

        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.2)
            .max_tokens(self.max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            anyhow::anyhow!("LLM API 调用失败: {}", e)
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("LLM 返回内容为空"))?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl AiOracle for OpenAiOracle {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn supports_vision(&self) -> bool {
        self.vision_model_name.is_some()
    }

    async fn complete(&self, system_prompt: &str, user_content: &str) -> Result<String> {
        self.send_to_llm(&self.model_name, user_content, Some(system_prompt), None)
            .await
    }

    async fn complete_vision(&self, system_prompt: &str, image: &[u8]) -> Result<String> {
        let model = self
            .vision_model_name
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("未配置图片识别模型"))?;
        let urls = vec![image_data_url(image)];
        self.send_to_llm(
            model,
            "请识别这一页中的全部题目，按要求输出 JSON。",
            Some(system_prompt),
            Some(&urls),
        )
        .await
    }
}

/// 把图片字节编码成 data URL（按文件头判断 PNG / JPEG）
pub fn image_data_url(image: &[u8]) -> String {
    let mime = if image.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if image.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if image.starts_with(b"GIF8") {
        "image/gif"
    } else if image.len() >= 12 && &image[0..4] == b"RIFF" && &image[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    };
    format!("data:{};base64,{}", mime, STANDARD.encode(image))
}
