//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 可选 HTTP / SOCKS5 代理，请求自带超时。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// 创建客户端所需参数
#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: String,
    /// 已规范化的代理地址（带协议前缀）
    pub proxy: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// OpenAI 兼容客户端：持有 Client 与 model 名，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(options: OpenAiOptions) -> Result<Self, LlmError> {
        let mut config = OpenAIConfig::new().with_api_key(options.api_key);
        if let Some(url) = options.base_url.as_deref() {
            config = config.with_api_base(url);
        }

        let mut http = reqwest::Client::builder().timeout(options.timeout);
        if let Some(proxy) = options.proxy.as_deref() {
            tracing::info!("Using proxy {} for oracle", crate::accounts::mask_proxy(proxy));
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| LlmError::Api(e.to_string()))?;
            http = http.proxy(proxy);
        }
        let http = http.build().map_err(|e| LlmError::Api(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(config).with_http_client(http),
            model: options.model,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            timeout: options.timeout,
        })
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::Api(e.to_string());
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                })
            })
            .collect()
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    #[allow(deprecated)]
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| LlmError::Api(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::classify(&e.to_string(), self.timeout.as_secs()))?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                "Oracle tokens: prompt {}, completion {}",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
