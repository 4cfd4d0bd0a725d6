//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete（非流式）。
//! 失败按类别归入 [`LlmError`]，上层据此记录日志并走兜底策略。

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用失败的类别
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("rate limited, try again later")]
    RateLimited,

    #[error("API key quota exhausted")]
    QuotaExhausted,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// 未配置任何 API Key
    #[error("oracle unavailable")]
    Unavailable,

    #[error("API error: {0}")]
    Api(String),
}

impl LlmError {
    /// 从错误文本归类（OpenAI 兼容服务的错误体里会带 rate_limit / quota 字样）
    ///
    /// 超时文本归为 `Timeout(timeout_secs)`，即调用方配置的请求超时
    pub fn classify(message: &str, timeout_secs: u64) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate_limit") || lower.contains("rate limit") {
            LlmError::RateLimited
        } else if lower.contains("quota") || lower.contains("insufficient balance") {
            LlmError::QuotaExhausted
        } else if lower.contains("timed out") || lower.contains("timeout") {
            LlmError::Timeout(timeout_secs)
        } else {
            LlmError::Api(message.to_string())
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首条回复文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}
