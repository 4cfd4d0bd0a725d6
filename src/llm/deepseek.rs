//! DeepSeek API 客户端（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（默认，见 `oracle.model`）

use std::sync::Arc;
use std::time::Duration;

use crate::accounts::normalize_proxy;
use crate::config::OracleSection;
use crate::llm::{LlmClient, LlmError, OpenAiClient, OpenAiOptions};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 按 [oracle] 段为每个 API Key 创建一个客户端
///
/// - 未配置 base_url 时使用 DeepSeek 官方端点
/// - 未配置任何 Key 时回退读取环境变量 `DEEPSEEK_API_KEY`；仍没有则返回空列表（顾问停用）
pub fn create_oracle_clients(cfg: &OracleSection) -> Result<Vec<Arc<dyn LlmClient>>, LlmError> {
    let mut keys: Vec<String> = cfg
        .api_keys
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if keys.is_empty() {
        if let Ok(key) = std::env::var("DEEPSEEK_API_KEY") {
            keys.push(key);
        }
    }

    let base_url = cfg
        .base_url
        .clone()
        .unwrap_or_else(|| DEEPSEEK_BASE_URL.to_string());
    let proxy = cfg.proxy.as_deref().and_then(normalize_proxy);

    keys.into_iter()
        .map(|api_key| {
            let client = OpenAiClient::new(OpenAiOptions {
                base_url: Some(base_url.clone()),
                model: cfg.model.clone(),
                api_key,
                proxy: proxy.clone(),
                timeout: Duration::from_secs(cfg.request_timeout_secs),
                temperature: cfg.temperature,
                max_tokens: cfg.max_tokens,
            })?;
            Ok(Arc::new(client) as Arc<dyn LlmClient>)
        })
        .collect()
}
