//! 决策顾问
//!
//! 把「说明 + 上下文」交给 LLM 求一个建议。调用带超时；多个 API Key 时每次随机挑一个。
//! 顾问不可用（未配置 Key、超时、服务报错）时返回 [`LlmError`]，由调用方回退到确定性策略。

pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info};

use crate::config::OracleSection;
use crate::llm::{create_oracle_clients, LlmClient, LlmError, Message};

/// 决策顾问接口
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// 返回一段自由文本建议
    async fn advise(&self, instructions: &str, context: &str) -> Result<String, LlmError>;
}

/// 未配置任何 Key 时使用：总是不可用
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledOracle;

#[async_trait]
impl DecisionOracle for DisabledOracle {
    async fn advise(&self, _instructions: &str, _context: &str) -> Result<String, LlmError> {
        Err(LlmError::Unavailable)
    }
}

/// 基于 LLM 客户端池的顾问
pub struct LlmOracle {
    clients: Vec<Arc<dyn LlmClient>>,
    system_prompt: String,
    timeout: Duration,
}

impl LlmOracle {
    pub fn new(clients: Vec<Arc<dyn LlmClient>>, timeout: Duration) -> Self {
        Self {
            clients,
            system_prompt: prompts::SYSTEM_PROMPT.to_string(),
            timeout,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn pool_size(&self) -> usize {
        self.clients.len()
    }

    fn pick_client(&self) -> Option<Arc<dyn LlmClient>> {
        let mut rng = rand::thread_rng();
        self.clients.choose(&mut rng).cloned()
    }
}

#[async_trait]
impl DecisionOracle for LlmOracle {
    async fn advise(&self, instructions: &str, context: &str) -> Result<String, LlmError> {
        let client = self.pick_client().ok_or(LlmError::Unavailable)?;
        let messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(prompts::user_message(context, instructions)),
        ];

        let answer = match tokio::time::timeout(self.timeout, client.complete(&messages)).await {
            Ok(result) => result?,
            Err(_) => return Err(LlmError::Timeout(self.timeout.as_secs())),
        };
        debug!("Oracle answer: {}", answer);
        Ok(answer)
    }
}

/// 按 [oracle] 段创建顾问；没有可用 Key 时返回 [`DisabledOracle`]
pub fn create_oracle_from_config(cfg: &OracleSection) -> Result<Arc<dyn DecisionOracle>, LlmError> {
    let clients = create_oracle_clients(cfg)?;
    if clients.is_empty() {
        info!("No oracle API key configured, decisions use the fallback strategy");
        return Ok(Arc::new(DisabledOracle));
    }
    info!(
        "Oracle enabled: model {}, {} API key(s)",
        cfg.model,
        clients.len()
    );
    Ok(Arc::new(LlmOracle::new(
        clients,
        Duration::from_secs(cfg.request_timeout_secs),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, Role};

    #[tokio::test]
    async fn test_disabled_oracle_is_unavailable() {
        let oracle = DisabledOracle;
        assert_eq!(oracle.advise("a", "b").await, Err(LlmError::Unavailable));
    }

    #[tokio::test]
    async fn test_empty_pool_is_unavailable() {
        let oracle = LlmOracle::new(vec![], Duration::from_secs(1));
        assert_eq!(oracle.pool_size(), 0);
        assert_eq!(oracle.advise("a", "b").await, Err(LlmError::Unavailable));
    }

    #[tokio::test]
    async fn test_advise_sends_system_and_user_message() {
        let mock = Arc::new(MockLlmClient::replying("建议出 paper"));
        let oracle = LlmOracle::new(vec![mock.clone() as Arc<dyn LlmClient>], Duration::from_secs(5))
            .with_system_prompt("SYS");

        let answer = oracle.advise("选一个", "血量=3").await.unwrap();
        assert_eq!(answer, "建议出 paper");

        let messages = mock.last_messages().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "SYS");
        assert!(messages[1].content.contains("血量=3"));
        assert!(messages[1].content.contains("选一个"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_advise_times_out() {
        let mock = MockLlmClient::replying("建议出 rock").with_delay(Duration::from_secs(120));
        let oracle = LlmOracle::new(vec![Arc::new(mock) as Arc<dyn LlmClient>], Duration::from_secs(60));
        assert_eq!(oracle.advise("a", "b").await, Err(LlmError::Timeout(60)));
    }

    #[tokio::test]
    async fn test_advise_propagates_client_error() {
        let mock = MockLlmClient::failing(LlmError::RateLimited);
        let oracle = LlmOracle::new(vec![Arc::new(mock) as Arc<dyn LlmClient>], Duration::from_secs(5));
        assert_eq!(oracle.advise("a", "b").await, Err(LlmError::RateLimited));
    }
}
