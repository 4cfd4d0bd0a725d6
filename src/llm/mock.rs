//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序吐出预设的回复或错误；脚本用完后重复最后一项。记录收到的消息便于断言。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    last: Mutex<Option<Result<String, LlmError>>>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// 总是回复同一段文本
    pub fn replying(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    /// 总是失败
    pub fn failing(err: LlmError) -> Self {
        Self::new(vec![Err(err)])
    }

    /// 每次回复前等待（模拟卡住的服务）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn last_messages(&self) -> Option<Vec<Message>> {
        self.seen.lock().ok().and_then(|s| s.last().cloned())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(messages.to_vec());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = {
            let mut script = self.script.lock().map_err(|e| LlmError::Api(e.to_string()))?;
            script.pop_front()
        };
        let mut last = self.last.lock().map_err(|e| LlmError::Api(e.to_string()))?;
        match next {
            Some(item) => {
                *last = Some(item.clone());
                item
            }
            None => last.clone().unwrap_or(Err(LlmError::Unavailable)),
        }
    }
}
