//! 游戏动作派发
//!
//! 每个账户一个 HTTP 客户端（Bearer 鉴权，可选代理）。单次派发内部带有限次重试：
//! 非 2xx、传输错误、响应不是 JSON 都算一次失败，耗尽后返回 [`RunnerError::DispatchExhausted`]。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::accounts::Account;
use crate::config::GameSection;
use crate::core::RunnerError;

/// 动作接口路径
pub const ACTION_PATH: &str = "/api/game/dungeon/action";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 动作附带数据（目前总是空）
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionData {
    pub consumables: Vec<Value>,
    pub item_id: u64,
    pub index: u32,
}

/// 一次动作请求
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: String,
    pub action_token: String,
    pub dungeon_id: u32,
    pub data: ActionData,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, action_token: impl Into<String>, dungeon_id: u32) -> Self {
        Self {
            action: action.into(),
            action_token: action_token.into(),
            dungeon_id,
            data: ActionData::default(),
        }
    }
}

/// 远端动作派发接口；返回服务端原始 JSON
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, request: &ActionRequest) -> Result<Value, RunnerError>;
}

/// Gigaverse HTTP 客户端
pub struct GigaverseClient {
    http: reqwest::Client,
    endpoint: String,
    account_index: usize,
    masked_proxy: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl GigaverseClient {
    pub fn new(account: &Account, game: &GameSection) -> Result<Self, RunnerError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(game.request_timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(default_headers(&account.token, &game.base_url)?);
        if let Some(proxy) = account.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| RunnerError::HttpClient(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| RunnerError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}{}", game.base_url.trim_end_matches('/'), ACTION_PATH),
            account_index: account.index,
            masked_proxy: account.masked_proxy(),
            max_attempts: game.max_dispatch_attempts.max(1),
            retry_delay: Duration::from_secs(game.dispatch_retry_delay_secs),
        })
    }

    async fn attempt(&self, request: &ActionRequest) -> Result<Value, String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, truncate(&body, 200)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("invalid JSON body: {e}"))
    }
}

#[async_trait]
impl ActionDispatcher for GigaverseClient {
    async fn dispatch(&self, request: &ActionRequest) -> Result<Value, RunnerError> {
        let index = self.account_index;
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            info!(
                "[{}] Sending action {} via {} (attempt {}/{})",
                index, request.action, self.masked_proxy, attempt, self.max_attempts
            );
            match self.attempt(request).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    warn!(
                        "[{}] Action {} failed: {} (attempt {}/{})",
                        index, request.action, e, attempt, self.max_attempts
                    );
                    last_error = e;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        error!(
            "[{}] Action {} failed after {} attempts",
            index, request.action, self.max_attempts
        );
        Err(RunnerError::DispatchExhausted {
            action: request.action.clone(),
            attempts: self.max_attempts,
            last_error,
        })
    }
}

fn default_headers(token: &str, base_url: &str) -> Result<HeaderMap, RunnerError> {
    let invalid = |what: &str| RunnerError::HttpClient(format!("invalid {what} header value"));
    let origin = base_url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| invalid("authorization"))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(ORIGIN, HeaderValue::from_str(origin).map_err(|_| invalid("origin"))?);
    headers.insert(
        REFERER,
        HeaderValue::from_str(&format!("{origin}/play")).map_err(|_| invalid("referer"))?,
    );
    Ok(headers)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_chars).collect::<String>())
    }
}
