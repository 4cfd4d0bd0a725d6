//! 运行器错误类型
//!
//! 与 Worker Loop 的恢复策略配合：派发耗尽只终止当前会话；其余会话级错误触发退避后整轮重来；
//! 启动期错误（配置 / 账户为空）直接结束进程。

use thiserror::Error;

/// 运行过程中可能出现的错误（派发、响应解析、客户端构建、配置、账户文件）
#[derive(Error, Debug)]
pub enum RunnerError {
    /// 远端动作在内部重试耗尽后仍失败；当前会话无法继续（令牌失效或服务不可用）
    #[error("Action {action} failed after {attempts} attempts: {last_error}")]
    DispatchExhausted {
        action: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Malformed game response: {0}")]
    MalformedResponse(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Accounts file error: {0}")]
    Accounts(String),

    #[error("No accounts found in specified range")]
    NoAccounts,

    #[error("Admission gate closed")]
    GateClosed,

    /// 会话内部 panic，被 Worker Loop 捕获后按普通错误处理
    #[error("Session panicked: {0}")]
    Panicked(String),
}

impl RunnerError {
    /// 是否为派发耗尽（只结束会话，不计入外层重试预算）
    pub fn is_dispatch_exhausted(&self) -> bool {
        matches!(self, RunnerError::DispatchExhausted { .. })
    }
}

impl From<config::ConfigError> for RunnerError {
    fn from(e: config::ConfigError) -> Self {
        RunnerError::Config(e.to_string())
    }
}

impl From<csv::Error> for RunnerError {
    fn from(e: csv::Error) -> Self {
        RunnerError::Accounts(e.to_string())
    }
}
