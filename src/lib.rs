//! Giga Runner - 多账户 Gigaverse 地牢自动对局运行器
//!
//! 模块划分：
//! - **accounts**: 账户表读取、筛选与代理格式化
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 重试执行器、准入闸门、Worker Loop、调度器、优雅关闭
//! - **game**: 对局数据、动作派发、出招选择、会话状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **observability**: 日志初始化
//! - **oracle**: 决策顾问（提示词、超时、Key 轮换）
//! - **runner**: 把会话流程接到 Worker Loop 上

pub mod accounts;
pub mod config;
pub mod core;
pub mod game;
pub mod llm;
pub mod observability;
pub mod oracle;
pub mod runner;

pub use accounts::Account;
pub use config::AppConfig;
pub use runner::GameRunner;
