//! 进程级关闭
//!
//! 唯一的外部控制手段是终止进程：Ctrl+C / SIGTERM 触发关闭 token，
//! Worker Loop 只在 Idle / 休眠点观察它，进行中的会话不做中途取消。

use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
///
/// 持有交给调度器的 [`CancellationToken`]，并记下第一次触发关闭的原因。
/// 克隆后共享同一个 token 与原因。
#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Arc<OnceLock<ShutdownReason>>,
}

/// 关闭原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::UserInitiated => write!(f, "Ctrl+C"),
            ShutdownReason::Signal => write!(f, "SIGTERM"),
        }
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reason: Arc::new(OnceLock::new()),
        }
    }

    /// 交给调度器的关闭 token；各 Worker Loop 在闸门等待和休眠时观察它
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发关闭；重复调用时只保留第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason.set(reason);
        self.token.cancel();
    }

    /// 触发关闭的原因，尚未关闭时为 None
    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// 等到关闭被触发
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装 Ctrl+C 与 SIGTERM（仅 Unix）处理器，收到后调用 [`ShutdownManager::shutdown`]
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, shutting down...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, shutting down...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 运行 `app` 直到其结束或收到关闭信号；收到信号时直接返回 `Ok(())`，未完成的任务随运行时一起丢弃
pub async fn run_until_shutdown<F, T, E>(shutdown_manager: Arc<ShutdownManager>, app: F) -> Result<(), E>
where
    F: Future<Output = Result<T, E>>,
{
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        result = app => {
            result?;
            tracing::info!("All worker loops finished");
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            match shutdown_manager.reason() {
                Some(reason) => tracing::info!("Shutdown ({}), exiting", reason),
                None => tracing::info!("Shutdown requested, exiting"),
            }
        }
    }
    Ok(())
}
