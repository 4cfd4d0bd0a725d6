//! Worker Loop：单个账户的无限循环
//!
//! 状态：Idle → Admitted → Running → Sleeping → Idle；Running 出错（含 panic）时改走 Backoff。
//! 每轮只有一个挂起点用于休眠；准入许可在休眠前无条件释放。
//! 业务逻辑通过 [`SessionRunner`] 注入，调度契约因此可以脱离游戏逻辑单独测试。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::accounts::Account;
use crate::config::{PauseRange, SettingsSection};
use crate::core::{AdmissionGate, RunnerError};

/// 执行一次完整会话（初始化 → 对局 → 结束）；返回 Err 会让 Worker Loop 进入 Backoff
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run_session(&self, account: &Account) -> Result<(), RunnerError>;
}

/// Worker Loop 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Idle,
    Admitted,
    Running,
    Sleeping,
    Backoff,
}

/// 状态变迁事件：(账户序号, 新状态)
pub type PhaseEvent = (usize, WorkerPhase);

/// 单账户循环
pub struct WorkerLoop<R: ?Sized> {
    account: Arc<Account>,
    runner: Arc<R>,
    gate: AdmissionGate,
    pause_after_session: PauseRange,
    error_backoff: Duration,
    shutdown: CancellationToken,
    phase: WorkerPhase,
    phase_tx: Option<mpsc::UnboundedSender<PhaseEvent>>,
}

impl<R: SessionRunner + ?Sized> WorkerLoop<R> {
    pub fn new(
        account: Arc<Account>,
        runner: Arc<R>,
        gate: AdmissionGate,
        settings: &SettingsSection,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            account,
            runner,
            gate,
            pause_after_session: settings.pause_after_session,
            error_backoff: Duration::from_secs(settings.error_backoff_secs),
            shutdown,
            phase: WorkerPhase::Idle,
            phase_tx: None,
        }
    }

    /// 订阅状态变迁（测试与监控用）
    pub fn with_phase_events(mut self, tx: mpsc::UnboundedSender<PhaseEvent>) -> Self {
        self.phase_tx = Some(tx);
        self
    }

    fn transition(&mut self, next: WorkerPhase) {
        tracing::debug!(account = self.account.index, from = ?self.phase, to = ?next, "worker phase");
        self.phase = next;
        if let Some(tx) = &self.phase_tx {
            let _ = tx.send((self.account.index, next));
        }
    }

    /// 运行直到关闭信号；正常情况下永不返回
    pub async fn run(mut self) {
        let index = self.account.index;
        loop {
            self.transition(WorkerPhase::Idle);

            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                acquired = self.gate.acquire() => match acquired {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("[{index}] {e}, stopping worker");
                        break;
                    }
                },
            };
            self.transition(WorkerPhase::Admitted);

            self.transition(WorkerPhase::Running);
            let result = AssertUnwindSafe(self.runner.run_session(&self.account))
                .catch_unwind()
                .await;
            drop(permit);

            let pause = match result {
                Ok(Ok(())) => {
                    self.transition(WorkerPhase::Sleeping);
                    let pause = self.pause_after_session.sample();
                    tracing::info!(
                        "[{index}] Completed execution, sleeping for {} seconds",
                        pause.as_secs()
                    );
                    pause
                }
                Ok(Err(e)) => {
                    self.transition(WorkerPhase::Backoff);
                    tracing::error!(
                        "[{index}] Loop error: {e}, retrying in {} seconds",
                        self.error_backoff.as_secs()
                    );
                    self.error_backoff
                }
                Err(panic) => {
                    self.transition(WorkerPhase::Backoff);
                    let e = RunnerError::Panicked(panic_message(panic.as_ref()));
                    tracing::error!(
                        "[{index}] Loop error: {e}, retrying in {} seconds",
                        self.error_backoff.as_secs()
                    );
                    self.error_backoff
                }
            };

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        tracing::info!("[{index}] Worker loop stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
