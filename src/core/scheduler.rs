//! 有界调度器：每个账户一个 Worker Loop，全体共享一个准入闸门
//!
//! 循环之间互不通信，只共享闸门与只读的配置 / 账户；任何一个循环的错误都不会传到调度器或兄弟循环。

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::accounts::Account;
use crate::config::SettingsSection;
use crate::core::worker::{PhaseEvent, SessionRunner, WorkerLoop};
use crate::core::{AdmissionGate, RunnerError};

/// 有界调度器
pub struct Scheduler<R: ?Sized> {
    runner: Arc<R>,
    gate: AdmissionGate,
    settings: SettingsSection,
    shutdown: CancellationToken,
    phase_tx: Option<mpsc::UnboundedSender<PhaseEvent>>,
}

impl<R: SessionRunner + ?Sized + 'static> Scheduler<R> {
    pub fn new(settings: &SettingsSection, runner: Arc<R>, shutdown: CancellationToken) -> Self {
        Self {
            runner,
            gate: AdmissionGate::new(settings.threads),
            settings: settings.clone(),
            shutdown,
            phase_tx: None,
        }
    }

    pub fn with_phase_events(mut self, tx: mpsc::UnboundedSender<PhaseEvent>) -> Self {
        self.phase_tx = Some(tx);
        self
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// 为每个账户启动一个循环并等待全部结束（正常运行下不会结束）
    ///
    /// 账户列表为空属于启动失败：记录错误并立即返回，不启动任何循环。
    pub async fn run(&self, accounts: Vec<Account>) -> Result<(), RunnerError> {
        if accounts.is_empty() {
            tracing::error!("No accounts to process, scheduler not started");
            return Err(RunnerError::NoAccounts);
        }

        tracing::info!(
            "Launching {} worker loops with concurrency limit {}",
            accounts.len(),
            self.gate.capacity()
        );

        let handles: Vec<_> = accounts
            .into_iter()
            .map(|account| {
                let mut worker = WorkerLoop::new(
                    Arc::new(account),
                    Arc::clone(&self.runner),
                    self.gate.clone(),
                    &self.settings,
                    self.shutdown.clone(),
                );
                if let Some(tx) = &self.phase_tx {
                    worker = worker.with_phase_events(tx.clone());
                }
                tokio::spawn(worker.run())
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                tracing::error!("Worker task terminated abnormally: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PauseRange;
    use async_trait::async_trait;

    struct NoopRunner;

    #[async_trait]
    impl SessionRunner for NoopRunner {
        async fn run_session(&self, _account: &Account) -> Result<(), RunnerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_empty_accounts_is_startup_failure() {
        let scheduler = Scheduler::new(
            &SettingsSection::default(),
            Arc::new(NoopRunner),
            CancellationToken::new(),
        );
        let result = scheduler.run(Vec::new()).await;
        assert!(matches!(result, Err(RunnerError::NoAccounts)));
        assert_eq!(scheduler.gate().in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_loop_per_account_until_shutdown() {
        let settings = SettingsSection {
            threads: 2,
            pause_after_session: PauseRange(1, 1),
            ..SettingsSection::default()
        };
        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(
            Scheduler::new(&settings, Arc::new(NoopRunner), shutdown.clone()).with_phase_events(tx),
        );

        let accounts = (1..=3).map(|i| Account::new(i, format!("t{i}"), None)).collect();
        let run = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.run(accounts).await })
        };

        let mut seen = std::collections::HashSet::new();
        while seen.len() < 3 {
            let (index, phase) = rx.recv().await.unwrap();
            if phase == crate::core::WorkerPhase::Running {
                seen.insert(index);
            }
        }

        shutdown.cancel();
        assert!(run.await.unwrap().is_ok());
    }
}
