//! 账户会话流程：把游戏会话接到 Worker Loop 上
//!
//! 一次会话：随机初始暂停 → 初始化（构建客户端，软失败重试）→ 对局（意外错误硬失败重试）→ 动作间暂停。
//! 初始化耗尽只记录日志并正常返回；对局硬失败耗尽时返回 Err，Worker Loop 随之进入 Backoff。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::accounts::Account;
use crate::config::{AppConfig, GameSection};
use crate::core::{RetryExecutor, RetryOutcome, RunnerError, SessionRunner, StepOutcome};
use crate::game::{ActionDispatcher, ActionSelector, GameSession, GigaverseClient, SessionReport};
use crate::oracle::{create_oracle_from_config, DecisionOracle};

/// 为账户建立动作派发器
pub trait DispatcherFactory: Send + Sync {
    fn connect(&self, account: &Account) -> Result<Arc<dyn ActionDispatcher>, RunnerError>;
}

/// 每个账户一个 [`GigaverseClient`]
pub struct HttpDispatcherFactory {
    game: GameSection,
}

impl HttpDispatcherFactory {
    pub fn new(game: GameSection) -> Self {
        Self { game }
    }
}

impl DispatcherFactory for HttpDispatcherFactory {
    fn connect(&self, account: &Account) -> Result<Arc<dyn ActionDispatcher>, RunnerError> {
        Ok(Arc::new(GigaverseClient::new(account, &self.game)?))
    }
}

/// 游戏会话执行器
pub struct GameRunner {
    config: Arc<AppConfig>,
    factory: Arc<dyn DispatcherFactory>,
    selector: Arc<ActionSelector>,
    retry: RetryExecutor,
}

impl GameRunner {
    pub fn new(
        config: Arc<AppConfig>,
        factory: Arc<dyn DispatcherFactory>,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        let retry = RetryExecutor::from_settings(&config.settings);
        Self {
            config,
            factory,
            selector: Arc::new(ActionSelector::new(oracle)),
            retry,
        }
    }

    /// 按配置装配：HTTP 派发器 + 顾问（无 Key 时停用）
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, RunnerError> {
        let oracle = create_oracle_from_config(&config.oracle)
            .map_err(|e| RunnerError::Config(format!("oracle: {e}")))?;
        let factory = Arc::new(HttpDispatcherFactory::new(config.game.clone()));
        Ok(Self::new(config, factory, oracle))
    }

    async fn play(
        &self,
        account: &Account,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> StepOutcome<SessionReport, RunnerError> {
        let session = GameSession::new(
            account.index,
            dispatcher,
            Arc::clone(&self.selector),
            &self.config.game,
        );
        match session.run().await {
            Ok(report) => StepOutcome::Ok(report),
            Err(e) => {
                error!("[{}] Session error: {}", account.index, e);
                StepOutcome::HardFail(e)
            }
        }
    }
}

#[async_trait]
impl SessionRunner for GameRunner {
    async fn run_session(&self, account: &Account) -> Result<(), RunnerError> {
        let index = account.index;
        let settings = &self.config.settings;

        let pause = settings.random_initialization_pause.sample();
        info!("[{}] Sleeping for {} seconds before start...", index, pause.as_secs());
        tokio::time::sleep(pause).await;

        let factory = Arc::clone(&self.factory);
        let initialized = self
            .retry
            .run("initialize", move |_| {
                let result = factory.connect(account);
                async move {
                    match result {
                        Ok(dispatcher) => StepOutcome::Ok(dispatcher),
                        Err(e) => {
                            error!("[{}] Initialization error: {}", index, e);
                            StepOutcome::<_, RunnerError>::SoftFail
                        }
                    }
                }
            })
            .await?;
        let Some(dispatcher) = initialized.into_value() else {
            error!("[{}] Initialization failed", index);
            return Ok(());
        };

        let flow = self
            .retry
            .run("flow", move |_| self.play(account, Arc::clone(&dispatcher)))
            .await?;
        match flow {
            RetryOutcome::Succeeded { value: report, attempts } => {
                info!(
                    "[{}] Flow finished after {} attempt(s): {:?} in {}s",
                    index,
                    attempts,
                    report.end,
                    report.duration().num_seconds()
                );
                let pause = settings.random_pause_between_actions.sample();
                info!(
                    "[{}] Sleeping for {} seconds after flow",
                    index,
                    pause.as_secs()
                );
                tokio::time::sleep(pause).await;
            }
            RetryOutcome::Exhausted { attempts } => {
                warn!("[{}] Flow did not succeed after {} attempts", index, attempts);
            }
        }
        Ok(())
    }
}
