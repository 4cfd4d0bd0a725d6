//! 单账户一局游戏的状态机
//!
//! ```text
//! Uninitialized --start_run--> Battling(room) --胜--> RewardPending --领取--> Battling(room+1)
//!                                    |                      |
//!                                    +--败--> Defeated      +--无更多战利品--> ExhaustedRewards
//!                                                           +--领取失败--> Stopped
//! ```
//!
//! 战斗资源状态与动作令牌只由服务端响应驱动；令牌单次有效，每次派发后替换。
//! 开局或出招派发耗尽时会话以 Aborted 结束，不再重试。

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{GameSection, PauseRange};
use crate::core::RunnerError;
use crate::game::{
    parse_action_response, ActionDispatcher, ActionRequest, ActionResult, ActionSelector, Choice,
    CombatState, RoundOutcome, START_ACTION,
};

/// 连续领取战利品的上限（防止服务端一直给出战利品时原地打转）
pub const MAX_CONSECUTIVE_REWARDS: u32 = 3;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Battling { room: u32 },
    RewardPending { room: u32 },
    Defeated,
    ExhaustedRewards,
    Stopped,
    Aborted,
}

/// 会话结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// 我方血量归零
    Defeated,
    /// 战利品领完（本局通关）
    ExhaustedRewards,
    /// 领取战利品失败
    Stopped,
    /// 开局或出招失败
    Aborted(String),
}

impl SessionEnd {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionEnd::Defeated => SessionPhase::Defeated,
            SessionEnd::ExhaustedRewards => SessionPhase::ExhaustedRewards,
            SessionEnd::Stopped => SessionPhase::Stopped,
            SessionEnd::Aborted(_) => SessionPhase::Aborted,
        }
    }
}

/// 一局的汇总
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub account_index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rooms_cleared: u32,
    pub rounds: u32,
    pub end: SessionEnd,
}

impl SessionReport {
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

enum RoomVerdict {
    Won,
    Lost,
}

/// 一局游戏
pub struct GameSession {
    session_id: Uuid,
    account_index: usize,
    dispatcher: Arc<dyn ActionDispatcher>,
    selector: Arc<ActionSelector>,
    dungeon_id: u32,
    round_pause: PauseRange,
    phase: SessionPhase,
    phase_tx: Option<mpsc::UnboundedSender<SessionPhase>>,
    state: CombatState,
    enemy_last_move: Option<String>,
    action_token: String,
    loot_options: Vec<Value>,
    rounds: u32,
    rooms_cleared: u32,
}

impl GameSession {
    pub fn new(
        account_index: usize,
        dispatcher: Arc<dyn ActionDispatcher>,
        selector: Arc<ActionSelector>,
        game: &GameSection,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            account_index,
            dispatcher,
            selector,
            dungeon_id: game.dungeon_id,
            round_pause: game.pause_between_rounds,
            phase: SessionPhase::Uninitialized,
            phase_tx: None,
            state: CombatState::default(),
            enemy_last_move: None,
            action_token: String::new(),
            loot_options: Vec::new(),
            rounds: 0,
            rooms_cleared: 0,
        }
    }

    /// 订阅阶段变迁；终止阶段也会发出
    pub fn with_phase_events(mut self, tx: mpsc::UnboundedSender<SessionPhase>) -> Self {
        self.phase_tx = Some(tx);
        self
    }

    fn enter(&mut self, next: SessionPhase) {
        tracing::debug!(account = self.account_index, from = ?self.phase, to = ?next, "session phase");
        self.phase = next;
        if let Some(tx) = &self.phase_tx {
            let _ = tx.send(next);
        }
    }

    /// 跑完一局
    ///
    /// 派发耗尽与服务端拒绝都体现在 [`SessionEnd`] 里；只有意料之外的错误（响应结构不对等）返回 Err。
    pub async fn run(mut self) -> Result<SessionReport, RunnerError> {
        let started_at = Utc::now();
        info!(
            "[{}] Session {} started",
            self.account_index, self.session_id
        );

        let end = self.drive().await?;
        self.enter(end.phase());

        let report = SessionReport {
            session_id: self.session_id,
            account_index: self.account_index,
            started_at,
            finished_at: Utc::now(),
            rooms_cleared: self.rooms_cleared,
            rounds: self.rounds,
            end,
        };
        info!(
            "[{}] Session {} finished: {:?} (rooms cleared {}, rounds {})",
            self.account_index, report.session_id, report.end, report.rooms_cleared, report.rounds
        );
        Ok(report)
    }

    async fn drive(&mut self) -> Result<SessionEnd, RunnerError> {
        let index = self.account_index;

        match self.send(START_ACTION, self.dungeon_id).await {
            Ok(ActionResult::Accepted(outcome)) => self.apply(outcome),
            Ok(ActionResult::Rejected { message }) => {
                warn!("[{}] Start rejected: {}", index, message);
                return Ok(SessionEnd::Aborted(format!("start rejected: {message}")));
            }
            Err(e) if e.is_dispatch_exhausted() => {
                warn!("[{}] Could not start the run: {}", index, e);
                return Ok(SessionEnd::Aborted(e.to_string()));
            }
            Err(e) => return Err(e),
        }
        info!("[{}] Battle started: {}", index, self.state.describe());

        let mut room = 1;
        loop {
            self.enter(SessionPhase::Battling { room });
            match self.fight(room).await? {
                Ok(RoomVerdict::Won) => {
                    self.rooms_cleared += 1;
                    info!("[{}] Room {} cleared", index, room);
                }
                Ok(RoomVerdict::Lost) => {
                    info!("[{}] Defeated in room {}", index, room);
                    return Ok(SessionEnd::Defeated);
                }
                Err(end) => return Ok(end),
            }

            self.enter(SessionPhase::RewardPending { room });
            if let Some(end) = self.collect_rewards().await? {
                return Ok(end);
            }
            room += 1;
        }
    }

    /// 打一个房间；外层 Err 为意外错误，内层 Err 为会话终止原因
    async fn fight(&mut self, room: u32) -> Result<Result<RoomVerdict, SessionEnd>, RunnerError> {
        let index = self.account_index;
        loop {
            if self.state.player.health <= 0 {
                return Ok(Ok(RoomVerdict::Lost));
            }
            if self.state.enemy.is_defeated() {
                return Ok(Ok(RoomVerdict::Won));
            }

            let decision = self
                .selector
                .choose_move(index, &self.state, self.enemy_last_move.as_deref())
                .await;
            let outcome = match self.send(decision.choice.name(), 0).await {
                Ok(ActionResult::Accepted(outcome)) => outcome,
                Ok(ActionResult::Rejected { message }) => {
                    warn!("[{}] Move {} rejected: {}", index, decision.choice, message);
                    return Ok(Err(SessionEnd::Aborted(format!(
                        "move {} rejected: {message}",
                        decision.choice
                    ))));
                }
                Err(e) if e.is_dispatch_exhausted() => {
                    warn!("[{}] Battle aborted: {}", index, e);
                    return Ok(Err(SessionEnd::Aborted(e.to_string())));
                }
                Err(e) => return Err(e),
            };

            self.rounds += 1;
            let room_finished = outcome.room_finished;
            self.apply(outcome);
            info!(
                "[{}] Room {} round {}: played {} ({:?}), enemy played {}, hp {}+{} vs {}+{}",
                index,
                room,
                self.rounds,
                decision.choice,
                decision.source,
                self.enemy_last_move.as_deref().unwrap_or("-"),
                self.state.player.health,
                self.state.player.shield,
                self.state.enemy.health,
                self.state.enemy.shield,
            );

            if room_finished {
                let verdict = if self.state.player.health > 0 {
                    RoomVerdict::Won
                } else {
                    RoomVerdict::Lost
                };
                return Ok(Ok(verdict));
            }

            let pause = self.round_pause.sample();
            if pause > Duration::ZERO {
                tokio::time::sleep(pause).await;
            }
        }
    }

    /// 领取战利品；返回 Some 表示会话结束，None 表示进入下一个房间
    async fn collect_rewards(&mut self) -> Result<Option<SessionEnd>, RunnerError> {
        let index = self.account_index;
        for claimed in 1..=MAX_CONSECUTIVE_REWARDS {
            let decision = self
                .selector
                .choose_loot(index, &self.state, &self.loot_options)
                .await;
            info!(
                "[{}] Claiming {} ({:?}) from {} option(s)",
                index,
                decision.choice,
                decision.source,
                self.loot_options.len()
            );

            match self.send(decision.choice.name(), 0).await {
                Ok(ActionResult::Accepted(outcome)) => self.apply(outcome),
                Ok(ActionResult::Rejected { message }) => {
                    warn!("[{}] Loot claim rejected: {}", index, message);
                    return Ok(Some(SessionEnd::Stopped));
                }
                Err(e) if e.is_dispatch_exhausted() => {
                    warn!("[{}] Loot claim failed, stopping: {}", index, e);
                    return Ok(Some(SessionEnd::Stopped));
                }
                Err(e) => return Err(e),
            }

            if !self.state.enemy.is_defeated() {
                return Ok(None);
            }
            if self.loot_options.is_empty() {
                info!("[{}] No more rewards available", index);
                return Ok(Some(SessionEnd::ExhaustedRewards));
            }
            if claimed == MAX_CONSECUTIVE_REWARDS {
                warn!(
                    "[{}] Still offered rewards after {} claims, ending run",
                    index, claimed
                );
            }
        }
        Ok(Some(SessionEnd::ExhaustedRewards))
    }

    async fn send(&mut self, action: &str, dungeon_id: u32) -> Result<ActionResult, RunnerError> {
        let request = ActionRequest::new(action, self.action_token.clone(), dungeon_id);
        let body = self.dispatcher.dispatch(&request).await?;
        parse_action_response(&body)
    }

    fn apply(&mut self, outcome: RoundOutcome) {
        self.state = outcome.state;
        self.enemy_last_move = outcome.enemy_last_move;
        self.action_token = outcome.action_token;
        self.loot_options = outcome.loot_options;
    }
}
