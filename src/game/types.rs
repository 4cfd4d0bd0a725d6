//! 对局数据：招式、战斗资源状态、战利品槽位，以及远端响应到状态的投影
//!
//! 战斗资源状态完全由最近一次服务端响应覆盖，不做本地增量计算。

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::core::RunnerError;

/// 开局动作名
pub const START_ACTION: &str = "start_run";

/// 服务端表示「本房间结算完成」的消息
pub const ROOM_RESULT_MESSAGE: &str = "Dungeon run room result reported";

/// 可供顾问挑选的选项（招式或战利品槽位），以动作名互相区分
pub trait Choice: Copy + Eq + fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
}

/// 招式（固定枚举顺序：rock, paper, scissor）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Move {
    Rock,
    Paper,
    Scissor,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissor];
}

impl Choice for Move {
    fn name(&self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissor => "scissor",
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 战利品槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LootChoice {
    One,
    Two,
    Three,
}

impl LootChoice {
    pub const ALL: [LootChoice; 3] = [LootChoice::One, LootChoice::Two, LootChoice::Three];

    /// 实际给出的前 `count` 个槽位（最多 3 个）
    pub fn available(count: usize) -> Vec<LootChoice> {
        Self::ALL.iter().copied().take(count).collect()
    }
}

impl Choice for LootChoice {
    fn name(&self) -> &'static str {
        match self {
            LootChoice::One => "loot_one",
            LootChoice::Two => "loot_two",
            LootChoice::Three => "loot_three",
        }
    }
}

impl fmt::Display for LootChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个招式的属性与剩余次数
///
/// 次数 >1 可用；恰为 1 时本回合强制不可用（再用会跌到不可恢复状态）；≤0 暂不可用。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MoveStats {
    #[serde(rename = "currentATK", default)]
    pub attack: i64,
    #[serde(rename = "currentDEF", default)]
    pub defense: i64,
    #[serde(rename = "currentCharges", default)]
    pub charges: i64,
}

impl MoveStats {
    pub fn is_usable(&self) -> bool {
        self.charges > 1
    }

    pub fn is_available(&self) -> bool {
        self.charges > 0
    }
}

/// 三个招式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveSet {
    pub rock: MoveStats,
    pub paper: MoveStats,
    pub scissor: MoveStats,
}

impl MoveSet {
    pub fn get(&self, m: Move) -> &MoveStats {
        match m {
            Move::Rock => &self.rock,
            Move::Paper => &self.paper,
            Move::Scissor => &self.scissor,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Move, &MoveStats)> + '_ {
        Move::ALL.iter().map(move |m| (*m, self.get(*m)))
    }
}

impl fmt::Display for MoveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(m, s)| {
                format!(
                    "{m}: ATK={}, DEF={}, Charges={}",
                    s.attack, s.defense, s.charges
                )
            })
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// 一方（我方或敌方）的资源
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Combatant {
    pub health: i64,
    pub shield: i64,
    pub max_health: i64,
    pub moves: MoveSet,
}

impl Combatant {
    /// 血量 + 护盾
    pub fn total_life(&self) -> i64 {
        self.health + self.shield
    }

    /// 血量与护盾都归零
    pub fn is_defeated(&self) -> bool {
        self.health <= 0 && self.shield <= 0
    }
}

/// 战斗资源状态（我方 + 敌方）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombatState {
    pub player: Combatant,
    pub enemy: Combatant,
}

impl CombatState {
    /// 给顾问与日志用的状态摘要
    pub fn describe(&self) -> String {
        format!(
            "玩家: 血量={}/{}, 护盾={}, 招式={}\n敌人: 血量={}, 护盾={}, 招式={}",
            self.player.health,
            self.player.max_health,
            self.player.shield,
            self.player.moves,
            self.enemy.health,
            self.enemy.shield,
            self.enemy.moves,
        )
    }
}

/// 一次派发被服务端接受后的结果
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    pub state: CombatState,
    pub enemy_last_move: Option<String>,
    /// 下一次派发所需的令牌（单次有效）
    pub action_token: String,
    pub loot_options: Vec<Value>,
    /// 响应带有房间结算标记
    pub room_finished: bool,
    pub message: Option<String>,
}

/// 派发结果：被接受（附新状态）或被服务端拒绝
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Accepted(RoundOutcome),
    Rejected { message: String },
}

#[derive(Debug, Deserialize)]
struct ActionResponseBody {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "actionToken", default)]
    action_token: Value,
    #[serde(default)]
    data: Option<ResponseData>,
}

#[derive(Debug, Deserialize)]
struct ResponseData {
    #[serde(default)]
    run: Option<RunData>,
}

#[derive(Debug, Deserialize)]
struct RunData {
    #[serde(default)]
    players: Vec<PlayerData>,
    #[serde(rename = "lootOptions", default)]
    loot_options: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Gauge {
    #[serde(default)]
    current: i64,
    #[serde(rename = "currentMax", default)]
    current_max: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PlayerData {
    health: Gauge,
    shield: Gauge,
    #[serde(default)]
    rock: MoveStats,
    #[serde(default)]
    paper: MoveStats,
    #[serde(default)]
    scissor: MoveStats,
    #[serde(rename = "lastMove", default)]
    last_move: Option<String>,
}

impl From<&PlayerData> for Combatant {
    fn from(p: &PlayerData) -> Self {
        Combatant {
            health: p.health.current,
            shield: p.shield.current,
            max_health: p.health.current_max.unwrap_or(p.health.current),
            moves: MoveSet {
                rock: p.rock,
                paper: p.paper,
                scissor: p.scissor,
            },
        }
    }
}

fn token_to_string(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 把服务端响应投影为 [`ActionResult`]
///
/// `success: false` 视为拒绝；否则必须带 `data.run.players`（我方在前、敌方在后）。
pub fn parse_action_response(body: &Value) -> Result<ActionResult, RunnerError> {
    let parsed: ActionResponseBody = serde_json::from_value(body.clone())
        .map_err(|e| RunnerError::MalformedResponse(e.to_string()))?;

    if parsed.success == Some(false) {
        return Ok(ActionResult::Rejected {
            message: parsed.message.unwrap_or_else(|| "no message".to_string()),
        });
    }

    let run = parsed
        .data
        .and_then(|d| d.run)
        .ok_or_else(|| RunnerError::MalformedResponse("missing data.run".into()))?;
    let (player, enemy) = match run.players.as_slice() {
        [player, enemy, ..] => (player, enemy),
        _ => {
            return Err(RunnerError::MalformedResponse(format!(
                "expected 2 players, got {}",
                run.players.len()
            )))
        }
    };

    let room_finished = parsed.message.as_deref() == Some(ROOM_RESULT_MESSAGE);
    Ok(ActionResult::Accepted(RoundOutcome {
        state: CombatState {
            player: player.into(),
            enemy: enemy.into(),
        },
        enemy_last_move: enemy.last_move.clone(),
        action_token: token_to_string(&parsed.action_token),
        loot_options: run.loot_options,
        room_finished,
        message: parsed.message,
    }))
}
