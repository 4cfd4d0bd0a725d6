//! 游戏层：对局数据、动作派发、出招选择、会话状态机

pub mod client;
pub mod selection;
pub mod session;
pub mod types;

pub use client::{ActionData, ActionDispatcher, ActionRequest, GigaverseClient, ACTION_PATH};
pub use selection::{
    eligible_moves, fallback_loot, fallback_move, parse_advice, ActionSelector, Decision,
    DecisionSource, ParsedAdvice,
};
pub use session::{GameSession, SessionEnd, SessionPhase, SessionReport, MAX_CONSECUTIVE_REWARDS};
pub use types::{
    parse_action_response, ActionResult, Choice, CombatState, Combatant, LootChoice, Move,
    MoveSet, MoveStats, RoundOutcome, ROOM_RESULT_MESSAGE, START_ACTION,
};
