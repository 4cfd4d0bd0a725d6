//! 顾问提示词
//!
//! 系统提示固定；用户消息由「当前状态」与「本次要做的选择」两段拼成。

use crate::game::{Choice, CombatState};

/// 系统提示
pub const SYSTEM_PROMPT: &str = "你是一名地牢回合制对战的战术顾问。\
每回合双方各出一招：rock 克 scissor，scissor 克 paper，paper 克 rock。\
每个招式有攻击、防御与剩余次数，次数用尽的招式需要等待恢复。\
请结合双方血量、护盾与招式属性给出一个选择，并在回答中写明「建议出 <选项>」。";

/// 拼接用户消息
pub fn user_message(context: &str, instructions: &str) -> String {
    format!("当前状态:\n{context}\n\n需要决定:\n{instructions}")
}

/// 出招提问：列出本回合可选的招式
pub fn move_instructions<C: Choice>(eligible: &[C]) -> String {
    format!(
        "本回合可选招式: {}。请只从中挑选一个，回答格式为「建议出 <招式>」。",
        join_names(eligible)
    )
}

/// 选战利品提问
pub fn loot_instructions<C: Choice>(eligible: &[C], loot_summary: &str) -> String {
    format!(
        "本房间已胜利，可领取的战利品:\n{loot_summary}\n可选槽位: {}。请挑选一个，回答格式为「建议出 <槽位>」。",
        join_names(eligible)
    )
}

/// 出招时提供给顾问的状态
pub fn battle_context(state: &CombatState, enemy_last_move: Option<&str>) -> String {
    match enemy_last_move {
        Some(last) => format!("{}\n敌人上一招: {last}", state.describe()),
        None => state.describe(),
    }
}

fn join_names<C: Choice>(options: &[C]) -> String {
    options
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{LootChoice, Move};

    #[test]
    fn test_move_instructions_list_only_eligible() {
        let text = move_instructions(&[Move::Paper, Move::Scissor]);
        assert!(text.contains("paper, scissor"));
        assert!(!text.contains("rock"));
    }

    #[test]
    fn test_loot_instructions_include_summary() {
        let text = loot_instructions(&[LootChoice::One], "loot_one: 稀有度 2");
        assert!(text.contains("loot_one: 稀有度 2"));
        assert!(text.contains("可选槽位: loot_one"));
    }

    #[test]
    fn test_battle_context_with_last_move() {
        let text = battle_context(&CombatState::default(), Some("rock"));
        assert!(text.ends_with("敌人上一招: rock"));
        assert!(user_message("A", "B").starts_with("当前状态:\nA"));
    }
}
