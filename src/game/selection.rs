//! 出招与战利品选择
//!
//! 先算出可选集合，再问顾问；顾问回答无法落到可选集合上，或顾问不可用时，走确定性回退。

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::game::{Choice, CombatState, LootChoice, Move, MoveSet};
use crate::oracle::{prompts, DecisionOracle};

/// 血量 + 护盾不超过该值时视为危险
pub const LOW_LIFE_THRESHOLD: i64 = 5;

/// 决策来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// 采纳顾问建议
    Oracle,
    /// 顾问不可用或建议不合法，走回退策略
    Fallback,
    /// 可选集合为空，直接用默认值
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<C> {
    pub choice: C,
    pub source: DecisionSource,
}

/// 顾问回答的解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedAdvice<C> {
    Accepted(C),
    /// 显式建议了一个不在可选集合里的选项
    Rejected(String),
    NotFound,
}

/// 本回合可选招式
///
/// 优先取次数 >1 的招式；都没有时放宽到次数 >0；仍为空则返回空列表（调用方使用 rock）。
pub fn eligible_moves(moves: &MoveSet) -> Vec<Move> {
    let usable: Vec<Move> = moves
        .iter()
        .filter(|(_, s)| s.is_usable())
        .map(|(m, _)| m)
        .collect();
    if !usable.is_empty() {
        return usable;
    }
    moves
        .iter()
        .filter(|(_, s)| s.is_available())
        .map(|(m, _)| m)
        .collect()
}

/// 确定性回退出招
///
/// 我方危险时取防御最高的招式，敌方危险时取攻击最高的招式，否则取第一个可选招式；
/// 同值按枚举顺序取先出现者。`eligible` 为空时返回 rock。
pub fn fallback_move(state: &CombatState, eligible: &[Move]) -> Move {
    let Some(first) = eligible.first().copied() else {
        return Move::Rock;
    };
    let moves = &state.player.moves;

    let best_by = |key: fn(&crate::game::MoveStats) -> i64| {
        eligible
            .iter()
            .copied()
            .fold(first, |best, m| {
                if key(moves.get(m)) > key(moves.get(best)) {
                    m
                } else {
                    best
                }
            })
    };

    if state.player.total_life() <= LOW_LIFE_THRESHOLD {
        best_by(|s| s.defense)
    } else if state.enemy.total_life() <= LOW_LIFE_THRESHOLD {
        best_by(|s| s.attack)
    } else {
        first
    }
}

/// 战利品回退：有第三个槽位取第三个，否则取最后一个；为空时取 loot_three
pub fn fallback_loot(eligible: &[LootChoice]) -> LootChoice {
    if eligible.contains(&LootChoice::Three) {
        return LootChoice::Three;
    }
    eligible.last().copied().unwrap_or(LootChoice::Three)
}

const ADVICE_ANCHOR: &str = "建议出";

/// 锚点之后跳过空白、标点与 Markdown 标记（含全角冒号），取第一个英文词；遇到汉字即停
fn explicit_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"建议出[^A-Za-z0-9_\p{Han}]*([A-Za-z_]+)").ok())
        .as_ref()
}

/// 整段回答恰为一个选项名（忽略首尾标点）
fn whole_answer_name(answer: &str) -> Option<String> {
    let whole = answer
        .trim()
        .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .to_lowercase();
    let looks_like_name =
        !whole.is_empty() && whole.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    looks_like_name.then_some(whole)
}

/// 把顾问的自由文本落到选项上
///
/// 1. 出现「建议出」时只看它后面的第一个词：必须在 `eligible` 中，否则拒绝；后面没有词则视为未找到。
///    这两种情况都不做子串匹配
/// 2. 整段回答恰为某个选项名：同样严格校验
/// 3. 其余按 `eligible` 的顺序做不区分大小写的子串匹配
pub fn parse_advice<C: Choice>(answer: &str, eligible: &[C]) -> ParsedAdvice<C> {
    let named = if answer.contains(ADVICE_ANCHOR) {
        match explicit_pattern()
            .and_then(|re| re.captures(answer))
            .and_then(|c| c.get(1))
        {
            Some(m) => m.as_str().to_lowercase(),
            None => return ParsedAdvice::NotFound,
        }
    } else if let Some(name) = whole_answer_name(answer) {
        name
    } else {
        let lower = answer.to_lowercase();
        return eligible
            .iter()
            .find(|c| lower.contains(c.name()))
            .map(|c| ParsedAdvice::Accepted(*c))
            .unwrap_or(ParsedAdvice::NotFound);
    };

    match eligible.iter().find(|c| c.name() == named) {
        Some(c) => ParsedAdvice::Accepted(*c),
        None => ParsedAdvice::Rejected(named),
    }
}

/// 战利品摘要（给顾问看）
pub fn describe_loot(options: &[Value]) -> String {
    LootChoice::ALL
        .iter()
        .zip(options)
        .map(|(slot, v)| format!("{}: {}", slot.name(), v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 出招 / 战利品选择器
pub struct ActionSelector {
    oracle: Arc<dyn DecisionOracle>,
}

impl ActionSelector {
    pub fn new(oracle: Arc<dyn DecisionOracle>) -> Self {
        Self { oracle }
    }

    async fn ask<C: Choice>(
        &self,
        index: usize,
        instructions: &str,
        context: &str,
        eligible: &[C],
    ) -> Option<C> {
        let answer = match self.oracle.advise(instructions, context).await {
            Ok(answer) => answer,
            Err(e) => {
                info!("[{}] Oracle unavailable ({}), using fallback", index, e);
                return None;
            }
        };
        match parse_advice(&answer, eligible) {
            ParsedAdvice::Accepted(choice) => Some(choice),
            ParsedAdvice::Rejected(name) => {
                warn!(
                    "[{}] Oracle suggested {} which is not available, using fallback",
                    index, name
                );
                None
            }
            ParsedAdvice::NotFound => {
                warn!("[{}] Could not parse oracle answer, using fallback", index);
                None
            }
        }
    }

    /// 选本回合招式
    pub async fn choose_move(
        &self,
        index: usize,
        state: &CombatState,
        enemy_last_move: Option<&str>,
    ) -> Decision<Move> {
        let eligible = eligible_moves(&state.player.moves);
        if eligible.is_empty() {
            warn!("[{}] No move has charges left, using rock", index);
            return Decision {
                choice: Move::Rock,
                source: DecisionSource::Default,
            };
        }

        let instructions = prompts::move_instructions(&eligible);
        let context = prompts::battle_context(state, enemy_last_move);
        match self.ask(index, &instructions, &context, &eligible).await {
            Some(choice) => Decision {
                choice,
                source: DecisionSource::Oracle,
            },
            None => Decision {
                choice: fallback_move(state, &eligible),
                source: DecisionSource::Fallback,
            },
        }
    }

    /// 选战利品槽位
    pub async fn choose_loot(
        &self,
        index: usize,
        state: &CombatState,
        loot_options: &[Value],
    ) -> Decision<LootChoice> {
        let eligible = LootChoice::available(loot_options.len());
        if eligible.is_empty() {
            warn!("[{}] No loot options offered, using loot_three", index);
            return Decision {
                choice: LootChoice::Three,
                source: DecisionSource::Default,
            };
        }

        let instructions = prompts::loot_instructions(&eligible, &describe_loot(loot_options));
        let context = state.describe();
        match self.ask(index, &instructions, &context, &eligible).await {
            Some(choice) => Decision {
                choice,
                source: DecisionSource::Oracle,
            },
            None => Decision {
                choice: fallback_loot(&eligible),
                source: DecisionSource::Fallback,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Combatant, MoveStats};
    use crate::llm::{LlmClient, LlmError, MockLlmClient};
    use crate::oracle::{DisabledOracle, LlmOracle};
    use serde_json::json;
    use std::time::Duration;

    fn stats(attack: i64, defense: i64, charges: i64) -> MoveStats {
        MoveStats {
            attack,
            defense,
            charges,
        }
    }

    fn state(player_life: (i64, i64), enemy_life: (i64, i64), moves: MoveSet) -> CombatState {
        CombatState {
            player: Combatant {
                health: player_life.0,
                shield: player_life.1,
                max_health: 12,
                moves,
            },
            enemy: Combatant {
                health: enemy_life.0,
                shield: enemy_life.1,
                max_health: 12,
                moves: MoveSet::default(),
            },
        }
    }

    fn selector_replying(text: &str) -> ActionSelector {
        let client = Arc::new(MockLlmClient::replying(text));
        ActionSelector::new(Arc::new(LlmOracle::new(
            vec![client as Arc<dyn LlmClient>],
            Duration::from_secs(5),
        )))
    }

    #[test]
    fn test_eligible_moves_prefers_charges_above_one() {
        let moves = MoveSet {
            rock: stats(1, 1, 2),
            paper: stats(1, 1, 1),
            scissor: stats(1, 1, 3),
        };
        assert_eq!(eligible_moves(&moves), vec![Move::Rock, Move::Scissor]);
    }

    #[test]
    fn test_eligible_moves_relaxes_to_positive_charges() {
        let moves = MoveSet {
            rock: stats(1, 1, 0),
            paper: stats(1, 1, 1),
            scissor: stats(1, 1, -1),
        };
        assert_eq!(eligible_moves(&moves), vec![Move::Paper]);

        let empty = MoveSet {
            rock: stats(1, 1, 0),
            paper: stats(1, 1, 0),
            scissor: stats(1, 1, 0),
        };
        assert!(eligible_moves(&empty).is_empty());
    }

    #[test]
    fn test_fallback_move_low_life_prefers_defense() {
        let moves = MoveSet {
            rock: stats(5, 1, 3),
            paper: stats(1, 4, 3),
            scissor: stats(2, 4, 3),
        };
        let s = state((3, 1), (10, 0), moves);
        assert_eq!(fallback_move(&s, &eligible_moves(&moves)), Move::Paper);
    }

    #[test]
    fn test_fallback_move_enemy_low_prefers_attack() {
        let moves = MoveSet {
            rock: stats(2, 1, 3),
            paper: stats(1, 4, 3),
            scissor: stats(6, 0, 3),
        };
        let s = state((10, 2), (3, 2), moves);
        assert_eq!(fallback_move(&s, &eligible_moves(&moves)), Move::Scissor);
    }

    #[test]
    fn test_fallback_move_default_first_eligible() {
        let moves = MoveSet {
            rock: stats(2, 1, 1),
            paper: stats(1, 4, 3),
            scissor: stats(6, 0, 3),
        };
        let s = state((10, 2), (10, 2), moves);
        assert_eq!(fallback_move(&s, &eligible_moves(&moves)), Move::Paper);
        assert_eq!(fallback_move(&s, &[]), Move::Rock);
    }

    #[test]
    fn test_fallback_loot() {
        assert_eq!(fallback_loot(&LootChoice::available(3)), LootChoice::Three);
        assert_eq!(fallback_loot(&LootChoice::available(2)), LootChoice::Two);
        assert_eq!(fallback_loot(&[]), LootChoice::Three);
    }

    #[test]
    fn test_parse_advice_explicit() {
        let eligible = [Move::Rock, Move::Paper];
        assert_eq!(
            parse_advice("我认为建议出 <paper>，因为对手防御高", &eligible),
            ParsedAdvice::Accepted(Move::Paper)
        );
        assert_eq!(
            parse_advice("建议出**Rock**", &eligible),
            ParsedAdvice::Accepted(Move::Rock)
        );
    }

    #[test]
    fn test_parse_advice_explicit_ineligible_is_rejected() {
        // 显式建议不可选的招式时不再退回子串匹配
        let eligible = [Move::Paper, Move::Scissor];
        assert_eq!(
            parse_advice("建议出 rock，paper 也可以", &eligible),
            ParsedAdvice::Rejected("rock".into())
        );
    }

    #[test]
    fn test_parse_advice_fullwidth_colon_after_anchor() {
        // 全角冒号后的 scissor 不可选，不能被后文的 rock 顶替
        let eligible = [Move::Rock, Move::Paper];
        assert_eq!(
            parse_advice("建议出：scissor，因为rock会被克制", &eligible),
            ParsedAdvice::Rejected("scissor".into())
        );
    }

    #[test]
    fn test_parse_advice_markdown_anchor() {
        let eligible = [Move::Rock, Move::Paper];
        assert_eq!(
            parse_advice("**建议出**: paper，因为 rock 次数不足", &eligible),
            ParsedAdvice::Accepted(Move::Paper)
        );
        assert_eq!(
            parse_advice("建议出 `rock`", &eligible),
            ParsedAdvice::Accepted(Move::Rock)
        );
    }

    #[test]
    fn test_parse_advice_anchor_without_name_is_not_found() {
        // 锚点后是中文招式名：不回退到子串匹配
        let eligible = [Move::Rock, Move::Paper];
        assert_eq!(
            parse_advice("建议出石头，paper 会输", &eligible),
            ParsedAdvice::NotFound
        );
    }

    #[test]
    fn test_parse_advice_whole_answer_and_substring() {
        let eligible = [Move::Rock, Move::Scissor];
        assert_eq!(
            parse_advice("  Scissor. ", &eligible),
            ParsedAdvice::Accepted(Move::Scissor)
        );
        assert_eq!(
            parse_advice("paper", &eligible),
            ParsedAdvice::Rejected("paper".into())
        );
        assert_eq!(
            parse_advice("I would go with scissor this round", &eligible),
            ParsedAdvice::Accepted(Move::Scissor)
        );
        assert_eq!(
            parse_advice("no idea at all", &eligible),
            ParsedAdvice::NotFound
        );
    }

    #[test]
    fn test_parse_advice_loot_slots() {
        let eligible = LootChoice::available(2);
        assert_eq!(
            parse_advice("建议出 loot_two", &eligible),
            ParsedAdvice::Accepted(LootChoice::Two)
        );
        assert_eq!(
            parse_advice("建议出 loot_three", &eligible),
            ParsedAdvice::Rejected("loot_three".into())
        );
    }

    #[tokio::test]
    async fn test_choose_move_rejects_ineligible_advice() {
        // rock 次数为 1，paper 可选，顾问仍建议 rock
        let moves = MoveSet {
            rock: stats(3, 1, 1),
            paper: stats(1, 3, 3),
            scissor: stats(2, 2, 0),
        };
        let s = state((10, 2), (10, 2), moves);
        let selector = selector_replying("建议出 rock");

        let decision = selector.choose_move(1, &s, None).await;
        assert_eq!(decision.choice, Move::Paper);
        assert_eq!(decision.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_choose_move_accepts_valid_advice() {
        let moves = MoveSet {
            rock: stats(3, 1, 3),
            paper: stats(1, 3, 3),
            scissor: stats(2, 2, 3),
        };
        let s = state((10, 2), (10, 2), moves);
        let selector = selector_replying("建议出 scissor");

        let decision = selector.choose_move(1, &s, Some("paper")).await;
        assert_eq!(decision.choice, Move::Scissor);
        assert_eq!(decision.source, DecisionSource::Oracle);
    }

    #[tokio::test]
    async fn test_choose_move_unreachable_oracle_uses_fallback() {
        let moves = MoveSet {
            rock: stats(5, 1, 3),
            paper: stats(1, 4, 3),
            scissor: stats(2, 2, 3),
        };
        let s = state((2, 1), (10, 2), moves);
        let client = Arc::new(MockLlmClient::failing(LlmError::Timeout(60)));
        let selector = ActionSelector::new(Arc::new(LlmOracle::new(
            vec![client as Arc<dyn LlmClient>],
            Duration::from_secs(5),
        )));

        let decision = selector.choose_move(1, &s, None).await;
        assert_eq!(decision.choice, fallback_move(&s, &eligible_moves(&moves)));
        assert_eq!(decision.choice, Move::Paper);
        assert_eq!(decision.source, DecisionSource::Fallback);
    }

    #[tokio::test]
    async fn test_choose_move_without_charges_defaults_to_rock() {
        let selector = ActionSelector::new(Arc::new(DisabledOracle));
        let decision = selector
            .choose_move(1, &CombatState::default(), None)
            .await;
        assert_eq!(decision.choice, Move::Rock);
        assert_eq!(decision.source, DecisionSource::Default);
    }

    #[tokio::test]
    async fn test_choose_loot() {
        let selector = selector_replying("建议出 loot_one");
        let options = vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})];
        let decision = selector
            .choose_loot(1, &CombatState::default(), &options)
            .await;
        assert_eq!(decision.choice, LootChoice::One);

        let disabled = ActionSelector::new(Arc::new(DisabledOracle));
        let decision = disabled
            .choose_loot(1, &CombatState::default(), &options[..2])
            .await;
        assert_eq!(decision.choice, LootChoice::Two);
        assert_eq!(decision.source, DecisionSource::Fallback);

        let decision = disabled.choose_loot(1, &CombatState::default(), &[]).await;
        assert_eq!(decision.choice, LootChoice::Three);
        assert_eq!(decision.source, DecisionSource::Default);
    }

    #[test]
    fn test_describe_loot() {
        let text = describe_loot(&[json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(text, "loot_one: {\"id\":1}\nloot_two: {\"id\":2}");
    }
}
