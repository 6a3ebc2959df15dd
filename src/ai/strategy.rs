use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::game::GameState;

use super::agent::{AiConfig, AiDifficulty, AiPersonality};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    Leading,
    Even,
    Trailing,
}

/// What an AI player can see when deciding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiContext {
    /// Value of the card on the table, if any.
    pub card_value: Option<u8>,
    pub lives: u8,
    pub starting_lives: u8,
    pub best_opponent_lives: u8,
    pub standing: Standing,
    /// Players with lives left, this one included.
    pub eligible_players: usize,
}

impl AiContext {
    pub fn from_state(state: &GameState, player_index: usize, starting_lives: u8) -> Self {
        let lives = state
            .players
            .get(player_index)
            .map(|player| player.lives)
            .unwrap_or(0);
        let best_opponent_lives = state
            .players
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != player_index)
            .map(|(_, player)| player.lives)
            .max()
            .unwrap_or(0);
        let standing = if lives > best_opponent_lives {
            Standing::Leading
        } else if lives < best_opponent_lives {
            Standing::Trailing
        } else {
            Standing::Even
        };

        Self {
            card_value: state.current_card.map(|card| card.value()),
            lives,
            starting_lives: starting_lives.max(1),
            best_opponent_lives,
            standing,
            eligible_players: state.players.eligible_count(),
        }
    }

    pub fn on_last_life(&self) -> bool {
        self.lives <= 1
    }

    /// Turns this player would sit out after passing.
    pub fn turns_waiting(&self) -> usize {
        self.eligible_players.saturating_sub(1)
    }
}

/// Probability model behind an AI player. Every method returns the
/// probability of the first option (red, keep, higher, play).
pub trait DecisionStrategy {
    fn red_probability(&self, ctx: &AiContext) -> f64;
    fn keep_probability(&self, ctx: &AiContext) -> f64;
    fn higher_probability(&self, ctx: &AiContext) -> f64;
    fn play_probability(&self, ctx: &AiContext) -> f64;
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Cards strictly above and below `value` among the other 51.
fn outs(value: u8) -> (f64, f64) {
    let value = value.clamp(2, 14) as f64;
    ((14.0 - value) * 4.0, (value - 2.0) * 4.0)
}

/// Rule-of-thumb player driven by an `AiPersonality`.
#[derive(Debug, Clone)]
pub struct HeuristicStrategy {
    personality: AiPersonality,
}

impl HeuristicStrategy {
    pub fn new(personality: AiPersonality) -> Self {
        Self { personality }
    }

    /// Chance that the next card beats `value` in the better direction.
    pub fn success_estimate(value: u8) -> f64 {
        let (higher, lower) = outs(value);
        higher.max(lower) / 51.0
    }
}

impl DecisionStrategy for HeuristicStrategy {
    fn red_probability(&self, _ctx: &AiContext) -> f64 {
        (0.5 + self.personality.color_bias).clamp(0.0, 1.0)
    }

    fn keep_probability(&self, ctx: &AiContext) -> f64 {
        let Some(value) = ctx.card_value else {
            return 0.5;
        };
        // 0 at the middle of the range, 1 at either end.
        let skew = (value as f64 - 8.0).abs() / 6.0;

        let mut threshold = self.personality.keep_card_threshold;
        match ctx.standing {
            Standing::Leading => threshold -= 0.05,
            Standing::Trailing => threshold += 0.05,
            Standing::Even => {}
        }
        let steepness = if ctx.on_last_life() { 12.0 } else { 8.0 };

        logistic((skew - threshold) * steepness)
    }

    fn higher_probability(&self, ctx: &AiContext) -> f64 {
        let Some(value) = ctx.card_value else {
            return 0.5;
        };
        let (higher, lower) = outs(value);
        let odds = higher / (higher + lower);
        let flatten = 1.0 - 0.3 * self.personality.risk_tolerance;
        0.5 + (odds - 0.5) * flatten
    }

    fn play_probability(&self, ctx: &AiContext) -> f64 {
        let Some(value) = ctx.card_value else {
            return 0.0;
        };
        let success = Self::success_estimate(value);
        let failure_cost = ctx.starting_lives as f64 / ctx.lives.max(1) as f64;
        let mut score = success - (1.0 - success) * failure_cost;

        match ctx.standing {
            Standing::Leading => score -= 0.1,
            Standing::Trailing => score += 0.1,
            Standing::Even => {}
        }
        score += 0.05 * ctx.turns_waiting().saturating_sub(1) as f64;
        score += (self.personality.risk_tolerance - 0.5) * 0.2;

        logistic((score - self.personality.play_again_threshold) * 6.0)
    }
}

pub type StrategyFactory = fn(&AiConfig) -> Box<dyn DecisionStrategy>;

fn heuristic_factory(config: &AiConfig) -> Box<dyn DecisionStrategy> {
    Box::new(HeuristicStrategy::new(config.personality))
}

/// Difficulty tier to strategy lookup used when seating computer players.
#[derive(Clone)]
pub struct StrategyRegistry {
    factories: HashMap<AiDifficulty, StrategyFactory>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for difficulty in AiDifficulty::ALL {
            registry.register(difficulty, heuristic_factory);
        }
        registry
    }
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, difficulty: AiDifficulty, factory: StrategyFactory) {
        self.factories.insert(difficulty, factory);
    }

    pub fn contains(&self, difficulty: AiDifficulty) -> bool {
        self.factories.contains_key(&difficulty)
    }

    pub fn build(
        &self,
        difficulty: AiDifficulty,
        config: &AiConfig,
    ) -> Option<Box<dyn DecisionStrategy>> {
        self.factories.get(&difficulty).map(|factory| factory(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(value: u8, lives: u8, opponent: u8) -> AiContext {
        AiContext {
            card_value: Some(value),
            lives,
            starting_lives: 4,
            best_opponent_lives: opponent,
            standing: if lives > opponent {
                Standing::Leading
            } else if lives < opponent {
                Standing::Trailing
            } else {
                Standing::Even
            },
            eligible_players: 2,
        }
    }

    fn medium() -> HeuristicStrategy {
        HeuristicStrategy::new(AiConfig::from_difficulty(AiDifficulty::Medium).personality)
    }

    #[test]
    fn keep_prefers_extreme_cards() {
        let strategy = medium();
        let ace = strategy.keep_probability(&ctx(14, 4, 4));
        let two = strategy.keep_probability(&ctx(2, 4, 4));
        let seven = strategy.keep_probability(&ctx(7, 4, 4));
        let eight = strategy.keep_probability(&ctx(8, 4, 4));
        assert!(ace > 0.8 && two > 0.8);
        assert!(seven < 0.2 && eight < 0.2);
    }

    #[test]
    fn higher_tracks_card_position() {
        let strategy = medium();
        assert!(strategy.higher_probability(&ctx(2, 4, 4)) > 0.8);
        assert!(strategy.higher_probability(&ctx(14, 4, 4)) < 0.2);
        let mid = strategy.higher_probability(&ctx(8, 4, 4));
        assert!((mid - 0.5).abs() < 1e-9);
    }

    #[test]
    fn last_life_makes_play_more_conservative() {
        let strategy = medium();
        let healthy = strategy.play_probability(&ctx(3, 4, 4));
        let last = strategy.play_probability(&ctx(3, 1, 1));
        assert!(last < healthy);
    }

    #[test]
    fn context_reads_standing_from_state() {
        use crate::game::{Deck, GameState, Player};
        let players = vec![Player::human(0, "A", 2), Player::human(1, "B", 3)];
        let state = GameState::new(players, Deck::default());
        let context = AiContext::from_state(&state, 0, 4);
        assert_eq!(context.standing, Standing::Trailing);
        assert_eq!(context.turns_waiting(), 1);
        assert_eq!(context.card_value, None);
    }

    #[test]
    fn empty_registry_builds_nothing() {
        let registry = StrategyRegistry::empty();
        let config = AiConfig::from_difficulty(AiDifficulty::Hard);
        assert!(registry.build(AiDifficulty::Hard, &config).is_none());
        assert!(StrategyRegistry::default().contains(AiDifficulty::Easy));
    }
}
