use std::fmt;
use std::str::FromStr;

use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::game::{
    CardColor, Direction, GameAction, GamePhase, GameState, KeepChoice, PlayChoice,
};

use super::strategy::{AiContext, DecisionStrategy, HeuristicStrategy};

/// At most this many plays in one turn before a pass is forced.
pub const MAX_PLAYS_PER_TURN: u8 = 2;
/// The only card values an AI player will play on.
pub const PLAYABLE_VALUES: [u8; 4] = [2, 3, 13, 14];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AiDifficulty {
    Easy,
    Medium,
    Hard,
}

impl AiDifficulty {
    pub const ALL: [AiDifficulty; 3] = [
        AiDifficulty::Easy,
        AiDifficulty::Medium,
        AiDifficulty::Hard,
    ];
}

impl Default for AiDifficulty {
    fn default() -> Self {
        AiDifficulty::Medium
    }
}

impl FromStr for AiDifficulty {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(AiDifficulty::Easy),
            "medium" | "normal" => Ok(AiDifficulty::Medium),
            "hard" => Ok(AiDifficulty::Hard),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AiDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiDifficulty::Easy => f.write_str("easy"),
            AiDifficulty::Medium => f.write_str("medium"),
            AiDifficulty::Hard => f.write_str("hard"),
        }
    }
}

/// Tuning knobs of a computer player. None of the values are load-bearing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AiPersonality {
    /// Added to the 50% chance of calling red.
    pub color_bias: f64,
    /// 0 = always follows the odds, 1 = happy to gamble.
    pub risk_tolerance: f64,
    /// Card value skew (0 mid-range, 1 extreme) above which keeping is preferred.
    pub keep_card_threshold: f64,
    /// Expected-value score a play must clear.
    pub play_again_threshold: f64,
    /// Share of every decision replaced by a coin flip.
    pub randomness: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u32,
    pub max_ms: u32,
}

impl DelayRange {
    pub const fn new(min_ms: u32, max_ms: u32) -> Self {
        Self { min_ms, max_ms }
    }
}

/// Artificial "thinking" pauses per decision kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThinkingTime {
    pub color_guess: DelayRange,
    pub keep_or_change: DelayRange,
    pub higher_lower: DelayRange,
    pub play_or_pass: DelayRange,
    /// Multiplies every delay; 0 makes computer players answer at once.
    pub scale: f64,
}

impl Default for ThinkingTime {
    fn default() -> Self {
        Self {
            color_guess: DelayRange::new(400, 900),
            keep_or_change: DelayRange::new(700, 1600),
            higher_lower: DelayRange::new(600, 1400),
            play_or_pass: DelayRange::new(900, 2500),
            scale: 1.0,
        }
    }
}

impl ThinkingTime {
    pub fn instant() -> Self {
        Self {
            scale: 0.0,
            ..Self::default()
        }
    }

    pub fn range(&self, kind: DecisionKind) -> DelayRange {
        match kind {
            DecisionKind::ColorGuess => self.color_guess,
            DecisionKind::KeepOrChange => self.keep_or_change,
            DecisionKind::HigherLower => self.higher_lower,
            DecisionKind::PlayOrPass => self.play_or_pass,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    pub difficulty: AiDifficulty,
    pub personality: AiPersonality,
    pub thinking: ThinkingTime,
}

impl AiConfig {
    pub fn from_difficulty(difficulty: AiDifficulty) -> Self {
        let personality = match difficulty {
            AiDifficulty::Easy => AiPersonality {
                color_bias: 0.08,
                risk_tolerance: 0.8,
                keep_card_threshold: 0.5,
                play_again_threshold: 0.5,
                randomness: 0.5,
            },
            AiDifficulty::Medium => AiPersonality {
                color_bias: 0.0,
                risk_tolerance: 0.5,
                keep_card_threshold: 0.4,
                play_again_threshold: 0.6,
                randomness: 0.25,
            },
            AiDifficulty::Hard => AiPersonality {
                color_bias: -0.03,
                risk_tolerance: 0.3,
                keep_card_threshold: 0.35,
                play_again_threshold: 0.65,
                randomness: 0.05,
            },
        };
        Self {
            difficulty,
            personality,
            thinking: ThinkingTime::default(),
        }
    }

    pub fn with_thinking(mut self, thinking: ThinkingTime) -> Self {
        self.thinking = thinking;
        self
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig::from_difficulty(AiDifficulty::Medium)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    ColorGuess,
    KeepOrChange,
    HigherLower,
    PlayOrPass,
}

/// Why a pass was forced regardless of what the strategy wanted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ForcedPass {
    PlayLimitReached,
    CardNotExtreme,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiDecision {
    pub kind: DecisionKind,
    pub action: GameAction,
    pub choice: String,
    pub delay_ms: u32,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced: Option<ForcedPass>,
}

/// A computer player: a strategy plus the hidden rules every strategy obeys.
pub struct AiAgent {
    config: AiConfig,
    strategy: Box<dyn DecisionStrategy>,
    rng: SmallRng,
    plays_this_turn: u8,
    turn_seen: u32,
}

impl AiAgent {
    pub fn new(config: AiConfig, strategy: Box<dyn DecisionStrategy>) -> Self {
        Self {
            config,
            strategy,
            rng: SmallRng::from_entropy(),
            plays_this_turn: 0,
            turn_seen: 0,
        }
    }

    pub fn with_seed(config: AiConfig, strategy: Box<dyn DecisionStrategy>, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            ..Self::new(config, strategy)
        }
    }

    pub fn heuristic(config: AiConfig) -> Self {
        let strategy = Box::new(HeuristicStrategy::new(config.personality));
        Self::new(config, strategy)
    }

    pub fn config(&self) -> &AiConfig {
        &self.config
    }

    pub fn plays_this_turn(&self) -> u8 {
        self.plays_this_turn
    }

    fn observe_turn(&mut self, turn: u32) {
        if turn != self.turn_seen {
            self.turn_seen = turn;
            self.plays_this_turn = 0;
        }
    }

    /// Decides for the player at `player_index`, or `None` when the phase
    /// asks nothing of anyone.
    pub fn decide(
        &mut self,
        state: &GameState,
        player_index: usize,
        starting_lives: u8,
    ) -> Option<AiDecision> {
        self.observe_turn(state.turn);
        let ctx = AiContext::from_state(state, player_index, starting_lives);

        let decision = match state.phase {
            GamePhase::AwaitingColorGuess => {
                let p = self.blend(self.strategy.red_probability(&ctx));
                let red = self.roll(p);
                let guess = if red { CardColor::Red } else { CardColor::Black };
                self.finish(
                    DecisionKind::ColorGuess,
                    GameAction::GuessColor { guess },
                    p,
                    red,
                    None,
                )
            }
            GamePhase::AwaitingKeepOrChange => {
                let p = self.blend(self.strategy.keep_probability(&ctx));
                let keep = self.roll(p);
                let choice = if keep {
                    KeepChoice::Keep
                } else {
                    KeepChoice::Change
                };
                self.finish(
                    DecisionKind::KeepOrChange,
                    GameAction::KeepOrChange { choice },
                    p,
                    keep,
                    None,
                )
            }
            GamePhase::AwaitingHigherLower => {
                let p = self.blend(self.strategy.higher_probability(&ctx));
                let higher = self.roll(p);
                let guess = if higher {
                    Direction::Higher
                } else {
                    Direction::Lower
                };
                self.finish(
                    DecisionKind::HigherLower,
                    GameAction::GuessHigherLower { guess },
                    p,
                    higher,
                    None,
                )
            }
            GamePhase::PlayOrPass => self.decide_play_or_pass(&ctx),
            GamePhase::Setup | GamePhase::ShowingResult { .. } | GamePhase::GameOver { .. } => {
                return None
            }
        };

        debug!(
            "AI player {player_index} ({}) chose {} in {}ms (confidence {:.2})",
            self.config.difficulty, decision.choice, decision.delay_ms, decision.confidence
        );
        Some(decision)
    }

    fn decide_play_or_pass(&mut self, ctx: &AiContext) -> AiDecision {
        let pass = GameAction::PlayOrPass {
            choice: PlayChoice::Pass,
        };
        let forced = if self.plays_this_turn >= MAX_PLAYS_PER_TURN {
            Some(ForcedPass::PlayLimitReached)
        } else if !ctx
            .card_value
            .map_or(false, |value| PLAYABLE_VALUES.contains(&value))
        {
            Some(ForcedPass::CardNotExtreme)
        } else {
            None
        };
        if forced.is_some() {
            return self.finish(DecisionKind::PlayOrPass, pass, 0.0, false, forced);
        }

        let p = self.blend(self.strategy.play_probability(ctx));
        let play = self.roll(p);
        let action = if play {
            GameAction::PlayOrPass {
                choice: PlayChoice::Play,
            }
        } else {
            pass
        };
        self.finish(DecisionKind::PlayOrPass, action, p, play, None)
    }

    /// Records a decision that the rule engine accepted.
    pub fn note_applied(&mut self, action: &GameAction, turn: u32) {
        self.observe_turn(turn);
        if matches!(
            action,
            GameAction::PlayOrPass {
                choice: PlayChoice::Play
            }
        ) {
            self.plays_this_turn = self.plays_this_turn.saturating_add(1);
        }
    }

    /// Pulls a probability towards a coin flip by the personality's randomness.
    fn blend(&self, p: f64) -> f64 {
        let r = self.config.personality.randomness.clamp(0.0, 1.0);
        (p * (1.0 - r) + 0.5 * r).clamp(0.0, 1.0)
    }

    fn roll(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    fn finish(
        &mut self,
        kind: DecisionKind,
        action: GameAction,
        p: f64,
        took_first: bool,
        forced: Option<ForcedPass>,
    ) -> AiDecision {
        let confidence = if forced.is_some() {
            1.0
        } else if took_first {
            p
        } else {
            1.0 - p
        };
        let delay_ms = self.thinking_delay(kind, confidence);
        AiDecision {
            kind,
            action,
            choice: action.label().to_string(),
            delay_ms,
            confidence,
            forced,
        }
    }

    /// Less certain decisions take longer, with some jitter on top.
    fn thinking_delay(&mut self, kind: DecisionKind, confidence: f64) -> u32 {
        let thinking = self.config.thinking;
        let range = thinking.range(kind);
        let span = range.max_ms.saturating_sub(range.min_ms) as f64;
        let doubt = 1.0 - ((confidence - 0.5).abs() * 2.0).clamp(0.0, 1.0);
        let jitter: f64 = self.rng.gen();
        let raw = range.min_ms as f64 + span * (0.35 * doubt + 0.65 * jitter);
        (raw * thinking.scale.max(0.0)).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Card, Deck, Player, Rank, Suit};

    fn agent(difficulty: AiDifficulty, seed: u64) -> AiAgent {
        let config = AiConfig::from_difficulty(difficulty);
        let strategy = Box::new(HeuristicStrategy::new(config.personality));
        AiAgent::with_seed(config, strategy, seed)
    }

    fn state_with(card: Card, phase: GamePhase) -> GameState {
        let players = vec![
            Player::computer(0, "CPU", 4, AiDifficulty::Hard),
            Player::human(1, "You", 4),
        ];
        let mut state = GameState::new(players, Deck::default()).with_phase(phase);
        state.current_card = Some(card);
        state
    }

    #[test]
    fn never_plays_on_non_extreme_values() {
        for difficulty in AiDifficulty::ALL {
            let mut ai = agent(difficulty, 21);
            for rank in Rank::ALL {
                let state = state_with(Card::new(rank, Suit::Hearts), GamePhase::PlayOrPass);
                for _ in 0..50 {
                    let decision = ai.decide(&state, 0, 4).expect("decision in play phase");
                    if !PLAYABLE_VALUES.contains(&rank.value()) {
                        assert_eq!(decision.choice, "pass");
                        assert_eq!(decision.forced, Some(ForcedPass::CardNotExtreme));
                    }
                }
            }
        }
    }

    #[test]
    fn plays_at_most_twice_per_turn() {
        let mut ai = agent(AiDifficulty::Easy, 5);
        let mut state = state_with(Card::new(Rank::Two, Suit::Clubs), GamePhase::PlayOrPass);
        let mut plays = 0;
        for _ in 0..200 {
            let decision = ai.decide(&state, 0, 4).expect("decision");
            if decision.choice == "play" {
                plays += 1;
                ai.note_applied(&decision.action, state.turn);
            }
        }
        assert!(plays <= MAX_PLAYS_PER_TURN as usize);
        assert_eq!(plays, 2, "a 2 is worth playing until the limit");

        state.turn += 1;
        let decision = ai.decide(&state, 0, 4).expect("decision");
        assert_eq!(ai.plays_this_turn(), 0, "counter resets with a new turn");
        assert_ne!(decision.forced, Some(ForcedPass::PlayLimitReached));
    }

    #[test]
    fn hard_ai_follows_the_odds_on_higher_lower() {
        let mut ai = agent(AiDifficulty::Hard, 9);
        let low = state_with(Card::new(Rank::Two, Suit::Spades), GamePhase::AwaitingHigherLower);
        let higher = (0..100)
            .filter_map(|_| ai.decide(&low, 0, 4))
            .filter(|decision| decision.choice == "higher")
            .count();
        assert!(higher > 75);
    }

    #[test]
    fn delays_stay_within_configured_ranges() {
        let mut ai = agent(AiDifficulty::Medium, 3);
        let state = state_with(
            Card::new(Rank::Nine, Suit::Hearts),
            GamePhase::AwaitingKeepOrChange,
        );
        let range = ThinkingTime::default().keep_or_change;
        for _ in 0..100 {
            let decision = ai.decide(&state, 0, 4).expect("decision");
            assert!(decision.delay_ms >= range.min_ms && decision.delay_ms <= range.max_ms);
            assert!((0.0..=1.0).contains(&decision.confidence));
        }
    }

    #[test]
    fn instant_thinking_has_no_delay() {
        let config =
            AiConfig::from_difficulty(AiDifficulty::Easy).with_thinking(ThinkingTime::instant());
        let mut ai = AiAgent::heuristic(config);
        let state = state_with(Card::new(Rank::Nine, Suit::Hearts), GamePhase::AwaitingColorGuess);
        assert_eq!(ai.decide(&state, 0, 4).expect("decision").delay_ms, 0);
    }

    #[test]
    fn no_decision_outside_decision_phases() {
        let mut ai = agent(AiDifficulty::Medium, 1);
        let state = state_with(
            Card::new(Rank::Nine, Suit::Hearts),
            GamePhase::GameOver { winner: 1 },
        );
        assert!(ai.decide(&state, 0, 4).is_none());
    }
}
