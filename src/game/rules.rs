use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::AiDifficulty;

use super::{
    card::{Card, CardColor},
    deck::Deck,
    player::{Player, PlayerId},
    state::{
        FailureReason, GameEvent, GamePhase, GameSnapshot, GameState, IntegrityError, SoundCue,
        VictoryState,
    },
};

pub const MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum KeepChoice {
    Keep,
    Change,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Higher,
    Lower,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayChoice {
    Play,
    Pass,
}

impl FromStr for KeepChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(KeepChoice::Keep),
            "change" => Ok(KeepChoice::Change),
            _ => Err(()),
        }
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "higher" | "high" => Ok(Direction::Higher),
            "lower" | "low" => Ok(Direction::Lower),
            _ => Err(()),
        }
    }
}

impl FromStr for PlayChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" => Ok(PlayChoice::Play),
            "pass" => Ok(PlayChoice::Pass),
            _ => Err(()),
        }
    }
}

/// A decision submitted by whoever currently acts, human or computer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameAction {
    GuessColor { guess: CardColor },
    KeepOrChange { choice: KeepChoice },
    GuessHigherLower { guess: Direction },
    PlayOrPass { choice: PlayChoice },
}

impl GameAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            GameAction::GuessColor { .. } => ActionKind::GuessColor,
            GameAction::KeepOrChange { .. } => ActionKind::KeepOrChange,
            GameAction::GuessHigherLower { .. } => ActionKind::GuessHigherLower,
            GameAction::PlayOrPass { .. } => ActionKind::PlayOrPass,
        }
    }

    /// Short label for buttons and logs: "red", "keep", "higher", "pass".
    pub fn label(&self) -> &'static str {
        match self {
            GameAction::GuessColor { guess: CardColor::Red } => "red",
            GameAction::GuessColor { guess: CardColor::Black } => "black",
            GameAction::KeepOrChange { choice: KeepChoice::Keep } => "keep",
            GameAction::KeepOrChange { choice: KeepChoice::Change } => "change",
            GameAction::GuessHigherLower { guess: Direction::Higher } => "higher",
            GameAction::GuessHigherLower { guess: Direction::Lower } => "lower",
            GameAction::PlayOrPass { choice: PlayChoice::Play } => "play",
            GameAction::PlayOrPass { choice: PlayChoice::Pass } => "pass",
        }
    }
}

/// Every input the state machine understands, including the internal ones.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    StartGame,
    GuessColor,
    KeepOrChange,
    GuessHigherLower,
    PlayOrPass,
    ResolveResult,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::StartGame => "start a game",
            ActionKind::GuessColor => "guess a color",
            ActionKind::KeepOrChange => "keep or change",
            ActionKind::GuessHigherLower => "guess higher or lower",
            ActionKind::PlayOrPass => "play or pass",
            ActionKind::ResolveResult => "resolve a result",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum RuleError {
    #[error("no card left to draw in the deck or the discard pile")]
    DeckExhausted,
    #[error("cannot {action} while {phase}")]
    InvalidTransition { phase: GamePhase, action: ActionKind },
    #[error("no AI strategy registered for player {player_id} ({difficulty})")]
    AiDecisionUnavailable {
        player_id: PlayerId,
        difficulty: AiDifficulty,
    },
    #[error("at least {min} players are needed, got {actual}")]
    NotEnoughPlayers { min: usize, actual: usize },
    #[error("at most {max} players are allowed, got {actual}")]
    TooManyPlayers { max: usize, actual: usize },
    #[error("a computer player is acting")]
    NotHumanTurn,
    #[error("session halted: {reason}")]
    SessionHalted { reason: String },
    #[error("state integrity violated: {error}")]
    IntegrityViolation { error: IntegrityError },
}

impl RuleError {
    /// Fatal errors halt the session; everything else is a rejected input.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuleError::DeckExhausted | RuleError::IntegrityViolation { .. }
        )
    }
}

impl From<IntegrityError> for RuleError {
    fn from(error: IntegrityError) -> Self {
        RuleError::IntegrityViolation { error }
    }
}

/// Outcome of one transition as seen by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameSnapshot,
    pub events: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sounds: Vec<SoundCue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victory: Option<VictoryState>,
}

impl RuleResolution {
    pub fn new(state: &GameState, events: Vec<GameEvent>) -> Self {
        let sounds = events
            .iter()
            .flat_map(|event| event.sound_cues().iter().copied())
            .collect();
        Self {
            state: state.snapshot(),
            events,
            sounds,
            victory: state.outcome.clone(),
        }
    }
}

/// Applies game rules to a `GameState`. Owns the randomness used for shuffles.
pub struct RuleEngine {
    rng: SmallRng,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_entropy(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    fn ensure_phase(
        state: &GameState,
        expected: &GamePhase,
        action: ActionKind,
    ) -> Result<(), RuleError> {
        if &state.phase != expected {
            return Err(RuleError::InvalidTransition {
                phase: state.phase.clone(),
                action,
            });
        }
        Ok(())
    }

    fn ensure_integrity(state: &GameState) -> Result<(), RuleError> {
        state.integrity_check().map_err(RuleError::from)
    }

    /// Last step of every transition: the resolution only goes out if the
    /// cards are still all accounted for.
    fn settle(state: &GameState, events: Vec<GameEvent>) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_integrity(state)?;
        Ok(events)
    }

    fn emit(state: &mut GameState, events: &mut Vec<GameEvent>, event: GameEvent) {
        state.record_event(event.clone());
        events.push(event);
    }

    fn emit_all(state: &mut GameState, events: &mut Vec<GameEvent>, batch: Vec<GameEvent>) {
        for event in batch {
            Self::emit(state, events, event);
        }
    }

    fn table_card(state: &GameState) -> Result<Card, RuleError> {
        state
            .current_card
            .ok_or(RuleError::IntegrityViolation {
                error: IntegrityError::NoCardOnTable,
            })
    }

    fn player_id(state: &GameState, index: usize) -> Result<PlayerId, RuleError> {
        state
            .player_id_at(index)
            .ok_or(RuleError::IntegrityViolation {
                error: IntegrityError::InvalidPlayerIndex { index },
            })
    }

    fn name_at(state: &GameState, index: usize) -> String {
        state
            .players
            .get(index)
            .map(|player| player.name.clone())
            .unwrap_or_default()
    }

    pub fn start_game(
        &mut self,
        state: &mut GameState,
        players: Vec<Player>,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, &GamePhase::Setup, ActionKind::StartGame)?;
        if players.len() < MIN_PLAYERS {
            return Err(RuleError::NotEnoughPlayers {
                min: MIN_PLAYERS,
                actual: players.len(),
            });
        }

        let deck = Deck::new_shuffled(&mut self.rng);
        *state = GameState::new(players, deck);
        Self::ensure_integrity(state)?;

        let mut events = Vec::new();
        let ids = state.players.iter().map(|player| player.id).collect();
        Self::emit(state, &mut events, GameEvent::GameStarted { players: ids });
        let first = Self::player_id(state, state.current_player)?;
        Self::emit(
            state,
            &mut events,
            GameEvent::TurnStarted {
                player_id: first,
                turn: state.turn,
            },
        );
        state.message = format!(
            "{} starts. Red or black?",
            Self::name_at(state, state.current_player)
        );
        info!("game started with {} players", state.players.len());

        Self::settle(state, events)
    }

    /// Dispatches a decision to the transition for the current phase.
    pub fn apply(
        &mut self,
        state: &mut GameState,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        match action {
            GameAction::GuessColor { guess } => self.guess_color(state, guess),
            GameAction::KeepOrChange { choice } => self.keep_or_change(state, choice),
            GameAction::GuessHigherLower { guess } => self.guess_higher_lower(state, guess),
            GameAction::PlayOrPass { choice } => self.play_or_pass(state, choice),
        }
    }

    pub fn guess_color(
        &mut self,
        state: &mut GameState,
        guess: CardColor,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, &GamePhase::AwaitingColorGuess, ActionKind::GuessColor)?;
        Self::ensure_integrity(state)?;

        let guesser = state.current_player;
        let guesser_id = Self::player_id(state, guesser)?;
        let (card, draw_events) = state.draw_to_table(&mut self.rng)?;

        let mut events = Vec::new();
        Self::emit_all(state, &mut events, draw_events);

        let correct = card.color() == guess;
        Self::emit(
            state,
            &mut events,
            GameEvent::ColorGuessed {
                player_id: guesser_id,
                guess,
                card,
                correct,
            },
        );
        debug!("player {guesser_id} guessed {guess} and drew {card}");

        let guesser_name = Self::name_at(state, guesser);
        if correct {
            state.message =
                format!("{guesser_name} called {guess} right: {card}. Keep it or change it?");
        } else {
            let decider = state.players.next_eligible(guesser).unwrap_or(guesser);
            if decider != guesser {
                let decider_id = Self::player_id(state, decider)?;
                state.turn_owner = Some(guesser);
                state.current_player = decider;
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::DecisionDelegated {
                        turn_owner: guesser_id,
                        decider: decider_id,
                    },
                );
            }
            state.message = format!(
                "{guesser_name} called {guess} but drew {card}. {} decides: keep it or change it?",
                Self::name_at(state, state.current_player)
            );
        }
        state.phase = GamePhase::AwaitingKeepOrChange;

        Self::settle(state, events)
    }

    pub fn keep_or_change(
        &mut self,
        state: &mut GameState,
        choice: KeepChoice,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(
            state,
            &GamePhase::AwaitingKeepOrChange,
            ActionKind::KeepOrChange,
        )?;
        Self::ensure_integrity(state)?;

        let decider_id = Self::player_id(state, state.current_player)?;
        let current = Self::table_card(state)?;
        let mut events = Vec::new();

        let baseline = match choice {
            KeepChoice::Keep => {
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::CardKept {
                        player_id: decider_id,
                        card: current,
                    },
                );
                current
            }
            KeepChoice::Change => {
                let (card, draw_events) = state.draw_to_table(&mut self.rng)?;
                Self::emit_all(state, &mut events, draw_events);
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::CardChanged {
                        player_id: decider_id,
                        discarded: current,
                        card,
                    },
                );
                card
            }
        };

        if let Some(owner) = state.turn_owner.take() {
            let owner_id = Self::player_id(state, owner)?;
            state.current_player = owner;
            Self::emit(
                state,
                &mut events,
                GameEvent::TurnOwnerRestored { player_id: owner_id },
            );
        }

        state.phase = GamePhase::AwaitingHigherLower;
        state.message = format!(
            "{} to beat: higher or lower than {baseline}?",
            Self::name_at(state, state.current_player)
        );

        Self::settle(state, events)
    }

    pub fn guess_higher_lower(
        &mut self,
        state: &mut GameState,
        guess: Direction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(
            state,
            &GamePhase::AwaitingHigherLower,
            ActionKind::GuessHigherLower,
        )?;
        Self::ensure_integrity(state)?;

        let guesser = state.current_player;
        let guesser_id = Self::player_id(state, guesser)?;
        let baseline = Self::table_card(state)?;
        let (drawn, draw_events) = state.draw_to_table(&mut self.rng)?;

        let mut events = Vec::new();
        Self::emit_all(state, &mut events, draw_events);

        let failure = judge(baseline, drawn, guess);
        Self::emit(
            state,
            &mut events,
            GameEvent::HigherLowerGuessed {
                player_id: guesser_id,
                guess,
                baseline,
                drawn,
                failure,
            },
        );
        debug!("player {guesser_id} guessed {guess:?} on {baseline}, drew {drawn}: {failure:?}");

        let name = Self::name_at(state, guesser);
        match failure {
            None => {
                state.phase = GamePhase::PlayOrPass;
                state.message = format!("{drawn}! {name} was right. Play on or pass?");
            }
            Some(reason) => {
                state.phase = GamePhase::ShowingResult {
                    player_index: guesser,
                    reason,
                };
                state.message = match reason {
                    FailureReason::SameValueTie => {
                        format!("{drawn} matches {baseline}. A tie always loses, {name}.")
                    }
                    FailureReason::IncorrectGuess => {
                        format!("{drawn}. Wrong call, {name}.")
                    }
                };
            }
        }

        Self::settle(state, events)
    }

    pub fn play_or_pass(
        &mut self,
        state: &mut GameState,
        choice: PlayChoice,
    ) -> Result<Vec<GameEvent>, RuleError> {
        Self::ensure_phase(state, &GamePhase::PlayOrPass, ActionKind::PlayOrPass)?;
        Self::ensure_integrity(state)?;

        let actor = state.current_player;
        let actor_id = Self::player_id(state, actor)?;
        let baseline = Self::table_card(state)?;
        let mut events = Vec::new();

        match choice {
            PlayChoice::Play => {
                Self::emit(state, &mut events, GameEvent::Played { player_id: actor_id });
                state.message = format!(
                    "{} plays on: higher or lower than {baseline}?",
                    Self::name_at(state, actor)
                );
            }
            PlayChoice::Pass => {
                let next = state.players.next_eligible(actor).unwrap_or(actor);
                let next_id = Self::player_id(state, next)?;
                state.current_player = next;
                state.turn += 1;
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::Passed {
                        player_id: actor_id,
                        next_player: next_id,
                    },
                );
                Self::emit(
                    state,
                    &mut events,
                    GameEvent::TurnStarted {
                        player_id: next_id,
                        turn: state.turn,
                    },
                );
                state.message = format!(
                    "{} passes. {}: higher or lower than {baseline}?",
                    Self::name_at(state, actor),
                    Self::name_at(state, next)
                );
            }
        }
        state.phase = GamePhase::AwaitingHigherLower;

        Self::settle(state, events)
    }

    /// Applies the life penalty once a failed guess has been displayed.
    pub fn resolve_result(&mut self, state: &mut GameState) -> Result<Vec<GameEvent>, RuleError> {
        let (index, reason) = match state.phase {
            GamePhase::ShowingResult {
                player_index,
                reason,
            } => (player_index, reason),
            _ => {
                return Err(RuleError::InvalidTransition {
                    phase: state.phase.clone(),
                    action: ActionKind::ResolveResult,
                })
            }
        };
        Self::ensure_integrity(state)?;

        let loser_id = Self::player_id(state, index)?;
        let lives_left = state
            .players
            .get_mut(index)
            .map(Player::lose_life)
            .ok_or(RuleError::IntegrityViolation {
                error: IntegrityError::InvalidPlayerIndex { index },
            })?;

        let mut events = Vec::new();
        Self::emit(
            state,
            &mut events,
            GameEvent::LifeLost {
                player_id: loser_id,
                lives_left,
                reason,
            },
        );
        if lives_left == 0 {
            info!("player {loser_id} eliminated");
            Self::emit(
                state,
                &mut events,
                GameEvent::PlayerEliminated { player_id: loser_id },
            );
        }

        state.turn_owner = None;
        if let Some(winner) = state.players.check_winner() {
            let victory = VictoryState {
                winner: winner.id,
                name: winner.name.clone(),
            };
            info!("game over, player {} wins", victory.winner);
            state.phase = GamePhase::GameOver {
                winner: victory.winner,
            };
            state.message = format!("{} wins the game!", victory.name);
            Self::emit(
                state,
                &mut events,
                GameEvent::GameWon {
                    winner: victory.winner,
                },
            );
            state.outcome = Some(victory);
            return Self::settle(state, events);
        }

        let next = if lives_left == 0 {
            state.players.next_eligible(index).unwrap_or(index)
        } else {
            index
        };
        let next_id = Self::player_id(state, next)?;
        state.current_player = next;
        state.turn += 1;
        state.phase = GamePhase::AwaitingColorGuess;
        Self::emit(
            state,
            &mut events,
            GameEvent::TurnStarted {
                player_id: next_id,
                turn: state.turn,
            },
        );

        let loser_name = Self::name_at(state, index);
        state.message = if lives_left == 0 {
            format!(
                "{loser_name} is out! {}, red or black?",
                Self::name_at(state, next)
            )
        } else {
            format!("{loser_name} loses a life ({lives_left} left). Red or black?")
        };

        Self::settle(state, events)
    }

    /// Drops the whole session and returns to setup.
    pub fn reset(state: &mut GameState) {
        *state = GameState::default();
    }
}

/// `None` when the guess holds. Equal values fail no matter what was called.
pub fn judge(baseline: Card, drawn: Card, guess: Direction) -> Option<FailureReason> {
    let (base, next) = (baseline.value(), drawn.value());
    if next == base {
        return Some(FailureReason::SameValueTie);
    }
    let correct = match guess {
        Direction::Higher => next > base,
        Direction::Lower => next < base,
    };
    if correct {
        None
    } else {
        Some(FailureReason::IncorrectGuess)
    }
}
