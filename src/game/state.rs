use std::collections::HashSet;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::card::{Card, CardColor};
use super::deck::{Deck, DECK_SIZE};
use super::player::{Player, PlayerId, PlayerRegistry};
use super::rules::{Direction, RuleError};

/// Why a higher/lower guess failed. Both reasons cost the guesser one life.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    IncorrectGuess,
    SameValueTie,
}

/// Game phases. `Setup` is initial; `GameOver` only exits through a reset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GamePhase {
    Setup,
    AwaitingColorGuess,
    AwaitingKeepOrChange,
    AwaitingHigherLower,
    PlayOrPass,
    /// Failed guess on display; the life is taken once the display delay ends.
    ShowingResult {
        player_index: usize,
        reason: FailureReason,
    },
    GameOver {
        winner: PlayerId,
    },
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Setup
    }
}

impl GamePhase {
    /// Phases in which a player (human or computer) owes a decision.
    pub fn awaits_decision(&self) -> bool {
        matches!(
            self,
            GamePhase::AwaitingColorGuess
                | GamePhase::AwaitingKeepOrChange
                | GamePhase::AwaitingHigherLower
                | GamePhase::PlayOrPass
        )
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GamePhase::Setup => "setup",
            GamePhase::AwaitingColorGuess => "awaiting a color guess",
            GamePhase::AwaitingKeepOrChange => "awaiting keep or change",
            GamePhase::AwaitingHigherLower => "awaiting a higher/lower guess",
            GamePhase::PlayOrPass => "awaiting play or pass",
            GamePhase::ShowingResult { .. } => "showing a result",
            GamePhase::GameOver { .. } => "game over",
        };
        f.write_str(name)
    }
}

/// Feedback hooks for the presentation layer. The core only says which one happened.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SoundCue {
    Button,
    Flip,
    Correct,
    Incorrect,
    Start,
    Win,
}

/// Game event stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum GameEvent {
    GameStarted {
        players: Vec<PlayerId>,
    },
    DeckReshuffled {
        cards: usize,
    },
    CardDrawn {
        card: Card,
    },
    ColorGuessed {
        player_id: PlayerId,
        guess: CardColor,
        card: Card,
        correct: bool,
    },
    DecisionDelegated {
        turn_owner: PlayerId,
        decider: PlayerId,
    },
    CardKept {
        player_id: PlayerId,
        card: Card,
    },
    CardChanged {
        player_id: PlayerId,
        discarded: Card,
        card: Card,
    },
    TurnOwnerRestored {
        player_id: PlayerId,
    },
    HigherLowerGuessed {
        player_id: PlayerId,
        guess: Direction,
        baseline: Card,
        drawn: Card,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureReason>,
    },
    Played {
        player_id: PlayerId,
    },
    Passed {
        player_id: PlayerId,
        next_player: PlayerId,
    },
    LifeLost {
        player_id: PlayerId,
        lives_left: u8,
        reason: FailureReason,
    },
    PlayerEliminated {
        player_id: PlayerId,
    },
    TurnStarted {
        player_id: PlayerId,
        turn: u32,
    },
    GameWon {
        winner: PlayerId,
    },
}

impl GameEvent {
    pub fn sound_cues(&self) -> &'static [SoundCue] {
        match self {
            GameEvent::GameStarted { .. } => &[SoundCue::Start],
            GameEvent::CardDrawn { .. } => &[SoundCue::Flip],
            GameEvent::ColorGuessed { correct: true, .. } => &[SoundCue::Button, SoundCue::Correct],
            GameEvent::ColorGuessed { correct: false, .. } => {
                &[SoundCue::Button, SoundCue::Incorrect]
            }
            GameEvent::HigherLowerGuessed { failure: None, .. } => {
                &[SoundCue::Button, SoundCue::Correct]
            }
            GameEvent::HigherLowerGuessed { failure: Some(_), .. } => {
                &[SoundCue::Button, SoundCue::Incorrect]
            }
            GameEvent::CardKept { .. }
            | GameEvent::CardChanged { .. }
            | GameEvent::Played { .. }
            | GameEvent::Passed { .. } => &[SoundCue::Button],
            GameEvent::GameWon { .. } => &[SoundCue::Win],
            GameEvent::DeckReshuffled { .. }
            | GameEvent::DecisionDelegated { .. }
            | GameEvent::TurnOwnerRestored { .. }
            | GameEvent::LifeLost { .. }
            | GameEvent::PlayerEliminated { .. }
            | GameEvent::TurnStarted { .. } => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VictoryState {
    pub winner: PlayerId,
    pub name: String,
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum IntegrityError {
    #[error("expected {expected} cards in play, found {actual}")]
    CardCountMismatch { expected: usize, actual: usize },
    #[error("{card} appears more than once")]
    DuplicateCard { card: Card },
    #[error("player index {index} is out of range")]
    InvalidPlayerIndex { index: usize },
    #[error("no card on the table")]
    NoCardOnTable,
}

/// Whole-session state. Owned by the rule engine, read by everyone else.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    #[serde(default)]
    pub players: PlayerRegistry,
    #[serde(default)]
    pub deck: Deck,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_card: Option<Card>,
    pub current_player: usize,
    /// Set only between an incorrect color guess and the keep/change decision
    /// that follows it; holds the index of the player whose life is at stake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_owner: Option<usize>,
    pub phase: GamePhase,
    pub turn: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<GameEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VictoryState>,
}

impl GameState {
    pub fn new(players: Vec<Player>, deck: Deck) -> Self {
        Self {
            players: PlayerRegistry::new(players),
            deck,
            current_card: None,
            current_player: 0,
            turn_owner: None,
            phase: GamePhase::AwaitingColorGuess,
            turn: 1,
            message: String::new(),
            event_log: Vec::new(),
            outcome: None,
        }
    }

    pub fn with_phase(mut self, phase: GamePhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn record_event(&mut self, event: GameEvent) {
        self.event_log.push(event);
    }

    pub fn current(&self) -> Option<&Player> {
        self.players.get(self.current_player)
    }

    pub fn current_id(&self) -> Option<PlayerId> {
        self.current().map(|player| player.id)
    }

    pub fn player_id_at(&self, index: usize) -> Option<PlayerId> {
        self.players.get(index).map(|player| player.id)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, GamePhase::GameOver { .. })
    }

    pub fn winner(&self) -> Option<&VictoryState> {
        self.outcome.as_ref()
    }

    pub fn pending_failure(&self) -> Option<FailureReason> {
        match self.phase {
            GamePhase::ShowingResult { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Draws the next card onto the table. The previous card goes to the
    /// discard pile only after the draw, so it is never part of a reshuffle.
    pub fn draw_to_table<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<(Card, Vec<GameEvent>), RuleError> {
        let outcome = self.deck.draw(rng).ok_or(RuleError::DeckExhausted)?;

        let mut events = Vec::new();
        if let Some(cards) = outcome.reshuffled {
            events.push(GameEvent::DeckReshuffled { cards });
        }
        if let Some(previous) = self.current_card.replace(outcome.card) {
            self.deck.discard(previous);
        }
        events.push(GameEvent::CardDrawn { card: outcome.card });
        Ok((outcome.card, events))
    }

    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        if self.phase == GamePhase::Setup {
            return Ok(());
        }

        if self.current_player >= self.players.len() {
            return Err(IntegrityError::InvalidPlayerIndex {
                index: self.current_player,
            });
        }
        if let Some(index) = self.turn_owner {
            if index >= self.players.len() {
                return Err(IntegrityError::InvalidPlayerIndex { index });
            }
        }

        let mut seen = HashSet::with_capacity(DECK_SIZE);
        for card in self.deck.cards().chain(self.current_card.iter()) {
            if !seen.insert(*card) {
                return Err(IntegrityError::DuplicateCard { card: *card });
            }
        }
        if seen.len() != DECK_SIZE {
            return Err(IntegrityError::CardCountMismatch {
                expected: DECK_SIZE,
                actual: seen.len(),
            });
        }

        Ok(())
    }

    /// Read-only view handed to the presentation layer. The draw pile order
    /// stays hidden; only its size is exposed.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            phase: self.phase.clone(),
            players: self.players.iter().cloned().collect(),
            current_player: self.current_player,
            turn_owner: self.turn_owner,
            current_card: self.current_card,
            discard_pile: self.deck.discard_pile.clone(),
            deck_remaining: self.deck.remaining(),
            pending_failure: self.pending_failure(),
            turn: self.turn,
            message: self.message.clone(),
            winner: self.outcome.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSnapshot {
    pub phase: GamePhase,
    pub players: Vec<Player>,
    pub current_player: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_owner: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_card: Option<Card>,
    pub discard_pile: Vec<Card>,
    pub deck_remaining: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_failure: Option<FailureReason>,
    pub turn: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<VictoryState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::deck::create_deck;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn fresh_state() -> GameState {
        let players = vec![Player::human(0, "Ann", 4), Player::human(1, "Bo", 4)];
        GameState::new(
            players,
            Deck {
                draw_pile: create_deck(),
                discard_pile: Vec::new(),
            },
        )
    }

    #[test]
    fn drawing_keeps_all_cards_accounted_for() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut state = fresh_state();
        for _ in 0..150 {
            state.draw_to_table(&mut rng).expect("draw should succeed");
            state.integrity_check().expect("52 unique cards in play");
        }
    }

    #[test]
    fn reshuffle_never_includes_the_card_on_display() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut state = fresh_state();
        let all = create_deck();
        state.current_card = Some(all[51]);
        state.deck.draw_pile.clear();
        state.deck.discard_pile = all[..51].to_vec();

        let (card, events) = state.draw_to_table(&mut rng).expect("reshuffle then draw");
        assert_ne!(card, all[51]);
        assert!(events.contains(&GameEvent::DeckReshuffled { cards: 51 }));
        assert_eq!(state.deck.discard_pile, vec![all[51]]);
        assert_eq!(state.deck.remaining(), 50);
        state.integrity_check().expect("invariant holds after reshuffle");
    }

    #[test]
    fn duplicate_cards_are_reported() {
        let mut state = fresh_state();
        state.current_card = state.deck.draw_pile.last().copied();
        assert!(matches!(
            state.integrity_check(),
            Err(IntegrityError::DuplicateCard { .. })
        ));
    }

    #[test]
    fn snapshot_hides_draw_order() {
        let state = fresh_state();
        let json = serde_json::to_value(state.snapshot()).expect("snapshot serializes");
        assert_eq!(json["deck_remaining"], 52);
        assert!(json.get("deck").is_none());
        assert_eq!(json["phase"]["type"], "AwaitingColorGuess");
    }
}
