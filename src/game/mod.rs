//! Game core: cards, the deck, players, the turn state machine and the
//! session that drives it.

pub mod card;
pub mod config;
pub mod deck;
pub mod player;
pub mod rules;
pub mod scheduler;
pub mod session;
pub mod state;

pub use card::{Card, CardColor, Rank, Suit};
pub use config::{ConfigError, GameConfig, PlayerSetup, MAX_PLAYERS};
pub use deck::{create_deck, shuffle, Deck, DrawOutcome, DECK_SIZE, FULL_DECK};
pub use player::{Player, PlayerId, PlayerRegistry, DEFAULT_STARTING_LIVES};
pub use rules::{
    judge, ActionKind, Direction, GameAction, KeepChoice, PlayChoice, RuleEngine, RuleError,
    RuleResolution, MIN_PLAYERS,
};
pub use scheduler::{ScheduledAction, ScheduledTransition, Scheduler, Ticket};
pub use session::{GameSession, SessionUpdate};
pub use state::{
    FailureReason, GameEvent, GamePhase, GameSnapshot, GameState, IntegrityError, SoundCue,
    VictoryState,
};
