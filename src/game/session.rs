use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::ai::{AiAgent, AiConfig, StrategyRegistry};

use super::config::{GameConfig, PlayerSetup};
use super::player::PlayerId;
use super::rules::{GameAction, RuleEngine, RuleError, RuleResolution};
use super::scheduler::{ScheduledAction, ScheduledTransition, Scheduler, Ticket};
use super::state::{GameEvent, GamePhase, GameSnapshot, GameState};

/// What the host needs after a transition: the new view, plus the timer it
/// must arm, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(flatten)]
    pub resolution: RuleResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<ScheduledTransition>,
}

/// Exclusive owner of one game. Human input comes in through `submit`,
/// computer moves and result displays through `fire` once their delay ends.
pub struct GameSession {
    config: GameConfig,
    state: GameState,
    engine: RuleEngine,
    agents: Vec<Option<AiAgent>>,
    strategies: StrategyRegistry,
    scheduler: Scheduler,
    halted: Option<String>,
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new(GameConfig::default())
    }
}

impl GameSession {
    pub fn new(config: GameConfig) -> Self {
        Self::with_registry(config, StrategyRegistry::default())
    }

    pub fn with_registry(config: GameConfig, strategies: StrategyRegistry) -> Self {
        let engine = config.seed.map(RuleEngine::with_seed).unwrap_or_default();
        Self {
            config,
            state: GameState::default(),
            engine,
            agents: Vec::new(),
            strategies,
            scheduler: Scheduler::new(),
            halted: None,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn snapshot(&self) -> GameSnapshot {
        self.state.snapshot()
    }

    pub fn pending(&self) -> Option<&ScheduledTransition> {
        self.scheduler.pending()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn ensure_running(&self) -> Result<(), RuleError> {
        match &self.halted {
            Some(reason) => Err(RuleError::SessionHalted {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn start_game(&mut self, setups: Vec<PlayerSetup>) -> Result<SessionUpdate, RuleError> {
        self.ensure_running()?;
        if setups.len() < self.config.min_players {
            return Err(RuleError::NotEnoughPlayers {
                min: self.config.min_players,
                actual: setups.len(),
            });
        }
        if setups.len() > self.config.max_players {
            return Err(RuleError::TooManyPlayers {
                max: self.config.max_players,
                actual: setups.len(),
            });
        }

        let seats = setups.len();
        let players = setups
            .into_iter()
            .enumerate()
            .map(|(index, setup)| {
                let id = PlayerId::try_from(index).map_err(|_| RuleError::TooManyPlayers {
                    max: PlayerId::MAX as usize + 1,
                    actual: seats,
                })?;
                Ok(setup.into_player(id, &self.config))
            })
            .collect::<Result<Vec<_>, RuleError>>()?;

        let mut agents = Vec::with_capacity(players.len());
        for (index, player) in players.iter().enumerate() {
            let difficulty = match (player.is_computer, player.difficulty) {
                (true, Some(difficulty)) => difficulty,
                (true, None) => self.config.default_difficulty,
                (false, _) => {
                    agents.push(None);
                    continue;
                }
            };
            let ai_config =
                AiConfig::from_difficulty(difficulty).with_thinking(self.config.thinking);
            let strategy = self.strategies.build(difficulty, &ai_config).ok_or(
                RuleError::AiDecisionUnavailable {
                    player_id: player.id,
                    difficulty,
                },
            )?;
            let agent = match self.config.seed {
                Some(seed) => {
                    let seed = seed.wrapping_add(index as u64 + 1);
                    AiAgent::with_seed(ai_config, strategy, seed)
                }
                None => AiAgent::new(ai_config, strategy),
            };
            agents.push(Some(agent));
        }

        let events = match self.engine.start_game(&mut self.state, players) {
            Ok(events) => events,
            Err(error) => return Err(self.reject(error)),
        };
        self.agents = agents;
        Ok(self.after_transition(events))
    }

    /// Human input. Rejected while a computer player owes the decision.
    pub fn submit(&mut self, action: GameAction) -> Result<SessionUpdate, RuleError> {
        self.ensure_running()?;
        if self.state.phase.awaits_decision()
            && self.state.current().map_or(false, |player| player.is_computer)
        {
            let error = RuleError::NotHumanTurn;
            warn!("rejected {}: {error}", action.label());
            return Err(error);
        }
        match self.engine.apply(&mut self.state, action) {
            Ok(events) => Ok(self.after_transition(events)),
            Err(error) => Err(self.reject(error)),
        }
    }

    /// Runs the scheduled transition named by `ticket`. A ticket that was
    /// replaced, cancelled or already fired does nothing.
    pub fn fire(&mut self, ticket: Ticket) -> Result<Option<SessionUpdate>, RuleError> {
        let Some(transition) = self.scheduler.take(ticket) else {
            debug!("ignoring stale ticket {}", ticket.0);
            return Ok(None);
        };
        self.ensure_running()?;

        let result = match transition.action {
            ScheduledAction::ResolveResult => self.engine.resolve_result(&mut self.state),
            ScheduledAction::ComputerMove {
                player_id,
                decision,
            } => self.apply_computer_move(player_id, decision.action),
        };
        match result {
            Ok(events) => Ok(Some(self.after_transition(events))),
            Err(error) => Err(self.reject(error)),
        }
    }

    /// Fires whatever is pending without waiting for its delay.
    pub fn advance(&mut self) -> Result<Option<SessionUpdate>, RuleError> {
        match self.scheduler.pending().map(|pending| pending.ticket) {
            Some(ticket) => self.fire(ticket),
            None => Ok(None),
        }
    }

    /// Back to setup. Cancels any pending timer and clears a halt.
    pub fn reset(&mut self) -> SessionUpdate {
        self.scheduler.cancel();
        RuleEngine::reset(&mut self.state);
        self.agents.clear();
        self.halted = None;
        debug!("session reset");
        SessionUpdate {
            resolution: RuleResolution::new(&self.state, Vec::new()),
            scheduled: None,
        }
    }

    fn apply_computer_move(
        &mut self,
        player_id: PlayerId,
        action: GameAction,
    ) -> Result<Vec<GameEvent>, RuleError> {
        let index = self.state.current_player;
        if self.state.current_id() != Some(player_id) {
            return Err(RuleError::InvalidTransition {
                phase: self.state.phase.clone(),
                action: action.kind(),
            });
        }
        let turn = self.state.turn;
        let events = self.engine.apply(&mut self.state, action)?;
        if let Some(Some(agent)) = self.agents.get_mut(index) {
            agent.note_applied(&action, turn);
        }
        Ok(events)
    }

    fn reject(&mut self, error: RuleError) -> RuleError {
        if error.is_fatal() {
            error!("session halted: {error}");
            self.halted = Some(error.to_string());
            self.scheduler.cancel();
        } else {
            warn!("rejected input: {error}");
        }
        error
    }

    fn after_transition(&mut self, events: Vec<GameEvent>) -> SessionUpdate {
        self.schedule_next();
        SessionUpdate {
            resolution: RuleResolution::new(&self.state, events),
            scheduled: self.scheduler.pending().cloned(),
        }
    }

    /// Arms the single timer the new phase needs, replacing any older one.
    fn schedule_next(&mut self) {
        match self.state.phase {
            GamePhase::ShowingResult { .. } => {
                self.scheduler
                    .schedule(self.config.result_display_ms, ScheduledAction::ResolveResult);
            }
            _ if self.state.phase.awaits_decision() => {
                let index = self.state.current_player;
                let decision = match (self.state.current_id(), self.agents.get_mut(index)) {
                    (Some(player_id), Some(Some(agent))) => agent
                        .decide(&self.state, index, self.config.starting_lives)
                        .map(|decision| (player_id, decision)),
                    _ => None,
                };
                match decision {
                    Some((player_id, decision)) => {
                        self.scheduler.schedule(
                            decision.delay_ms,
                            ScheduledAction::ComputerMove {
                                player_id,
                                decision,
                            },
                        );
                    }
                    None => {
                        self.scheduler.cancel();
                    }
                }
            }
            _ => {
                self.scheduler.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiDifficulty;
    use crate::game::card::{Card, CardColor, Rank, Suit};
    use crate::game::rules::{Direction, KeepChoice};

    fn humans_vs_cpu() -> Vec<PlayerSetup> {
        vec![
            PlayerSetup::human("Ann"),
            PlayerSetup::computer("", AiDifficulty::Hard),
        ]
    }

    fn session(seed: u64) -> GameSession {
        GameSession::new(GameConfig::instant().with_seed(seed))
    }

    #[test]
    fn start_validates_player_count() {
        let mut session = session(1);
        assert!(matches!(
            session.start_game(vec![PlayerSetup::human("solo")]),
            Err(RuleError::NotEnoughPlayers { min: 2, actual: 1 })
        ));
        let crowd = (0..7).map(|_| PlayerSetup::default()).collect();
        assert!(matches!(
            session.start_game(crowd),
            Err(RuleError::TooManyPlayers { max: 6, actual: 7 })
        ));
        assert_eq!(session.state().phase, GamePhase::Setup);
    }

    #[test]
    fn seat_ids_stay_unique_past_the_id_range() {
        let mut session = GameSession::new(GameConfig {
            max_players: 300,
            ..GameConfig::instant()
        });
        let crowd: Vec<_> = (0..257).map(|_| PlayerSetup::default()).collect();
        assert!(matches!(
            session.start_game(crowd),
            Err(RuleError::TooManyPlayers { max: 256, actual: 257 })
        ));
        assert_eq!(session.state().phase, GamePhase::Setup);

        let full: Vec<_> = (0..256).map(|_| PlayerSetup::default()).collect();
        session.start_game(full).expect("256 seats fit the id range");
        let players = &session.state().players;
        assert_eq!(players.get(255).map(|player| player.id), Some(255));
        assert_eq!(players.index_of(0), Some(0));
    }

    #[test]
    fn missing_strategy_fails_the_start() {
        let mut session =
            GameSession::with_registry(GameConfig::instant(), StrategyRegistry::empty());
        let result = session.start_game(humans_vs_cpu());
        assert!(matches!(
            result,
            Err(RuleError::AiDecisionUnavailable {
                player_id: 1,
                difficulty: AiDifficulty::Hard
            })
        ));
    }

    #[test]
    fn human_turn_has_nothing_scheduled() {
        let mut session = session(2);
        let update = session.start_game(humans_vs_cpu()).expect("start");
        assert!(update.scheduled.is_none());
        assert_eq!(update.resolution.state.phase, GamePhase::AwaitingColorGuess);
        assert_eq!(session.state().players.get(1).map(|p| p.name.as_str()), Some("CPU 2"));
    }

    #[test]
    fn human_input_is_refused_while_cpu_acts() {
        let mut session = session(3);
        session
            .start_game(vec![
                PlayerSetup::computer("Bot", AiDifficulty::Easy),
                PlayerSetup::human("Ann"),
            ])
            .expect("start");
        assert!(session.pending().is_some(), "CPU opens the game");
        let before = session.state().clone();
        assert_eq!(
            session
                .submit(GameAction::GuessColor {
                    guess: CardColor::Red
                })
                .err(),
            Some(RuleError::NotHumanTurn)
        );
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn stale_tickets_are_ignored() {
        let mut session = session(4);
        session
            .start_game(vec![
                PlayerSetup::computer("Bot", AiDifficulty::Medium),
                PlayerSetup::human("Ann"),
            ])
            .expect("start");
        let ticket = session.pending().expect("cpu move pending").ticket;
        session.reset();
        assert!(session.pending().is_none());
        assert!(session.fire(ticket).expect("no-op").is_none());
        assert_eq!(session.state().phase, GamePhase::Setup);
    }

    /// Moves `top` to the top of the draw pile, first card drawn first.
    fn stack_deck(session: &mut GameSession, top: &[Card]) {
        let pile = &mut session.state.deck.draw_pile;
        pile.retain(|card| !top.contains(card));
        pile.extend(top.iter().rev().copied());
    }

    #[test]
    fn cpu_decides_when_a_human_miss_is_delegated() {
        let mut session = session(5);
        session.start_game(humans_vs_cpu()).expect("start");
        stack_deck(&mut session, &[Card::new(Rank::Four, Suit::Spades)]);

        let update = session
            .submit(GameAction::GuessColor {
                guess: CardColor::Red,
            })
            .expect("human guess");
        let state = &update.resolution.state;
        assert_eq!(state.phase, GamePhase::AwaitingKeepOrChange);
        assert_eq!(state.turn_owner, Some(0));
        assert_eq!(state.current_player, 1);

        let pending = update.scheduled.expect("CPU keep/change scheduled");
        assert!(matches!(
            pending.action,
            ScheduledAction::ComputerMove { player_id: 1, .. }
        ));
        assert_eq!(
            session
                .submit(GameAction::KeepOrChange {
                    choice: KeepChoice::Keep
                })
                .err(),
            Some(RuleError::NotHumanTurn)
        );

        let after = session
            .fire(pending.ticket)
            .expect("cpu move")
            .expect("ticket was live");
        let state = &after.resolution.state;
        assert_eq!(state.current_player, 0);
        assert_eq!(state.turn_owner, None);
        assert_eq!(state.phase, GamePhase::AwaitingHigherLower);
        assert!(after.scheduled.is_none(), "back to the human");
        assert!(session
            .submit(GameAction::GuessHigherLower {
                guess: Direction::Higher
            })
            .is_ok());
    }

    #[test]
    fn lost_cards_halt_the_session_until_reset() {
        let mut session = session(6);
        session
            .start_game(vec![PlayerSetup::human("Ann"), PlayerSetup::human("Bo")])
            .expect("start");
        session.state.deck.draw_pile.truncate(10);

        let error = session
            .submit(GameAction::GuessColor {
                guess: CardColor::Black,
            })
            .expect_err("cards went missing");
        assert!(error.is_fatal());
        assert!(session.is_halted());
        assert!(matches!(
            session.submit(GameAction::GuessColor {
                guess: CardColor::Black
            }),
            Err(RuleError::SessionHalted { .. })
        ));

        session.reset();
        assert!(!session.is_halted());
        assert!(session
            .start_game(vec![PlayerSetup::human("Ann"), PlayerSetup::human("Bo")])
            .is_ok());
    }

    #[test]
    fn all_cpu_game_runs_to_a_winner() {
        for seed in 0..5 {
            let mut session = session(seed);
            session
                .start_game(vec![
                    PlayerSetup::computer("", AiDifficulty::Easy),
                    PlayerSetup::computer("", AiDifficulty::Medium),
                    PlayerSetup::computer("", AiDifficulty::Hard),
                ])
                .expect("start");

            let mut steps = 0;
            while session.pending().is_some() {
                session.advance().expect("scheduled transition");
                session
                    .state()
                    .integrity_check()
                    .expect("cards stay accounted for");
                steps += 1;
                assert!(steps < 20_000, "game should end");
            }
            let state = session.state();
            assert!(state.is_finished());
            assert_eq!(state.players.eligible_count(), 1);
            let winner = state.winner().expect("winner");
            assert!(state
                .players
                .get(state.players.index_of(winner.winner).expect("winner seated"))
                .map_or(false, |player| player.lives > 0));
        }
    }

    #[test]
    fn cpu_never_plays_more_than_twice_in_a_turn() {
        let mut session = session(11);
        session
            .start_game(vec![
                PlayerSetup::computer("", AiDifficulty::Easy),
                PlayerSetup::computer("", AiDifficulty::Easy),
            ])
            .expect("start");

        let mut plays = 0;
        let mut turn = session.state().turn;
        while session.pending().is_some() {
            let update = session.advance().expect("step").expect("fired");
            if update.resolution.state.turn != turn {
                turn = update.resolution.state.turn;
                plays = 0;
            }
            for event in &update.resolution.events {
                if matches!(event, GameEvent::Played { .. }) {
                    plays += 1;
                }
            }
            assert!(plays <= 2);
        }
    }

    #[test]
    fn failed_guess_waits_for_the_display_timer() {
        let mut session = GameSession::new(GameConfig {
            seed: Some(8),
            thinking: crate::ai::ThinkingTime::instant(),
            ..GameConfig::default()
        });
        session
            .start_game(vec![
                PlayerSetup::computer("", AiDifficulty::Hard),
                PlayerSetup::computer("", AiDifficulty::Hard),
            ])
            .expect("start");

        for _ in 0..10_000 {
            let Some(pending) = session.pending().cloned() else {
                break;
            };
            if matches!(pending.action, ScheduledAction::ResolveResult) {
                assert_eq!(pending.delay_ms, 2500);
                assert!(session.state().pending_failure().is_some());
                let lives: Vec<u8> = session.state().players.iter().map(|p| p.lives).collect();
                session.fire(pending.ticket).expect("resolve");
                let after: u32 = session.state().players.iter().map(|p| p.lives as u32).sum();
                assert_eq!(after + 1, lives.iter().map(|&l| l as u32).sum::<u32>());
                return;
            }
            session.fire(pending.ticket).expect("cpu move");
        }
        panic!("expected a failed guess");
    }
}
