pub mod ai;
pub mod game;
pub mod utils;

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::str::FromStr;

use gloo_timers::future::TimeoutFuture;
use log::{error, LevelFilter};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::js_sys::Function;

pub use ai::{AiAgent, AiConfig, AiDecision, AiDifficulty, AiPersonality, ThinkingTime};
pub use game::{
    Card, CardColor, Deck, Direction, FailureReason, GameAction, GameConfig, GameEvent, GamePhase,
    GameSession, GameSnapshot, GameState, IntegrityError, KeepChoice, PlayChoice, Player,
    PlayerId, PlayerSetup, RuleEngine, RuleError, RuleResolution, SessionUpdate, SoundCue, Ticket,
    VictoryState,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    utils::set_panic_hook();
    utils::init_logging(LevelFilter::Info);
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_choice<T: FromStr>(value: &str, what: &str) -> Result<T, JsValue> {
    T::from_str(value).map_err(|_| JsValue::from_str(&format!("unknown {what}: {value}")))
}

struct Inner {
    session: RefCell<GameSession>,
    listener: RefCell<Option<Function>>,
}

/// Browser handle on one game session. Every method returns the resulting
/// update as JSON; the same JSON also goes to the listener, including updates
/// produced later by computer moves and result timers.
#[wasm_bindgen]
pub struct GameEngine {
    inner: Rc<Inner>,
}

#[wasm_bindgen]
impl GameEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<GameEngine, JsValue> {
        let config = match config_json {
            Some(json) => GameConfig::from_json(&json).map_err(serde_to_js_error)?,
            None => GameConfig::default(),
        };
        Ok(GameEngine {
            inner: Rc::new(Inner {
                session: RefCell::new(GameSession::new(config)),
                listener: RefCell::new(None),
            }),
        })
    }

    /// Called with the JSON of every update. Pass `undefined` to detach.
    pub fn set_listener(&self, listener: Option<Function>) {
        *self.inner.listener.borrow_mut() = listener;
    }

    pub fn start_game_json(&self, players_json: &str) -> Result<String, JsValue> {
        let setups: Vec<PlayerSetup> =
            serde_json::from_str(players_json).map_err(serde_to_js_error)?;
        let update = self
            .inner
            .session
            .borrow_mut()
            .start_game(setups)
            .map_err(to_js_error)?;
        deliver(&self.inner, &update)
    }

    pub fn guess_color(&self, guess: &str) -> Result<String, JsValue> {
        let guess = parse_choice::<CardColor>(guess, "color")?;
        self.submit(GameAction::GuessColor { guess })
    }

    pub fn keep_or_change(&self, choice: &str) -> Result<String, JsValue> {
        let choice = parse_choice::<KeepChoice>(choice, "keep/change choice")?;
        self.submit(GameAction::KeepOrChange { choice })
    }

    pub fn guess_higher_lower(&self, guess: &str) -> Result<String, JsValue> {
        let guess = parse_choice::<Direction>(guess, "direction")?;
        self.submit(GameAction::GuessHigherLower { guess })
    }

    pub fn play_or_pass(&self, choice: &str) -> Result<String, JsValue> {
        let choice = parse_choice::<PlayChoice>(choice, "play/pass choice")?;
        self.submit(GameAction::PlayOrPass { choice })
    }

    /// Any action in its tagged JSON form, e.g. `{"type":"GuessColor","guess":"red"}`.
    pub fn submit_json(&self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.submit(action)
    }

    pub fn reset_game(&self) -> Result<String, JsValue> {
        let update = self.inner.session.borrow_mut().reset();
        deliver(&self.inner, &update)
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.inner.session.borrow().snapshot()).map_err(serde_to_js_error)
    }

    fn submit(&self, action: GameAction) -> Result<String, JsValue> {
        let update = self
            .inner
            .session
            .borrow_mut()
            .submit(action)
            .map_err(to_js_error)?;
        deliver(&self.inner, &update)
    }
}

/// Serializes the update, hands it to the listener and arms the timer it asks for.
fn deliver(inner: &Rc<Inner>, update: &SessionUpdate) -> Result<String, JsValue> {
    let json = serde_json::to_string(update).map_err(serde_to_js_error)?;
    if let Some(transition) = &update.scheduled {
        arm_timer(Rc::downgrade(inner), transition.ticket, transition.delay_ms);
    }
    let listener = inner.listener.borrow().clone();
    if let Some(listener) = listener {
        listener.call1(&JsValue::NULL, &JsValue::from_str(&json))?;
    }
    Ok(json)
}

/// The timer holds only a weak handle and a ticket; if the engine is gone or
/// the ticket was replaced by the time it fires, nothing happens.
fn arm_timer(inner: Weak<Inner>, ticket: Ticket, delay_ms: u32) {
    spawn_local(async move {
        TimeoutFuture::new(delay_ms).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let fired = inner.session.borrow_mut().fire(ticket);
        match fired {
            Ok(Some(update)) => {
                if let Err(err) = deliver(&inner, &update) {
                    error!("listener failed: {err:?}");
                }
            }
            Ok(None) => {}
            Err(err) => error!("scheduled transition failed: {err}"),
        }
    });
}

/// A fresh ordered 52-card deck, for front-end card art preloading.
#[wasm_bindgen(js_name = "createDeck")]
pub fn create_deck() -> Result<JsValue, JsValue> {
    to_value(&*game::FULL_DECK).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_js_error(RuleError::IntegrityViolation { error }))?;
    Ok(())
}
