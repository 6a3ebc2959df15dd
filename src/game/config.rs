//! Session configuration, loadable from JSON with every field optional.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::{AiDifficulty, ThinkingTime};

use super::player::{Player, PlayerId, DEFAULT_STARTING_LIVES};
use super::rules::MIN_PLAYERS;

pub const MAX_PLAYERS: usize = 6;
pub const DEFAULT_RESULT_DISPLAY_MS: u32 = 2500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub starting_lives: u8,
    pub min_players: usize,
    pub max_players: usize,
    /// How long a failed guess stays on screen before the life is taken.
    pub result_display_ms: u32,
    pub default_difficulty: AiDifficulty,
    pub thinking: ThinkingTime,
    /// Fixes shuffles and AI rolls when set.
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            starting_lives: DEFAULT_STARTING_LIVES,
            min_players: MIN_PLAYERS,
            max_players: MAX_PLAYERS,
            result_display_ms: DEFAULT_RESULT_DISPLAY_MS,
            default_difficulty: AiDifficulty::default(),
            thinking: ThinkingTime::default(),
            seed: None,
        }
    }
}

impl GameConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: GameConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_lives == 0 {
            return Err(ConfigError::Invalid("starting_lives must be at least 1".into()));
        }
        if self.min_players < MIN_PLAYERS {
            return Err(ConfigError::Invalid(format!(
                "min_players must be at least {MIN_PLAYERS}"
            )));
        }
        if self.max_players > MAX_PLAYERS {
            return Err(ConfigError::Invalid(format!(
                "max_players must not exceed {MAX_PLAYERS}"
            )));
        }
        if self.max_players < self.min_players {
            return Err(ConfigError::Invalid(
                "max_players must not be below min_players".into(),
            ));
        }
        Ok(())
    }

    /// Config with no thinking pauses, for tests and simulations.
    pub fn instant() -> Self {
        Self {
            result_display_ms: 0,
            thinking: ThinkingTime::instant(),
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// One seat as requested by the host before a game starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSetup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_computer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<AiDifficulty>,
}

impl PlayerSetup {
    pub fn human(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn computer(name: impl Into<String>, difficulty: AiDifficulty) -> Self {
        Self {
            name: name.into(),
            is_computer: true,
            difficulty: Some(difficulty),
        }
    }

    /// Seats the player. Blank names become "Player N" or "CPU N".
    pub fn into_player(self, id: PlayerId, config: &GameConfig) -> Player {
        let seat = id as usize + 1;
        let name = match self.name.trim() {
            "" if self.is_computer => format!("CPU {seat}"),
            "" => format!("Player {seat}"),
            trimmed => trimmed.to_string(),
        };
        if self.is_computer {
            let difficulty = self.difficulty.unwrap_or(config.default_difficulty);
            Player::computer(id, name, config.starting_lives, difficulty)
        } else {
            Player::human(id, name, config.starting_lives)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = GameConfig::from_json("{}").expect("defaults");
        assert_eq!(config, GameConfig::default());
        assert_eq!(config.starting_lives, 4);
        assert_eq!(config.result_display_ms, 2500);
    }

    #[test]
    fn partial_json_overrides_fields() {
        let json = r#"{"starting_lives": 2, "default_difficulty": "hard", "seed": 7}"#;
        let config = GameConfig::from_json(json).expect("valid config");
        assert_eq!(config.starting_lives, 2);
        assert_eq!(config.default_difficulty, AiDifficulty::Hard);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.max_players, MAX_PLAYERS);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            GameConfig::from_json(r#"{"starting_lives": 0}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GameConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn seat_limit_cannot_be_raised_past_six() {
        assert!(matches!(
            GameConfig::from_json(r#"{"max_players": 300}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            GameConfig::from_json(r#"{"max_players": 7}"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(GameConfig::from_json(r#"{"max_players": 6}"#).is_ok());
    }

    #[test]
    fn blank_names_get_seat_defaults() {
        let config = GameConfig::default();
        let human = PlayerSetup::human("  ").into_player(0, &config);
        let cpu = PlayerSetup {
            is_computer: true,
            ..PlayerSetup::default()
        }
        .into_player(2, &config);
        assert_eq!(human.name, "Player 1");
        assert_eq!(cpu.name, "CPU 3");
        assert_eq!(cpu.difficulty, Some(AiDifficulty::Medium));
        assert_eq!(cpu.lives, 4);
    }
}
