use serde::{Deserialize, Serialize};

use crate::ai::AiDifficulty;

/// Player identifier, stable for the lifetime of a game.
pub type PlayerId = u8;

pub const DEFAULT_STARTING_LIVES: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub lives: u8,
    #[serde(default)]
    pub is_computer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<AiDifficulty>,
}

impl Player {
    pub fn human(id: PlayerId, name: impl Into<String>, lives: u8) -> Self {
        Self {
            id,
            name: name.into(),
            lives,
            is_computer: false,
            difficulty: None,
        }
    }

    pub fn computer(
        id: PlayerId,
        name: impl Into<String>,
        lives: u8,
        difficulty: AiDifficulty,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            lives,
            is_computer: true,
            difficulty: Some(difficulty),
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.lives > 0
    }

    /// Eliminated players stay in the registry with zero lives.
    pub fn is_eliminated(&self) -> bool {
        self.lives == 0
    }

    /// Removes one life and returns what is left.
    pub fn lose_life(&mut self) -> u8 {
        self.lives = self.lives.saturating_sub(1);
        self.lives
    }
}

/// Seating order of a game. Players are never removed, only eliminated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PlayerRegistry {
    players: Vec<Player>,
}

impl PlayerRegistry {
    pub fn new(players: Vec<Player>) -> Self {
        Self { players }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Player> {
        self.players.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Player> {
        self.players.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|player| player.id == id)
    }

    pub fn eligible_count(&self) -> usize {
        self.players.iter().filter(|player| player.is_eligible()).count()
    }

    /// Next index after `from`, wrapping around, whose player still has lives.
    /// `from` itself is considered last, so a lone survivor finds itself.
    pub fn next_eligible(&self, from: usize) -> Option<usize> {
        let count = self.players.len();
        if count == 0 {
            return None;
        }
        (1..=count)
            .map(|offset| (from + offset) % count)
            .find(|&index| self.players[index].is_eligible())
    }

    /// The sole player left with lives, if exactly one remains.
    pub fn check_winner(&self) -> Option<&Player> {
        let mut eligible = self.players.iter().filter(|player| player.is_eligible());
        match (eligible.next(), eligible.next()) {
            (Some(winner), None) => Some(winner),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(lives: &[u8]) -> PlayerRegistry {
        PlayerRegistry::new(
            lives
                .iter()
                .enumerate()
                .map(|(i, &l)| Player::human(i as PlayerId, format!("P{}", i + 1), l))
                .collect(),
        )
    }

    #[test]
    fn next_eligible_skips_eliminated_players() {
        let players = registry(&[4, 0, 2, 0]);
        assert_eq!(players.next_eligible(0), Some(2));
        assert_eq!(players.next_eligible(2), Some(0));
        assert_eq!(players.next_eligible(1), Some(2));
    }

    #[test]
    fn next_eligible_wraps_back_to_lone_survivor() {
        let players = registry(&[0, 3, 0]);
        assert_eq!(players.next_eligible(1), Some(1));
        assert_eq!(registry(&[0, 0]).next_eligible(0), None);
    }

    #[test]
    fn winner_only_when_one_player_remains() {
        assert!(registry(&[1, 1, 0]).check_winner().is_none());
        let players = registry(&[0, 2, 0]);
        let winner = players.check_winner().expect("one survivor");
        assert_eq!(winner.id, 1);
        assert!(registry(&[0, 0]).check_winner().is_none());
    }

    #[test]
    fn eliminated_players_stay_registered() {
        let mut players = registry(&[1, 4]);
        let remaining = players.get_mut(0).expect("player 0").lose_life();
        assert_eq!(remaining, 0);
        assert_eq!(players.len(), 2);
        assert!(players.get(0).expect("still present").is_eliminated());
        assert_eq!(players.next_eligible(1), Some(1));
    }
}
