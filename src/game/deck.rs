use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::card::{Card, Rank, Suit};

pub const DECK_SIZE: usize = 52;

/// Ordered reference deck every new game is shuffled from.
pub static FULL_DECK: Lazy<Vec<Card>> = Lazy::new(create_deck);

/// Every (rank, suit) pair exactly once, Hearts 2..A first, Spades last.
pub fn create_deck() -> Vec<Card> {
    let mut cards = Vec::with_capacity(DECK_SIZE);
    for suit in Suit::ALL {
        for rank in Rank::ALL {
            cards.push(Card::new(rank, suit));
        }
    }
    cards
}

/// Returns a uniformly shuffled copy; the caller's slice is left untouched.
pub fn shuffle<R: Rng + ?Sized>(cards: &[Card], rng: &mut R) -> Vec<Card> {
    let mut shuffled = cards.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawOutcome {
    pub card: Card,
    /// Number of discarded cards shuffled back in to make this draw possible.
    pub reshuffled: Option<usize>,
}

/// Draw pile plus discard pile. The card on display lives in `GameState`,
/// so it can never be swept into a reshuffle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deck {
    #[serde(default)]
    pub draw_pile: Vec<Card>,
    #[serde(default)]
    pub discard_pile: Vec<Card>,
}

impl Deck {
    pub fn new_shuffled<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            draw_pile: shuffle(&FULL_DECK, rng),
            discard_pile: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.draw_pile.len()
    }

    pub fn discarded(&self) -> usize {
        self.discard_pile.len()
    }

    pub fn discard(&mut self, card: Card) {
        self.discard_pile.push(card);
    }

    /// Pops the top card, refilling from the discard pile first when the draw
    /// pile is empty. Returns `None` without touching anything when both piles
    /// are empty.
    pub fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<DrawOutcome> {
        let mut reshuffled = None;
        if self.draw_pile.is_empty() {
            if self.discard_pile.is_empty() {
                return None;
            }
            let pool = std::mem::take(&mut self.discard_pile);
            reshuffled = Some(pool.len());
            self.draw_pile = shuffle(&pool, rng);
        }

        let card = self.draw_pile.pop()?;
        Some(DrawOutcome { card, reshuffled })
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.draw_pile.iter().chain(self.discard_pile.iter())
    }
}
