//! Card, deck, and money primitives.

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::errors::InvariantViolation;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Suit {
    Heart,
    Diamond,
    Club,
    Spade,
}

impl Suit {
    pub const ALL: [Self; 4] = [Self::Heart, Self::Diamond, Self::Club, Self::Spade];
}

impl fmt::Display for Suit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let repr = match self {
            Self::Heart => "♥",
            Self::Diamond => "♦",
            Self::Club => "♣",
            Self::Spade => "♠",
        };
        write!(f, "{repr}")
    }
}

/// Placeholder for card values. Deuce is 2, ace is 14. The evaluator
/// additionally treats the ace as 1 when checking for wheels.
pub type Value = u8;

/// A card is a tuple of a value (2u8 ..= 14u8) and a suit. Equality is
/// by (value, suit); 52 distinct combinations form the base deck.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Card(pub Value, pub Suit);

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let value = match self.0 {
            14 => "A",
            13 => "K",
            12 => "Q",
            11 => "J",
            v => &v.to_string(),
        };
        write!(f, "{value}{}", self.1)
    }
}

/// Type alias for whole chips. All bets, stacks, and pots are whole
/// chips; if the total money at a table ever surpasses ~4.2 billion we
/// have bigger problems.
pub type Chips = u32;

/// Type alias for player identifiers handed in by the session layer.
pub type PlayerId = String;

/// Type alias for seat positions at the table.
pub type SeatIndex = usize;

/// An ordered 52-card deck with a monotonic deal cursor.
///
/// The shuffle is a pure function of the seed strings: the concatenated
/// seeds are hashed into the RNG state, so the same seeds always yield
/// the same dealing order. Seeds are committed before any card is dealt,
/// which is what makes the shuffle provably fair after the fact.
#[derive(Clone, Debug)]
pub struct Deck {
    cards: [Card; 52],
    deal_idx: usize,
}

impl Default for Deck {
    fn default() -> Self {
        let mut cards = [Card(2, Suit::Heart); 52];
        for (i, value) in (2u8..=14).enumerate() {
            for (j, suit) in Suit::ALL.into_iter().enumerate() {
                cards[4 * i + j] = Card(value, suit);
            }
        }
        Self { cards, deal_idx: 0 }
    }
}

impl Deck {
    /// Deterministically permute the deck from the given seed strings
    /// and reset the deal cursor.
    pub fn shuffle<S: AsRef<str>>(&mut self, seeds: &[S]) {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed.as_ref().as_bytes());
        }
        let digest: [u8; 32] = hasher.finalize().into();
        let mut rng = StdRng::from_seed(digest);
        self.cards.shuffle(&mut rng);
        self.deal_idx = 0;
    }

    /// Deal the next undealt card. Fails once the cursor passes card 52;
    /// a legal 2-9 seat hand never gets close (26 cards max).
    pub fn deal_card(&mut self) -> Result<Card, InvariantViolation> {
        if self.deal_idx >= self.cards.len() {
            return Err(InvariantViolation::DeckOverflow);
        }
        let card = self.cards[self.deal_idx];
        self.deal_idx += 1;
        Ok(card)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.cards.len() - self.deal_idx
    }
}
