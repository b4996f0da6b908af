//! 7-card poker hand evaluation with tiebreak ordering.
//!
//! [`evaluate`] maps 2 hole cards + 5 community cards to a comparable
//! [`HandValue`]. Category checkers run in strict descending strength
//! order and the first match wins, so the result is always the best
//! 5-card hand. The ace plays high everywhere except the wheel
//! (A-2-3-4-5), where it counts as 1 for the straight checks only.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use super::constants::{NUM_COMMUNITY_CARDS, NUM_HOLE_CARDS};
use super::entities::{Card, Suit, Value};
use super::errors::InvariantViolation;

/// The ten hand categories, weakest first so the derived order matches
/// hand strength.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub enum HandRank {
    HighCard,
    OnePair,
    TwoPair,
    ThreeOfAKind,
    Straight,
    Flush,
    FullHouse,
    FourOfAKind,
    StraightFlush,
    RoyalFlush,
}

impl fmt::Display for HandRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::HighCard => "hi",
            Self::OnePair => "1p",
            Self::TwoPair => "2p",
            Self::ThreeOfAKind => "3k",
            Self::Straight => "s8",
            Self::Flush => "fs",
            Self::FullHouse => "fh",
            Self::FourOfAKind => "4k",
            Self::StraightFlush => "sf",
            Self::RoyalFlush => "rf",
        };
        write!(f, "{repr}")
    }
}

/// An evaluated best hand: the category, its tiebreak values in
/// significance order, and which of the 7 input cards contributed.
///
/// Ordering compares `rank` first, then `values` element-wise left to
/// right; provenance indexes never affect comparisons.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandValue {
    pub rank: HandRank,
    pub values: Vec<Value>,
    pub hole_card_indexes: Vec<usize>,
    pub community_card_indexes: Vec<usize>,
}

impl PartialEq for HandValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HandValue {}

impl Ord for HandValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank.cmp(&other.rank).then_with(|| {
            for (a, b) in self.values.iter().zip(&other.values) {
                match a.cmp(b) {
                    Ordering::Equal => {}
                    decided => return decided,
                }
            }
            Ordering::Equal
        })
    }
}

impl PartialOrd for HandValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two optional hand results. A missing result (folded player)
/// sorts as strictly weaker than any evaluated hand.
#[must_use]
pub fn compare(a: Option<&HandValue>, b: Option<&HandValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(b),
    }
}

/// Interim checker result before provenance is resolved.
struct RankResult {
    rank: HandRank,
    values: Vec<Value>,
    // Some ranks need to remember which suit matched.
    suit: Option<Suit>,
}

/// Evaluate the best 5-card hand from exactly 2 hole and 5 community
/// cards.
pub fn evaluate(
    hole_cards: &[Card],
    community_cards: &[Card],
) -> Result<HandValue, InvariantViolation> {
    if hole_cards.len() != NUM_HOLE_CARDS || community_cards.len() != NUM_COMMUNITY_CARDS {
        return Err(InvariantViolation::InvalidCardCount {
            hole: hole_cards.len(),
            community: community_cards.len(),
        });
    }

    let cards: Vec<Card> = hole_cards.iter().chain(community_cards).copied().collect();
    let result = check_straight_flush(&cards)
        .or_else(|| check_four_of_a_kind(&cards))
        .or_else(|| check_full_house(&cards))
        .or_else(|| check_flush(&cards))
        .or_else(|| check_straight(&cards))
        .or_else(|| check_three_of_a_kind(&cards))
        .or_else(|| check_two_pair(&cards))
        .or_else(|| check_one_pair(&cards))
        .unwrap_or_else(|| high_cards(&cards));

    let selected: HashSet<Card> = selected_cards(&cards, &result).into_iter().collect();
    let hole_card_indexes = (0..hole_cards.len())
        .filter(|&i| selected.contains(&hole_cards[i]))
        .collect();
    let community_card_indexes = (0..community_cards.len())
        .filter(|&i| selected.contains(&community_cards[i]))
        .collect();

    let rank = if result.rank == HandRank::StraightFlush && result.values[0] == 14 {
        HandRank::RoyalFlush
    } else {
        result.rank
    };

    Ok(HandValue {
        rank,
        values: result.values,
        hole_card_indexes,
        community_card_indexes,
    })
}

const fn suit_idx(suit: Suit) -> usize {
    match suit {
        Suit::Heart => 0,
        Suit::Diamond => 1,
        Suit::Club => 2,
        Suit::Spade => 3,
    }
}

fn value_counts(cards: &[Card]) -> [u8; 15] {
    let mut counts = [0u8; 15];
    for card in cards {
        counts[card.0 as usize] += 1;
    }
    counts
}

fn check_straight_flush(cards: &[Card]) -> Option<RankResult> {
    let mut has = [[false; 15]; 4];
    for card in cards {
        has[suit_idx(card.1)][card.0 as usize] = true;
        if card.0 == 14 {
            // Ace plays low for the wheel.
            has[suit_idx(card.1)][1] = true;
        }
    }
    for suit in Suit::ALL {
        let s = suit_idx(suit);
        for top in (5..=14usize).rev() {
            if (top - 4..=top).all(|v| has[s][v]) {
                return Some(RankResult {
                    rank: HandRank::StraightFlush,
                    values: vec![top as Value],
                    suit: Some(suit),
                });
            }
        }
    }
    None
}

fn check_four_of_a_kind(cards: &[Card]) -> Option<RankResult> {
    let counts = value_counts(cards);
    let quad = (2u8..=14).rev().find(|&v| counts[v as usize] == 4)?;
    let kicker = cards
        .iter()
        .map(|c| c.0)
        .filter(|&v| v != quad)
        .max()
        .unwrap_or(0);
    Some(RankResult {
        rank: HandRank::FourOfAKind,
        values: vec![quad, kicker],
        suit: None,
    })
}

fn check_full_house(cards: &[Card]) -> Option<RankResult> {
    let counts = value_counts(cards);
    let trip = (2u8..=14).rev().find(|&v| counts[v as usize] == 3)?;
    let pair = (2..=14)
        .rev()
        .find(|&v| v != trip && counts[v as usize] >= 2)?;
    Some(RankResult {
        rank: HandRank::FullHouse,
        values: vec![trip, pair],
        suit: None,
    })
}

fn check_flush(cards: &[Card]) -> Option<RankResult> {
    let mut suit_counts = [0u8; 4];
    for card in cards {
        suit_counts[suit_idx(card.1)] += 1;
    }
    let suit = Suit::ALL
        .into_iter()
        .find(|&s| suit_counts[suit_idx(s)] >= 5)?;
    let mut values: Vec<Value> = cards.iter().filter(|c| c.1 == suit).map(|c| c.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    values.truncate(5);
    Some(RankResult {
        rank: HandRank::Flush,
        values,
        suit: Some(suit),
    })
}

fn check_straight(cards: &[Card]) -> Option<RankResult> {
    let mut has = [false; 15];
    for card in cards {
        has[card.0 as usize] = true;
        if card.0 == 14 {
            has[1] = true;
        }
    }
    for top in (5..=14usize).rev() {
        if (top - 4..=top).all(|v| has[v]) {
            return Some(RankResult {
                rank: HandRank::Straight,
                values: vec![top as Value],
                suit: None,
            });
        }
    }
    None
}

fn check_three_of_a_kind(cards: &[Card]) -> Option<RankResult> {
    let counts = value_counts(cards);
    // A second triple or an extra pair would have matched full house.
    let trip = (2u8..=14).rev().find(|&v| counts[v as usize] == 3)?;
    let mut kickers: Vec<Value> = cards.iter().map(|c| c.0).filter(|&v| v != trip).collect();
    kickers.sort_unstable_by(|a, b| b.cmp(a));
    kickers.truncate(2);
    let mut values = vec![trip];
    values.extend(kickers);
    Some(RankResult {
        rank: HandRank::ThreeOfAKind,
        values,
        suit: None,
    })
}

fn check_two_pair(cards: &[Card]) -> Option<RankResult> {
    let counts = value_counts(cards);
    let pairs: Vec<Value> = (2u8..=14).rev().filter(|&v| counts[v as usize] == 2).collect();
    if pairs.len() < 2 {
        return None;
    }
    let (top, second) = (pairs[0], pairs[1]);
    let kicker = cards
        .iter()
        .map(|c| c.0)
        .filter(|&v| v != top && v != second)
        .max()
        .unwrap_or(0);
    Some(RankResult {
        rank: HandRank::TwoPair,
        values: vec![top, second, kicker],
        suit: None,
    })
}

fn check_one_pair(cards: &[Card]) -> Option<RankResult> {
    let counts = value_counts(cards);
    let pair = (2u8..=14).rev().find(|&v| counts[v as usize] == 2)?;
    let mut kickers: Vec<Value> = cards.iter().map(|c| c.0).filter(|&v| v != pair).collect();
    kickers.sort_unstable_by(|a, b| b.cmp(a));
    kickers.truncate(3);
    let mut values = vec![pair];
    values.extend(kickers);
    Some(RankResult {
        rank: HandRank::OnePair,
        values,
        suit: None,
    })
}

fn high_cards(cards: &[Card]) -> RankResult {
    let mut values: Vec<Value> = cards.iter().map(|c| c.0).collect();
    values.sort_unstable_by(|a, b| b.cmp(a));
    values.truncate(5);
    RankResult {
        rank: HandRank::HighCard,
        values,
        suit: None,
    }
}

/// Pick the 5 cards that realize the checker's result, for provenance.
fn selected_cards(cards: &[Card], result: &RankResult) -> Vec<Card> {
    let in_run = |v: Value, top: Value| (top - 4..=top).contains(&v) || (top == 5 && v == 14);
    match result.rank {
        HandRank::StraightFlush | HandRank::RoyalFlush => {
            let top = result.values[0];
            cards
                .iter()
                .filter(|c| Some(c.1) == result.suit && in_run(c.0, top))
                .copied()
                .collect()
        }
        HandRank::FourOfAKind => {
            let mut selected: Vec<Card> =
                cards.iter().filter(|c| c.0 == result.values[0]).copied().collect();
            if let Some(kicker) = cards.iter().find(|c| c.0 == result.values[1]) {
                selected.push(*kicker);
            }
            selected
        }
        HandRank::FullHouse => {
            let mut selected: Vec<Card> =
                cards.iter().filter(|c| c.0 == result.values[0]).copied().collect();
            selected.extend(
                cards
                    .iter()
                    .filter(|c| c.0 == result.values[1])
                    .take(2)
                    .copied(),
            );
            selected
        }
        HandRank::Flush => {
            let mut suited: Vec<Card> = cards
                .iter()
                .filter(|c| Some(c.1) == result.suit)
                .copied()
                .collect();
            suited.sort_unstable_by(|a, b| b.0.cmp(&a.0));
            suited.truncate(5);
            suited
        }
        HandRank::Straight => {
            let top = result.values[0];
            let mut seen = [false; 15];
            let mut selected = Vec::with_capacity(5);
            for card in cards.iter().filter(|c| in_run(c.0, top)) {
                if !seen[card.0 as usize] {
                    seen[card.0 as usize] = true;
                    selected.push(*card);
                }
            }
            selected
        }
        HandRank::TwoPair => {
            let mut selected: Vec<Card> = cards
                .iter()
                .filter(|c| c.0 == result.values[0] || c.0 == result.values[1])
                .copied()
                .collect();
            if let Some(kicker) = cards.iter().find(|c| c.0 == result.values[2]) {
                selected.push(*kicker);
            }
            selected
        }
        HandRank::ThreeOfAKind | HandRank::OnePair | HandRank::HighCard => cards
            .iter()
            .filter(|c| result.values.contains(&c.0))
            .copied()
            .collect(),
    }
}
