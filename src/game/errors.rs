//! Error taxonomy for the hand engine and the table layer.
//!
//! `InvariantViolation` indicates a programming defect (deck overflow,
//! bad card counts, settlement leftovers): fatal, logged, never silently
//! swallowed. `ActionError` is a rejected player action: surfaced to the
//! caller with a descriptive reason and guaranteed not to have mutated
//! hand state. Stale timer callbacks are not errors at all: they
//! re-validate state and no-op.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::entities::{Chips, PlayerId};

/// A broken engine invariant. Any of these reaching a caller is a bug.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum InvariantViolation {
    #[error("deck overflow: all 52 cards have been dealt")]
    DeckOverflow,
    #[error("hand evaluation needs 2 hole + 5 community cards, got {hole} + {community}")]
    InvalidCardCount { hole: usize, community: usize },
    #[error("settlement left ${amount} unclaimed in the pot")]
    SettlementLeftover { amount: Chips },
}

/// A player action rejected by the betting/turn rules.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum ActionError {
    #[error("the hand is not accepting actions")]
    HandNotPlaying,
    #[error("the hand is over")]
    HandOver,
    #[error("player {0} is not in this hand")]
    UnknownPlayer(PlayerId),
    #[error("not your turn")]
    OutOfTurn,
    #[error("can't act while folded or all-in")]
    PlayerNotPlaying,
    #[error("bet is below the current wager of ${betting}")]
    BetTooLow { betting: Chips },
    #[error("raise must be at least ${min_raise} over the current wager")]
    RaiseTooSmall { min_raise: Chips },
}

/// Any failure a hand operation can produce.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum HandError {
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Failures of table-level operations (seating, lifecycle, routing).
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum TableError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("player {0} has not joined this table")]
    NotJoined(PlayerId),
    #[error("only the table owner can do that")]
    NotOwner,
    #[error("the table is no longer running")]
    TableClosed,
    #[error("invalid seat index")]
    InvalidSeat,
    #[error("this seat is already taken")]
    SeatTaken,
    #[error("player has no seat")]
    NoSeat,
    #[error("buy-in amount is insufficient")]
    BuyInTooLow,
    #[error("name cannot be empty")]
    EmptyName,
    #[error("name {0} is already taken")]
    NameTaken(String),
    #[error("need 2+ ready players to start")]
    NotEnoughPlayers,
    #[error("a hand is already in progress")]
    HandInProgress,
    #[error("no hand is in progress")]
    NoHand,
    #[error("stack amount must be greater than zero")]
    InvalidStackAmount,
    #[error(transparent)]
    Hand(#[from] HandError),
}

impl From<ActionError> for TableError {
    fn from(value: ActionError) -> Self {
        Self::Hand(HandError::Action(value))
    }
}

impl From<InvariantViolation> for TableError {
    fn from(value: InvariantViolation) -> Self {
        Self::Hand(HandError::Invariant(value))
    }
}
