//! # Holdem Table
//!
//! An authoritative engine for a multiplayer Texas Hold'em table. The
//! engine owns all money-affecting state: it enforces betting legality,
//! evaluates hands, and resolves pots including partial-all-in side pots.
//!
//! ## Architecture
//!
//! - [`game`]: the per-hand core: deterministic seeded [`game::entities::Deck`],
//!   the 7-card evaluator in [`game::eval`], and the [`game::hand::GameHand`]
//!   state machine that drives betting rounds, turn order, timeouts, and
//!   side-pot settlement.
//! - [`table`]: the session layer: seating, dealer rotation, deferred
//!   requests, the live-table registry, and a tokio actor that serializes
//!   all mutation and runs the periodic schedulers.
//!
//! Every mutating call runs to completion before the next is admitted, so
//! the state machine needs no locks. Delays (action timers, reveal delays,
//! auto-play cadence) are explicit deadlines fired by a periodic driver
//! rather than hidden callbacks.
//!
//! ## Example
//!
//! ```
//! use holdem_table::game::hand::{GameHand, PlayerAction};
//! use holdem_table::table::config::TableSettings;
//! use chrono::Utc;
//!
//! let settings = TableSettings::default();
//! let mut hand = GameHand::new(
//!     "table:hand-1",
//!     vec![("alice".into(), 0, 1000), ("bob".into(), 1, 1000)],
//!     settings.hand_config(),
//!     vec!["public-seed".into(), "hand-seed".into()],
//! );
//! let now = Utc::now();
//! hand.start(now).unwrap();
//! hand.take_action("alice", PlayerAction::Fold, now).unwrap();
//! ```

/// Per-hand core: cards, evaluator, and the hand state machine.
pub mod game;
pub use game::{
    entities::{Card, Chips, Deck, PlayerId, SeatIndex, Suit},
    errors::{ActionError, HandError, InvariantViolation, TableError},
    eval::{HandRank, HandValue, compare},
    hand::{GameHand, HandConfig, HandRound, HandStatus, PlayerAction},
};

/// Session layer: tables, seating, the registry, and the table actor.
pub mod table;
pub use table::{
    actor::{TableActor, TableHandle},
    config::TableSettings,
    registry::TableRegistry,
    table::{StackRequest, Table, TableStatus, TableView},
};
