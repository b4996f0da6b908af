//! Table-wide limits and defaults.

use super::entities::Chips;

/// Number of seats at a table. With 9 seats a hand consumes at most
/// 9x2 hole cards + 5 community + 3 burns = 26 of the 52 cards.
pub const MAX_SEATS: usize = 9;

/// Hole cards dealt to each player.
pub const NUM_HOLE_CARDS: usize = 2;

/// Community cards dealt across flop, turn, and river.
pub const NUM_COMMUNITY_CARDS: usize = 5;

pub const DEFAULT_SMALL_BLIND: Chips = 10;
pub const DEFAULT_BIG_BLIND: Chips = 20;

/// Time a player has to act before the auto-action kicks in.
pub const DEFAULT_ACTION_TIME_MS: u64 = 20_000;

/// Reveal delay between settlement and the hand going OVER.
pub const DEFAULT_SHOW_DOWN_TIME_MS: u64 = 6_000;

/// Fixed delay between an action and the turn advancing, and between
/// auto-mode streets. Lets all-in reveals animate client-side.
pub const DEFAULT_GAME_SPEED_MS: u64 = 500;
