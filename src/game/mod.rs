//! Hold'em hand engine: cards, evaluation, and the hand state machine.
//!
//! Dependency order within the module is leaves-first: [`entities`]
//! (cards and chips) and [`errors`] have no siblings, [`eval`] depends on
//! [`entities`], and [`hand`] orchestrates all of them for one deal.

pub mod constants;
pub mod entities;
pub mod errors;
pub mod eval;
pub mod hand;
