//! Table settings: blinds, buy-in floor, and pacing.

use serde::{Deserialize, Serialize};

use crate::game::constants::{
    DEFAULT_ACTION_TIME_MS, DEFAULT_BIG_BLIND, DEFAULT_GAME_SPEED_MS, DEFAULT_SHOW_DOWN_TIME_MS,
    DEFAULT_SMALL_BLIND,
};
use crate::game::entities::Chips;
use crate::game::errors::TableError;
use crate::game::hand::HandConfig;

/// Owner-tunable table configuration. Changes requested while a hand is
/// in progress are deferred and take effect between hands, so an active
/// hand always runs under the settings it started with.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableSettings {
    pub small_blind: Chips,
    pub big_blind: Chips,
    /// Smallest stack a player may sit down with.
    pub min_buy_in: Chips,
    pub action_time_ms: u64,
    pub show_down_time_ms: u64,
    pub game_speed_ms: u64,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            small_blind: DEFAULT_SMALL_BLIND,
            big_blind: DEFAULT_BIG_BLIND,
            min_buy_in: 20 * DEFAULT_BIG_BLIND,
            action_time_ms: DEFAULT_ACTION_TIME_MS,
            show_down_time_ms: DEFAULT_SHOW_DOWN_TIME_MS,
            game_speed_ms: DEFAULT_GAME_SPEED_MS,
        }
    }
}

impl TableSettings {
    pub fn validate(&self) -> Result<(), TableError> {
        if self.small_blind == 0 {
            return Err(TableError::InvalidSettings(
                "small blind must be greater than zero".to_string(),
            ));
        }
        if self.big_blind < self.small_blind {
            return Err(TableError::InvalidSettings(
                "big blind cannot be below the small blind".to_string(),
            ));
        }
        if self.min_buy_in < self.big_blind {
            return Err(TableError::InvalidSettings(
                "min buy-in cannot be below the big blind".to_string(),
            ));
        }
        if self.action_time_ms == 0 || self.game_speed_ms == 0 {
            return Err(TableError::InvalidSettings(
                "timings must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The per-hand slice of these settings.
    #[must_use]
    pub fn hand_config(&self) -> HandConfig {
        HandConfig {
            small_blind: self.small_blind,
            big_blind: self.big_blind,
            action_time_ms: self.action_time_ms,
            show_down_time_ms: self.show_down_time_ms,
            game_speed_ms: self.game_speed_ms,
        }
    }
}
