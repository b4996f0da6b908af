//! A table: roster, seats, dealer rotation, and the hand lifecycle.
//!
//! The table is the seam between sessions and the hand engine. While a
//! hand is in progress every structural request (seating, leaving, stack
//! changes, settings, stopping) is deferred into a request queue and
//! applied between hands, so the hand's participant list and stacks are
//! immutable for its whole lifetime. Stacks are copied into the hand at
//! deal time and copied back when it finishes.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::game::constants::MAX_SEATS;
use crate::game::entities::{Card, Chips, PlayerId, SeatIndex};
use crate::game::errors::TableError;
use crate::game::hand::{GameHand, HandStatus, HandView, PlayerAction};

use super::config::TableSettings;

/// Table lifecycle. A PAUSED table freezes all deadlines in the live
/// hand; RESUME re-arms them.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum TableStatus {
    Stopped,
    Paused,
    Playing,
}

/// A player on the roster. Seated or not, their chips live here between
/// hands.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TablePlayer {
    pub id: PlayerId,
    pub name: String,
    pub stack: Chips,
    pub total_buy_in: Chips,
}

/// A stack change requested by a player, applied only between hands.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StackRequest {
    /// Add chips on top of the current stack (a rebuy).
    Add(Chips),
    /// Replace the stack outright.
    Set(Chips),
}

/// Archive entry for a finished hand.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandRecord {
    pub id: String,
    pub winners: BTreeMap<PlayerId, Chips>,
    pub board: Vec<Card>,
    pub finished_at: DateTime<Utc>,
}

/// Structural requests queued while a hand is in progress.
#[derive(Clone, Debug, Default)]
struct DeferredRequests {
    seat_in: Vec<(PlayerId, SeatIndex)>,
    seat_out: Vec<PlayerId>,
    leave: Vec<PlayerId>,
    stack: Vec<(PlayerId, StackRequest)>,
    settings: Option<TableSettings>,
    stop: bool,
}

pub struct Table {
    pub id: String,
    pub owner_id: PlayerId,
    pub status: TableStatus,
    settings: TableSettings,
    players: HashMap<PlayerId, TablePlayer>,
    seats: Vec<Option<PlayerId>>,
    dealer_seat: SeatIndex,
    /// Public seed committed at table creation; combined with a fresh
    /// per-hand seed for every shuffle.
    seed: String,
    hand: Option<GameHand>,
    requests: DeferredRequests,
    completed_hands: Vec<HandRecord>,
    is_dirty: bool,
    pub last_active: DateTime<Utc>,
}

impl Table {
    pub fn new(
        id: &str,
        owner_id: &str,
        settings: TableSettings,
        now: DateTime<Utc>,
    ) -> Result<Self, TableError> {
        settings.validate()?;
        Ok(Self {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
            status: TableStatus::Stopped,
            settings,
            players: HashMap::new(),
            seats: vec![None; MAX_SEATS],
            dealer_seat: 0,
            seed: Uuid::new_v4().to_string(),
            hand: None,
            requests: DeferredRequests::default(),
            completed_hands: Vec::new(),
            is_dirty: true,
            last_active: now,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &TableSettings {
        &self.settings
    }

    #[must_use]
    pub fn hand(&self) -> Option<&GameHand> {
        self.hand.as_ref()
    }

    #[must_use]
    pub fn player(&self, player_id: &str) -> Option<&TablePlayer> {
        self.players.get(player_id)
    }

    #[must_use]
    pub fn seat_of(&self, player_id: &str) -> Option<SeatIndex> {
        self.seats
            .iter()
            .position(|s| s.as_deref() == Some(player_id))
    }

    // ---- roster ----

    /// Join the roster with a starting stack. Idempotent for a player
    /// who already joined.
    pub fn join(
        &mut self,
        player_id: &str,
        name: &str,
        buy_in: Chips,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        if self.players.contains_key(player_id) {
            return Ok(());
        }
        if name.trim().is_empty() {
            return Err(TableError::EmptyName);
        }
        if self.players.values().any(|p| p.name == name) {
            return Err(TableError::NameTaken(name.to_string()));
        }
        if buy_in < self.settings.min_buy_in {
            return Err(TableError::BuyInTooLow);
        }
        self.players.insert(
            player_id.to_string(),
            TablePlayer {
                id: player_id.to_string(),
                name: name.to_string(),
                stack: buy_in,
                total_buy_in: buy_in,
            },
        );
        self.touch(now);
        Ok(())
    }

    /// Leave the table entirely. Deferred while the player is in a live
    /// hand; their seat and roster entry go away between hands.
    pub fn leave(&mut self, player_id: &str, now: DateTime<Utc>) -> Result<(), TableError> {
        if !self.players.contains_key(player_id) {
            return Err(TableError::NotJoined(player_id.to_string()));
        }
        if self.in_live_hand(player_id) {
            self.requests.leave.push(player_id.to_string());
        } else {
            self.apply_leave(player_id);
        }
        self.touch(now);
        Ok(())
    }

    // ---- seating ----

    pub fn request_seat(
        &mut self,
        player_id: &str,
        seat: SeatIndex,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        if !self.players.contains_key(player_id) {
            return Err(TableError::NotJoined(player_id.to_string()));
        }
        if seat >= self.seats.len() {
            return Err(TableError::InvalidSeat);
        }
        if self.in_live_hand(player_id) {
            // Full validation happens at apply time; the seat may be
            // freed or taken before the hand ends.
            self.requests.seat_in.push((player_id.to_string(), seat));
        } else {
            self.apply_take_seat(player_id, seat)?;
        }
        self.touch(now);
        Ok(())
    }

    pub fn request_leave_seat(
        &mut self,
        player_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        if self.seat_of(player_id).is_none() {
            return Err(TableError::NoSeat);
        }
        if self.in_live_hand(player_id) {
            self.requests.seat_out.push(player_id.to_string());
        } else {
            self.apply_leave_seat(player_id)?;
        }
        self.touch(now);
        Ok(())
    }

    pub fn request_stack_update(
        &mut self,
        player_id: &str,
        request: StackRequest,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        if !self.players.contains_key(player_id) {
            return Err(TableError::NotJoined(player_id.to_string()));
        }
        if matches!(request, StackRequest::Add(0)) {
            return Err(TableError::InvalidStackAmount);
        }
        if self.in_live_hand(player_id) {
            self.requests.stack.push((player_id.to_string(), request));
        } else {
            self.apply_stack_update(player_id, request)?;
        }
        self.touch(now);
        Ok(())
    }

    pub fn update_settings(
        &mut self,
        settings: TableSettings,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        settings.validate()?;
        if self.hand.is_some() {
            self.requests.settings = Some(settings);
        } else {
            self.settings = settings;
        }
        self.touch(now);
        Ok(())
    }

    fn in_live_hand(&self, player_id: &str) -> bool {
        self.hand
            .as_ref()
            .is_some_and(|h| h.players.iter().any(|p| p.id == player_id))
    }

    fn apply_take_seat(&mut self, player_id: &str, seat: SeatIndex) -> Result<(), TableError> {
        if seat >= self.seats.len() {
            return Err(TableError::InvalidSeat);
        }
        if self.seats[seat].is_some() {
            return Err(TableError::SeatTaken);
        }
        // Moving seats vacates the old one.
        if let Some(old) = self.seat_of(player_id) {
            self.seats[old] = None;
        }
        self.seats[seat] = Some(player_id.to_string());
        self.mark_dirty();
        Ok(())
    }

    fn apply_leave_seat(&mut self, player_id: &str) -> Result<(), TableError> {
        let seat = self.seat_of(player_id).ok_or(TableError::NoSeat)?;
        self.seats[seat] = None;
        self.mark_dirty();
        Ok(())
    }

    fn apply_stack_update(
        &mut self,
        player_id: &str,
        request: StackRequest,
    ) -> Result<(), TableError> {
        let player = self
            .players
            .get_mut(player_id)
            .ok_or_else(|| TableError::NotJoined(player_id.to_string()))?;
        match request {
            StackRequest::Add(amount) => {
                player.stack += amount;
                player.total_buy_in += amount;
            }
            StackRequest::Set(amount) => {
                if amount > player.stack {
                    player.total_buy_in += amount - player.stack;
                }
                player.stack = amount;
            }
        }
        self.mark_dirty();
        Ok(())
    }

    fn apply_leave(&mut self, player_id: &str) {
        if let Some(seat) = self.seat_of(player_id) {
            self.seats[seat] = None;
        }
        self.players.remove(player_id);
        self.mark_dirty();
    }

    /// Apply everything queued while the last hand ran. Requests that
    /// became invalid in the meantime are logged and dropped; there is
    /// no caller left to return the error to.
    fn apply_deferred_requests(&mut self) {
        let requests = std::mem::take(&mut self.requests);
        for player_id in requests.seat_out {
            if let Err(e) = self.apply_leave_seat(&player_id) {
                warn!("table {}: deferred seat-out for {player_id}: {e}", self.id);
            }
        }
        for player_id in requests.leave {
            self.apply_leave(&player_id);
        }
        for (player_id, seat) in requests.seat_in {
            if let Err(e) = self.apply_take_seat(&player_id, seat) {
                warn!("table {}: deferred seat-in for {player_id}: {e}", self.id);
            }
        }
        for (player_id, request) in requests.stack {
            if let Err(e) = self.apply_stack_update(&player_id, request) {
                warn!("table {}: deferred stack update for {player_id}: {e}", self.id);
            }
        }
        if let Some(settings) = requests.settings {
            match settings.validate() {
                Ok(()) => self.settings = settings,
                Err(e) => warn!("table {}: deferred settings rejected: {e}", self.id),
            }
        }
        if requests.stop {
            self.status = TableStatus::Stopped;
        }
    }

    // ---- lifecycle ----

    /// Start dealing. Fails if fewer than two funded players are seated.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TableError> {
        if self.hand.is_some() {
            return Err(TableError::HandInProgress);
        }
        self.start_new_hand(now)?;
        self.status = TableStatus::Playing;
        self.touch(now);
        Ok(())
    }

    /// Stop dealing. Deferred until the live hand finishes.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.hand.is_some() {
            self.requests.stop = true;
        } else {
            self.status = TableStatus::Stopped;
        }
        self.touch(now);
    }

    /// Freeze all deadlines in the live hand.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.status == TableStatus::Playing {
            self.status = TableStatus::Paused;
            if let Some(hand) = self.hand.as_mut() {
                hand.clear_auto_action_times();
            }
            self.touch(now);
        }
    }

    /// Re-arm whichever deadline the live hand's state needs.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.status == TableStatus::Paused {
            self.status = TableStatus::Playing;
            if let Some(hand) = self.hand.as_mut() {
                hand.resume(now);
            }
            self.touch(now);
        }
    }

    /// Hand over the committed shuffle seed so players can audit past
    /// deals, then rotate to a fresh one. Only available while no hand
    /// can still use it.
    pub fn reveal_seed(&mut self, now: DateTime<Utc>) -> Result<String, TableError> {
        if self.hand.is_some() || self.status == TableStatus::Playing {
            return Err(TableError::HandInProgress);
        }
        self.touch(now);
        self.mark_dirty();
        Ok(std::mem::replace(
            &mut self.seed,
            Uuid::new_v4().to_string(),
        ))
    }

    /// Seats with a funded player, in seat order.
    fn funded_seats(&self) -> Vec<SeatIndex> {
        (0..self.seats.len())
            .filter(|&i| {
                self.seats[i]
                    .as_ref()
                    .and_then(|id| self.players.get(id))
                    .is_some_and(|p| p.stack > 0)
            })
            .collect()
    }

    fn start_new_hand(&mut self, now: DateTime<Utc>) -> Result<(), TableError> {
        if self.hand.is_some() {
            return Err(TableError::HandInProgress);
        }
        // Busted players lose their seat before the next deal.
        for seat in &mut self.seats {
            if let Some(id) = seat {
                if self.players.get(id).is_some_and(|p| p.stack == 0) {
                    info!("table {}: {id} busted and leaves their seat", self.id);
                    *seat = None;
                }
            }
        }

        let funded = self.funded_seats();
        if funded.len() < 2 {
            return Err(TableError::NotEnoughPlayers);
        }

        // Dealer button moves to the next funded seat; turn order starts
        // one seat past the button.
        let dealer = funded
            .iter()
            .copied()
            .find(|&s| s > self.dealer_seat)
            .unwrap_or(funded[0]);
        self.dealer_seat = dealer;
        let first = funded.iter().position(|&s| s == dealer).map(|i| i + 1).unwrap_or(0);

        let entries: Vec<(PlayerId, SeatIndex, Chips)> = (0..funded.len())
            .map(|k| funded[(first + k) % funded.len()])
            .map(|seat| {
                let id = self.seats[seat].clone().unwrap_or_default();
                let stack = self.players.get(&id).map(|p| p.stack).unwrap_or(0);
                (id, seat, stack)
            })
            .collect();

        let hand_id = format!("{}:{}", self.id, Uuid::new_v4());
        let seeds = vec![self.seed.clone(), Uuid::new_v4().to_string()];
        let mut hand = GameHand::new(&hand_id, entries, self.settings.hand_config(), seeds);
        hand.start(now)?;
        info!(
            "table {}: hand {} dealt to {} players, button on seat {}",
            self.id,
            hand.id,
            hand.players.len(),
            dealer
        );
        self.hand = Some(hand);
        self.mark_dirty();
        Ok(())
    }

    /// Route an action into the live hand.
    pub fn take_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
        now: DateTime<Utc>,
    ) -> Result<(), TableError> {
        let hand = self.hand.as_mut().ok_or(TableError::NoHand)?;
        hand.take_action(player_id, action, now)?;
        self.touch(now);
        Ok(())
    }

    /// Periodic driver: fire hand deadlines, archive finished hands,
    /// apply deferred requests, and deal the next hand.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.status != TableStatus::Playing {
            return;
        }
        if let Some(hand) = self.hand.as_mut() {
            if let Err(e) = hand.update_hand_for_auto_action(now) {
                // The driver must keep running whatever a hand throws;
                // drop the deadlines so a poisoned hand can't loop.
                error!("table {}: hand {} auto-action failed: {e}", self.id, hand.id);
                hand.clear_auto_action_times();
            }
            if hand.status == HandStatus::Over {
                self.finish_hand(now);
            }
        } else if let Err(e) = self.start_new_hand(now) {
            info!("table {}: stopping, cannot deal: {e}", self.id);
            self.status = TableStatus::Stopped;
            self.mark_dirty();
        }
    }

    fn finish_hand(&mut self, now: DateTime<Utc>) {
        let Some(mut hand) = self.hand.take() else {
            return;
        };
        // Stacks were authoritative inside the hand; copy them back.
        for hand_player in &hand.players {
            if let Some(player) = self.players.get_mut(&hand_player.id) {
                player.stack = hand_player.stack;
            }
        }
        for event in hand.drain_events() {
            info!("table {}: hand {}: {event}", self.id, hand.id);
        }
        self.completed_hands.push(HandRecord {
            id: hand.id,
            winners: hand.winners,
            board: hand.community_cards,
            finished_at: now,
        });
        self.apply_deferred_requests();
        self.touch(now);
    }

    #[must_use]
    pub fn completed_hands(&self) -> &[HandRecord] {
        &self.completed_hands
    }

    // ---- sync ----

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_active = now;
        self.mark_dirty();
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty || self.hand.as_ref().is_some_and(GameHand::is_dirty)
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn unmark_dirty(&mut self) {
        self.is_dirty = false;
        if let Some(hand) = self.hand.as_mut() {
            hand.unmark_dirty();
        }
    }

    /// Snapshot for one viewer. Hole-card masking is delegated to the
    /// hand view.
    #[must_use]
    pub fn view(&self, viewer: Option<&str>) -> TableView {
        let seats = self
            .seats
            .iter()
            .map(|seat| {
                seat.as_ref()
                    .and_then(|id| self.players.get(id))
                    .map(|p| SeatView {
                        id: p.id.clone(),
                        name: p.name.clone(),
                        stack: p.stack,
                    })
            })
            .collect();
        TableView {
            id: self.id.clone(),
            status: self.status,
            settings: self.settings.clone(),
            seats,
            dealer_seat: self.dealer_seat,
            hand: self.hand.as_ref().map(|h| h.view(viewer)),
            hands_played: self.completed_hands.len(),
        }
    }
}

/// One occupied seat as seen by any viewer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SeatView {
    pub id: PlayerId,
    pub name: String,
    pub stack: Chips,
}

/// Snapshot of the whole table for one viewer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TableView {
    pub id: String,
    pub status: TableStatus,
    pub settings: TableSettings,
    pub seats: Vec<Option<SeatView>>,
    pub dealer_seat: SeatIndex,
    pub hand: Option<HandView>,
    pub hands_played: usize,
}

impl TableView {
    /// Wire form pushed to clients.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
