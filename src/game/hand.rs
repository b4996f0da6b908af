//! The hand state machine: one deal from blinds to settlement.
//!
//! A [`GameHand`] owns all money-affecting state for a single deal. It
//! validates bet legality, drives round progression and turn order,
//! detects termination, and resolves the pot, including partial-all-in
//! side pots. Chips are conserved by construction: every chip a player
//! commits lands in the per-player pot ledger, and settlement drains
//! that ledger back into stacks.
//!
//! Delays are explicit deadlines rather than hidden callbacks: the hand
//! stores `time_out_at` (action timer) and `next_step_at` (scheduled
//! transition/auto-play/reveal step), and a periodic driver calls
//! [`GameHand::update_hand_for_auto_action`] to fire whichever is due.
//! A deadline that fires after the hand moved on re-validates state and
//! no-ops, because the hand may have been torn down externally between
//! scheduling and firing.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use super::constants::{
    DEFAULT_ACTION_TIME_MS, DEFAULT_BIG_BLIND, DEFAULT_GAME_SPEED_MS, DEFAULT_SHOW_DOWN_TIME_MS,
    DEFAULT_SMALL_BLIND, NUM_HOLE_CARDS,
};
use super::entities::{Card, Chips, Deck, PlayerId, SeatIndex};
use super::errors::{ActionError, HandError, InvariantViolation};
use super::eval::{HandValue, compare, evaluate};

/// Betting rounds in their fixed order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HandRound {
    PreFlop,
    Flop,
    Turn,
    River,
    Done,
}

impl HandRound {
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::PreFlop => Self::Flop,
            Self::Flop => Self::Turn,
            Self::Turn => Self::River,
            Self::River | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for HandRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::PreFlop => "pre-flop",
            Self::Flop => "flop",
            Self::Turn => "turn",
            Self::River => "river",
            Self::Done => "done",
        };
        write!(f, "{repr}")
    }
}

/// Lifecycle of a hand.
///
/// `Auto` is entered when every remaining contender is folded or all-in:
/// no further decisions are possible, so the engine runs the board out
/// on a fixed delay instead of waiting for input.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HandStatus {
    Ready,
    Playing,
    Transition,
    Auto,
    ShowingDown,
    Over,
}

/// Per-hand participant status.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum HandPlayerStatus {
    Playing,
    Folded,
    AllIn,
}

/// A player action submitted by the transport layer.
///
/// `Time` is the timeout action: it auto-checks/calls when the player
/// already matches the current wager and auto-folds otherwise.
/// `ShowCards` is a voluntary reveal during the showdown; unlike the
/// other actions it is not turn-based.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PlayerAction {
    Bet { amount: Chips },
    Fold,
    Time,
    ShowCards,
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Bet { amount } => &format!("bets ${amount}"),
            Self::Fold => "folds",
            Self::Time => "times out",
            Self::ShowCards => "shows their cards",
        };
        write!(f, "{repr}")
    }
}

/// Per-hand view of one participant. The stack is copied from the table
/// roster at hand start and copied back at hand end, so the table never
/// observes a partially-bet stack mid-hand.
#[derive(Clone, Debug)]
pub struct HandPlayer {
    pub id: PlayerId,
    pub seat_index: SeatIndex,
    pub stack: Chips,
    pub status: HandPlayerStatus,
    pub cards: Vec<Card>,
    /// Amount committed this round but not yet moved into the pot.
    pub current_round_bet: Option<Chips>,
    /// Evaluated best hand, set at showdown.
    pub result: Option<HandValue>,
    pub show_card: bool,
}

impl HandPlayer {
    #[must_use]
    pub fn new(id: PlayerId, seat_index: SeatIndex, stack: Chips) -> Self {
        Self {
            id,
            seat_index,
            stack,
            status: HandPlayerStatus::Playing,
            cards: Vec::with_capacity(NUM_HOLE_CARDS),
            current_round_bet: None,
            result: None,
            show_card: false,
        }
    }
}

/// Blind and timing configuration for one hand.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct HandConfig {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub action_time_ms: u64,
    pub show_down_time_ms: u64,
    pub game_speed_ms: u64,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            small_blind: DEFAULT_SMALL_BLIND,
            big_blind: DEFAULT_BIG_BLIND,
            action_time_ms: DEFAULT_ACTION_TIME_MS,
            show_down_time_ms: DEFAULT_SHOW_DOWN_TIME_MS,
            game_speed_ms: DEFAULT_GAME_SPEED_MS,
        }
    }
}

impl HandConfig {
    fn action_time(&self) -> Duration {
        Duration::milliseconds(self.action_time_ms as i64)
    }

    fn show_down_time(&self) -> Duration {
        Duration::milliseconds(self.show_down_time_ms as i64)
    }

    fn game_speed(&self) -> Duration {
        Duration::milliseconds(self.game_speed_ms as i64)
    }
}

/// Step-log entries emitted on every meaningful mutation, drained by the
/// session layer for incremental sync.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum HandEvent {
    Started,
    PostedBlind { player: PlayerId, amount: Chips },
    Acted { player: PlayerId, action: PlayerAction },
    AutoActed { player: PlayerId, folded: bool },
    RoundAdvanced { round: HandRound },
    EnteredAutoMode,
    Awarded { player: PlayerId, amount: Chips },
    Finished,
}

impl fmt::Display for HandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Started => "hand started".to_string(),
            Self::PostedBlind { player, amount } => format!("{player} posts ${amount}"),
            Self::Acted { player, action } => format!("{player} {action}"),
            Self::AutoActed {
                player,
                folded: true,
            } => format!("{player} folds (timed out)"),
            Self::AutoActed { player, .. } => format!("{player} checks/calls (timed out)"),
            Self::RoundAdvanced { round } => format!("round advances to {round}"),
            Self::EnteredAutoMode => "no decisions left, running the board out".to_string(),
            Self::Awarded { player, amount } => format!("{player} wins ${amount}"),
            Self::Finished => "hand over".to_string(),
        };
        write!(f, "{repr}")
    }
}

/// Indices (within `contenders`) of the best comparable results among
/// the given contender indices. Missing results sort strictly weakest,
/// so folded contributors never win unless everyone left has folded.
#[must_use]
pub fn find_winners(results: &[Option<HandValue>], contenders: &[usize]) -> Vec<usize> {
    let mut winners: Vec<usize> = Vec::new();
    for &c in contenders {
        match winners.first() {
            None => winners.push(c),
            Some(&best) => match compare(results[c].as_ref(), results[best].as_ref()) {
                Ordering::Greater => {
                    winners.clear();
                    winners.push(c);
                }
                Ordering::Equal => winners.push(c),
                Ordering::Less => {}
            },
        }
    }
    winners
}

/// Outcome of a pot settlement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Settlement {
    /// Amount paid out to each player, indexed like the inputs.
    pub payouts: Vec<Chips>,
    /// Contributions left unclaimed after the loop. Always zero unless
    /// settlement is buggy; callers refund it to its contributor.
    pub leftover: Vec<Chips>,
}

/// Resolve a pot ledger against evaluated results, layer by layer.
///
/// Each iteration finds the contenders with the best hand, takes the
/// smallest winner contribution from every remaining contribution
/// (capped at what's left), and splits that layer evenly among the
/// winners; remainder chips go one at a time to the earliest winners.
/// Contenders whose contribution reaches zero drop out; the loop runs
/// until nothing is left to claim. This is what makes multi-way unequal
/// all-ins settle into main and side pots without ever naming them.
#[must_use]
pub fn settle_pot(contributions: &[Chips], results: &[Option<HandValue>]) -> Settlement {
    let mut remaining = contributions.to_vec();
    let mut payouts = vec![0; contributions.len()];

    loop {
        let contenders: Vec<usize> = (0..remaining.len()).filter(|&i| remaining[i] > 0).collect();
        if contenders.is_empty() {
            break;
        }
        let winners = find_winners(results, &contenders);
        let Some(least) = winners.iter().map(|&w| remaining[w]).min() else {
            break;
        };
        let mut layer: Chips = 0;
        for &c in &contenders {
            let take = remaining[c].min(least);
            remaining[c] -= take;
            layer += take;
        }
        let share = layer / winners.len() as Chips;
        let extra = layer % winners.len() as Chips;
        for (i, &w) in winners.iter().enumerate() {
            payouts[w] += share + u32::from((i as Chips) < extra);
        }
    }

    Settlement {
        payouts,
        leftover: remaining,
    }
}

/// The state machine for one deal.
#[derive(Clone, Debug)]
pub struct GameHand {
    pub id: String,
    deck: Deck,
    seeds: Vec<String>,
    config: HandConfig,
    /// Participants in turn order (first seat after the dealer first).
    pub players: Vec<HandPlayer>,
    pub round: HandRound,
    pub status: HandStatus,
    pub community_cards: Vec<Card>,
    /// Queue of player indices still required to act this round; the
    /// front is the player to act now.
    round_players: VecDeque<usize>,
    /// Current table-level wager to match.
    pub betting: Chips,
    /// Minimum legal raise increment.
    pub min_raise: Chips,
    /// Chips sitting in the pot awaiting settlement. Zeroed once the
    /// ledger is drained back into stacks.
    pub committed_pot: Chips,
    /// Per-player contributions still eligible to be claimed.
    pot: BTreeMap<PlayerId, Chips>,
    pub winners: BTreeMap<PlayerId, Chips>,
    begin_action_time: Option<DateTime<Utc>>,
    time_out_at: Option<DateTime<Utc>>,
    next_step_at: Option<DateTime<Utc>>,
    events: VecDeque<HandEvent>,
    is_dirty: bool,
}

impl GameHand {
    /// Create a READY hand. Seeds are committed here, before any card is
    /// dealt, so no party can bias the shuffle after seeing a card.
    /// `entries` must already be in turn order.
    #[must_use]
    pub fn new(
        id: &str,
        entries: Vec<(PlayerId, SeatIndex, Chips)>,
        config: HandConfig,
        seeds: Vec<String>,
    ) -> Self {
        let players = entries
            .into_iter()
            .map(|(id, seat, stack)| HandPlayer::new(id, seat, stack))
            .collect();
        Self {
            id: id.to_string(),
            deck: Deck::default(),
            seeds,
            config,
            players,
            round: HandRound::PreFlop,
            status: HandStatus::Ready,
            community_cards: Vec::with_capacity(5),
            round_players: VecDeque::new(),
            betting: 0,
            min_raise: 0,
            committed_pot: 0,
            pot: BTreeMap::new(),
            winners: BTreeMap::new(),
            begin_action_time: None,
            time_out_at: None,
            next_step_at: None,
            events: VecDeque::new(),
            is_dirty: true,
        }
    }

    /// Shuffle, deal hole cards, post blinds, and open pre-flop action.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), HandError> {
        if self.status != HandStatus::Ready || self.players.len() < 2 {
            return Err(ActionError::HandNotPlaying.into());
        }

        self.deck.shuffle(&self.seeds);
        for player in &mut self.players {
            player.cards = vec![self.deck.deal_card()?, self.deck.deal_card()?];
        }
        self.status = HandStatus::Playing;
        self.events.push_back(HandEvent::Started);

        // Blinds are forced bets through the regular validation path,
        // each with a one-player queue. min_raise is held at 0 for both
        // posts: a big blind under twice the small blind (say 10/15) is
        // a legal config, not an illegal raise.
        let (small, big) = (self.config.small_blind, self.config.big_blind);
        for (idx, amount) in [(0, small), (1, big)] {
            self.round_players = VecDeque::from([idx]);
            self.min_raise = 0;
            self.bet(idx, amount)?;
            let posted = self.players[idx].current_round_bet.unwrap_or(0);
            self.events.push_back(HandEvent::PostedBlind {
                player: self.players[idx].id.clone(),
                amount: posted,
            });
        }

        // The table wager and minimum raise are pinned to the big blind
        // even if the big blind posted short.
        self.round = HandRound::PreFlop;
        self.betting = big;
        self.min_raise = big;

        let n = self.players.len();
        self.round_players = (0..n)
            .map(|i| (i + 2) % n)
            .filter(|&i| self.players[i].status == HandPlayerStatus::Playing)
            .collect();

        if !self.check_terminated_hand(now) {
            self.start_action_timer(now);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Largest amount any un-folded opponent of `idx` can still contest
    /// this round: their stack while playing, their committed round bet
    /// once all-in.
    fn max_other_contest(&self, idx: usize) -> Chips {
        self.players
            .iter()
            .enumerate()
            .filter(|(j, p)| *j != idx && p.status != HandPlayerStatus::Folded)
            .map(|(_, p)| match p.status {
                HandPlayerStatus::Playing => p.stack,
                HandPlayerStatus::AllIn => p.current_round_bet.unwrap_or(0),
                HandPlayerStatus::Folded => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Apply a bet of `amount` total chips for this round.
    ///
    /// A player can never be forced to put in more than the largest
    /// amount an opponent can contest, so the requested amount is capped
    /// there; a request at or above the cap is an all-in. A raise below
    /// `min_raise` is rejected unless it is that capped all-in.
    pub fn bet(&mut self, idx: usize, amount: Chips) -> Result<(), ActionError> {
        if self.status != HandStatus::Playing {
            return Err(ActionError::HandNotPlaying);
        }
        if self.round == HandRound::Done {
            return Err(ActionError::HandOver);
        }
        if self.round_players.front() != Some(&idx) {
            return Err(ActionError::OutOfTurn);
        }
        if self.players[idx].status != HandPlayerStatus::Playing {
            return Err(ActionError::PlayerNotPlaying);
        }

        let max_bet = self.players[idx].stack.min(self.max_other_contest(idx));
        let goes_all_in = amount >= max_bet;
        let amount = amount.min(max_bet);
        if !goes_all_in {
            if amount > self.betting {
                if amount - self.betting < self.min_raise {
                    return Err(ActionError::RaiseTooSmall {
                        min_raise: self.min_raise,
                    });
                }
            } else if amount < self.betting {
                return Err(ActionError::BetTooLow {
                    betting: self.betting,
                });
            }
        }

        // Validation passed; no failure below this point.
        if amount > self.betting {
            // A larger wager reopens action for everyone still playing
            // who isn't already queued, in seat order after the raiser.
            let n = self.players.len();
            for k in 1..n {
                let j = (idx + k) % n;
                if self.players[j].status == HandPlayerStatus::Playing
                    && !self.round_players.contains(&j)
                {
                    self.round_players.push_back(j);
                }
            }
        }
        self.min_raise = self.min_raise.max(amount.saturating_sub(self.betting));
        self.betting = self.betting.max(amount);

        let player = &mut self.players[idx];
        player.current_round_bet = Some(amount);
        if goes_all_in {
            player.status = HandPlayerStatus::AllIn;
        }
        self.mark_dirty();
        Ok(())
    }

    /// Entry point from the transport layer: validate, dispatch, then
    /// either finish the hand or schedule the turn advance after a short
    /// fixed delay (so all-in reveals can animate).
    pub fn take_action(
        &mut self,
        player_id: &str,
        action: PlayerAction,
        now: DateTime<Utc>,
    ) -> Result<(), HandError> {
        let idx = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or_else(|| ActionError::UnknownPlayer(player_id.to_string()))?;
        if action == PlayerAction::ShowCards {
            if self.status != HandStatus::ShowingDown {
                return Err(ActionError::HandNotPlaying.into());
            }
            if !self.players[idx].show_card {
                self.players[idx].show_card = true;
                self.events.push_back(HandEvent::Acted {
                    player: player_id.to_string(),
                    action,
                });
                self.mark_dirty();
            }
            return Ok(());
        }
        if self.status != HandStatus::Playing {
            return Err(ActionError::HandNotPlaying.into());
        }
        if self.round == HandRound::Done {
            return Err(ActionError::HandOver.into());
        }
        if self.round_players.front() != Some(&idx) {
            return Err(ActionError::OutOfTurn.into());
        }
        if self.players[idx].status != HandPlayerStatus::Playing {
            return Err(ActionError::PlayerNotPlaying.into());
        }

        match action {
            PlayerAction::Bet { amount } => {
                self.bet(idx, amount)?;
                self.events.push_back(HandEvent::Acted {
                    player: player_id.to_string(),
                    action,
                });
            }
            PlayerAction::Fold => {
                self.players[idx].status = HandPlayerStatus::Folded;
                self.events.push_back(HandEvent::Acted {
                    player: player_id.to_string(),
                    action,
                });
            }
            PlayerAction::Time => {
                let matches_bet =
                    self.players[idx].current_round_bet.unwrap_or(0) == self.betting;
                if matches_bet {
                    self.bet(idx, self.betting)?;
                } else {
                    self.players[idx].status = HandPlayerStatus::Folded;
                }
                self.events.push_back(HandEvent::AutoActed {
                    player: player_id.to_string(),
                    folded: !matches_bet,
                });
            }
            // Returned before the turn checks.
            PlayerAction::ShowCards => unreachable!(),
        }

        if !self.check_terminated_hand(now) {
            self.status = HandStatus::Transition;
            self.clear_action_timer();
            self.next_step_at = Some(now + self.config.game_speed());
        }
        self.mark_dirty();
        Ok(())
    }

    /// Advance the turn. Valid only in TRANSITION; a stale call no-ops.
    pub fn move_next(&mut self, now: DateTime<Utc>) -> Result<(), InvariantViolation> {
        if self.status != HandStatus::Transition {
            debug!("hand {}: stale move_next ignored", self.id);
            return Ok(());
        }
        self.next_step_at = None;
        self.round_players.pop_front();
        // Players that went all-in or folded out of turn can't act.
        while matches!(
            self.round_players.front(),
            Some(&i) if self.players[i].status != HandPlayerStatus::Playing
        ) {
            self.round_players.pop_front();
        }
        if self.round_players.is_empty() {
            return self.complete_round(now);
        }
        self.status = HandStatus::Playing;
        self.start_action_timer(now);
        self.mark_dirty();
        Ok(())
    }

    /// Commit round bets to the pot and advance to the next street (or
    /// settlement once the river closes).
    pub fn complete_round(&mut self, now: DateTime<Utc>) -> Result<(), InvariantViolation> {
        if self.round == HandRound::Done
            || matches!(self.status, HandStatus::ShowingDown | HandStatus::Over)
        {
            debug!("hand {}: stale complete_round ignored", self.id);
            return Ok(());
        }

        self.commit_round_bets();
        self.round = self.round.next();
        self.betting = 0;
        self.min_raise = self.config.big_blind;
        self.round_players = (0..self.players.len())
            .filter(|&i| self.players[i].status == HandPlayerStatus::Playing)
            .collect();
        self.events.push_back(HandEvent::RoundAdvanced { round: self.round });

        if self.round == HandRound::Done {
            return self.complete_hand(now);
        }

        match self.round {
            HandRound::Flop => {
                self.deck.deal_card()?; // burn
                for _ in 0..3 {
                    self.community_cards.push(self.deck.deal_card()?);
                }
            }
            HandRound::Turn | HandRound::River => {
                self.deck.deal_card()?; // burn
                self.community_cards.push(self.deck.deal_card()?);
            }
            HandRound::PreFlop | HandRound::Done => {}
        }

        if self.status == HandStatus::Auto || self.round_players.is_empty() {
            self.status = HandStatus::Auto;
            self.next_step_at = Some(now + self.config.game_speed());
        } else {
            self.status = HandStatus::Playing;
            self.start_action_timer(now);
        }
        self.mark_dirty();
        Ok(())
    }

    fn commit_round_bets(&mut self) {
        for player in &mut self.players {
            if let Some(bet) = player.current_round_bet.take() {
                *self.pot.entry(player.id.clone()).or_default() += bet;
                self.committed_pot += bet;
                player.stack -= bet;
            }
        }
    }

    /// Detect hand termination after an action or at blind time.
    ///
    /// (a) At most one un-folded player left: the survivor takes the
    /// whole committed pot immediately and the hand moves to showdown;
    /// no further card is dealt.
    /// (b) No decisions left (one matched PLAYING player amongst all-ins,
    /// or everyone all-in): the remaining player is forced all-in at the
    /// capped amount and the board runs out in AUTO mode.
    pub fn check_terminated_hand(&mut self, now: DateTime<Utc>) -> bool {
        let playing: Vec<usize> = (0..self.players.len())
            .filter(|&i| self.players[i].status == HandPlayerStatus::Playing)
            .collect();
        let num_all_in = self
            .players
            .iter()
            .filter(|p| p.status == HandPlayerStatus::AllIn)
            .count();

        if playing.len() + num_all_in <= 1 {
            self.commit_round_bets();
            self.round = HandRound::Done;
            let total: Chips = self.pot.values().sum();
            if let Some(survivor) = self
                .players
                .iter_mut()
                .find(|p| p.status != HandPlayerStatus::Folded)
            {
                survivor.stack += total;
                self.winners.insert(survivor.id.clone(), total);
                self.events.push_back(HandEvent::Awarded {
                    player: survivor.id.clone(),
                    amount: total,
                });
            }
            for claimed in self.pot.values_mut() {
                *claimed = 0;
            }
            self.committed_pot = 0;
            self.enter_showdown(now);
            return true;
        }

        if playing.len() <= 1 && num_all_in >= 1 {
            if let Some(&i) = playing.first() {
                let cap = self
                    .betting
                    .min(self.players[i].stack.min(self.max_other_contest(i)));
                if self.players[i].current_round_bet.unwrap_or(0) < cap {
                    // The last playing player still has a decision.
                    return false;
                }
                self.players[i].status = HandPlayerStatus::AllIn;
            }
            self.status = HandStatus::Auto;
            self.clear_action_timer();
            self.next_step_at = Some(now + self.config.game_speed());
            self.events.push_back(HandEvent::EnteredAutoMode);
            self.mark_dirty();
            return true;
        }

        false
    }

    /// Evaluate all non-folded hands and settle the pot. Requires the
    /// round sequence to have reached DONE.
    fn complete_hand(&mut self, now: DateTime<Utc>) -> Result<(), InvariantViolation> {
        for player in &mut self.players {
            if player.status != HandPlayerStatus::Folded {
                player.result = Some(evaluate(&player.cards, &self.community_cards)?);
            }
        }
        self.settle();
        self.enter_showdown(now);
        Ok(())
    }

    fn settle(&mut self) {
        let contributions: Vec<Chips> = self
            .players
            .iter()
            .map(|p| self.pot.get(&p.id).copied().unwrap_or(0))
            .collect();
        let results: Vec<Option<HandValue>> =
            self.players.iter().map(|p| p.result.clone()).collect();

        let settlement = settle_pot(&contributions, &results);

        for (i, &left) in settlement.leftover.iter().enumerate() {
            if left > 0 {
                // Safety fallback: give it back to its contributor, but
                // this is a settlement bug and must be visible.
                error!(
                    "hand {}: {}",
                    self.id,
                    InvariantViolation::SettlementLeftover { amount: left }
                );
                self.players[i].stack += left;
            }
        }
        for (i, &amount) in settlement.payouts.iter().enumerate() {
            if amount > 0 {
                let player = &mut self.players[i];
                player.stack += amount;
                player.show_card = true;
                self.winners.insert(player.id.clone(), amount);
                self.events.push_back(HandEvent::Awarded {
                    player: player.id.clone(),
                    amount,
                });
            }
        }
        for claimed in self.pot.values_mut() {
            *claimed = 0;
        }
        self.committed_pot = 0;
    }

    fn enter_showdown(&mut self, now: DateTime<Utc>) {
        self.status = HandStatus::ShowingDown;
        self.clear_action_timer();
        self.next_step_at = Some(now + self.config.show_down_time());
        self.mark_dirty();
    }

    /// Periodic driver: fire the action timeout or any due scheduled
    /// step. Stale deadlines no-op after re-validating state, and the
    /// caller's loop must survive any error from here.
    pub fn update_hand_for_auto_action(&mut self, now: DateTime<Utc>) -> Result<(), HandError> {
        match self.status {
            HandStatus::Playing => {
                if self.time_out_at.is_some_and(|t| now >= t) {
                    let Some(&idx) = self.round_players.front() else {
                        return Ok(());
                    };
                    let player_id = self.players[idx].id.clone();
                    info!("hand {}: {} ran out of time", self.id, player_id);
                    self.take_action(&player_id, PlayerAction::Time, now)?;
                }
            }
            HandStatus::Transition => {
                if self.step_due(now) {
                    self.move_next(now)?;
                }
            }
            HandStatus::Auto => {
                if self.step_due(now) {
                    self.complete_round(now)?;
                }
            }
            HandStatus::ShowingDown => {
                if self.step_due(now) {
                    self.clear_auto_action_times();
                    self.status = HandStatus::Over;
                    self.events.push_back(HandEvent::Finished);
                    self.mark_dirty();
                }
            }
            HandStatus::Ready | HandStatus::Over => {}
        }
        Ok(())
    }

    fn step_due(&self, now: DateTime<Utc>) -> bool {
        self.next_step_at.is_some_and(|t| now >= t)
    }

    /// Re-arm whichever deadline the current state needs, e.g. after the
    /// table was paused.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        match self.status {
            HandStatus::Playing => self.start_action_timer(now),
            HandStatus::Transition | HandStatus::Auto => {
                self.next_step_at = Some(now + self.config.game_speed());
            }
            HandStatus::ShowingDown => {
                self.next_step_at = Some(now + self.config.show_down_time());
            }
            HandStatus::Ready | HandStatus::Over => {}
        }
        self.mark_dirty();
    }

    fn start_action_timer(&mut self, now: DateTime<Utc>) {
        self.begin_action_time = Some(now);
        self.time_out_at = Some(now + self.config.action_time());
    }

    fn clear_action_timer(&mut self) {
        self.begin_action_time = None;
        self.time_out_at = None;
    }

    /// The only cancellation primitive: drop every pending deadline.
    pub fn clear_auto_action_times(&mut self) {
        self.clear_action_timer();
        self.next_step_at = None;
    }

    /// The player whose turn it is, if any.
    #[must_use]
    pub fn acting_player(&self) -> Option<&HandPlayer> {
        self.round_players.front().map(|&i| &self.players[i])
    }

    /// Committed pot plus all outstanding round bets.
    #[must_use]
    pub fn total_pot(&self) -> Chips {
        self.committed_pot
            + self
                .players
                .iter()
                .map(|p| p.current_round_bet.unwrap_or(0))
                .sum::<Chips>()
    }

    /// This player's claimable contribution in the pot ledger.
    #[must_use]
    pub fn pot_contribution(&self, player_id: &str) -> Chips {
        self.pot.get(player_id).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn time_out_at(&self) -> Option<DateTime<Utc>> {
        self.time_out_at
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn unmark_dirty(&mut self) {
        self.is_dirty = false;
    }

    /// Drain the step log accumulated since the last sync.
    pub fn drain_events(&mut self) -> VecDeque<HandEvent> {
        std::mem::take(&mut self.events)
    }

    /// Snapshot for the presentation layer. Hole cards are masked unless
    /// the player is the viewer, is showing, or has folded.
    #[must_use]
    pub fn view(&self, viewer: Option<&str>) -> HandView {
        let players = self
            .players
            .iter()
            .map(|p| {
                let revealed = viewer == Some(p.id.as_str())
                    || p.show_card
                    || p.status == HandPlayerStatus::Folded;
                HandPlayerView {
                    id: p.id.clone(),
                    seat_index: p.seat_index,
                    stack: p.stack,
                    status: p.status,
                    betting: p.current_round_bet.unwrap_or(0),
                    cards: revealed.then(|| p.cards.clone()),
                    result: if revealed { p.result.clone() } else { None },
                    show_card: p.show_card,
                }
            })
            .collect();
        HandView {
            id: self.id.clone(),
            round: self.round,
            status: self.status,
            community_cards: self.community_cards.clone(),
            pot: self.total_pot(),
            committed_pot: self.committed_pot,
            betting: self.betting,
            min_raise: self.min_raise,
            acting: self.acting_player().map(|p| p.id.clone()),
            time_out_at: self.time_out_at,
            players,
            winners: self.winners.clone(),
        }
    }
}

/// Masked per-player snapshot.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandPlayerView {
    pub id: PlayerId,
    pub seat_index: SeatIndex,
    pub stack: Chips,
    pub status: HandPlayerStatus,
    pub betting: Chips,
    pub cards: Option<Vec<Card>>,
    pub result: Option<HandValue>,
    pub show_card: bool,
}

/// Snapshot of a hand for the presentation layer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HandView {
    pub id: String,
    pub round: HandRound,
    pub status: HandStatus,
    pub community_cards: Vec<Card>,
    pub pot: Chips,
    pub committed_pot: Chips,
    pub betting: Chips,
    pub min_raise: Chips,
    pub acting: Option<PlayerId>,
    pub time_out_at: Option<DateTime<Utc>>,
    pub players: Vec<HandPlayerView>,
    pub winners: BTreeMap<PlayerId, Chips>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HandConfig {
        HandConfig {
            small_blind: 10,
            big_blind: 20,
            action_time_ms: 1_000,
            show_down_time_ms: 500,
            game_speed_ms: 100,
        }
    }

    fn hand_with_stacks(stacks: &[Chips]) -> GameHand {
        let entries = stacks
            .iter()
            .enumerate()
            .map(|(i, &stack)| (format!("p{i}"), i, stack))
            .collect();
        GameHand::new(
            "t:hand",
            entries,
            config(),
            vec!["seed".into(), "hand".into()],
        )
    }

    // Outstanding round bets are still part of the stack until they are
    // committed, so they'd be double-counted without the subtraction.
    fn total_chips(hand: &GameHand) -> Chips {
        hand.players
            .iter()
            .map(|p| p.stack - p.current_round_bet.unwrap_or(0))
            .sum::<Chips>()
            + hand.total_pot()
    }

    /// Run the periodic driver far enough into the future to flush every
    /// pending deadline until the hand stops changing state.
    fn run_until_settled(hand: &mut GameHand, mut now: DateTime<Utc>) -> DateTime<Utc> {
        for _ in 0..100 {
            now += Duration::seconds(2);
            hand.update_hand_for_auto_action(now).unwrap();
            if hand.status == HandStatus::Over {
                break;
            }
        }
        now
    }

    #[test]
    fn test_start_posts_blinds_and_opens_action() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        assert_eq!(hand.status, HandStatus::Playing);
        assert_eq!(hand.round, HandRound::PreFlop);
        assert_eq!(hand.betting, 20);
        assert_eq!(hand.min_raise, 20);
        assert_eq!(hand.players[0].current_round_bet, Some(10));
        assert_eq!(hand.players[1].current_round_bet, Some(20));
        // Action starts two seats after the big blind.
        assert_eq!(hand.acting_player().unwrap().id, "p2");
        assert!(hand.time_out_at().is_some());
        assert!(hand.players.iter().all(|p| p.cards.len() == 2));
    }

    #[test]
    fn test_start_accepts_odd_blind_ratio() {
        // A big blind under twice the small blind must not trip the
        // raise minimum when the blinds are posted.
        let mut hand = GameHand::new(
            "t:hand",
            vec![("p0".into(), 0, 1000), ("p1".into(), 1, 1000)],
            HandConfig {
                small_blind: 10,
                big_blind: 15,
                ..config()
            },
            vec!["seed".into(), "hand".into()],
        );
        let now = Utc::now();
        hand.start(now).unwrap();

        assert_eq!(hand.status, HandStatus::Playing);
        assert_eq!(hand.players[0].current_round_bet, Some(10));
        assert_eq!(hand.players[1].current_round_bet, Some(15));
        assert_eq!(hand.betting, 15);
        assert_eq!(hand.min_raise, 15);
    }

    #[test]
    fn test_bet_below_wager_is_rejected_without_mutation() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        let err = hand.take_action("p2", PlayerAction::Bet { amount: 5 }, now);
        assert_eq!(
            err,
            Err(HandError::Action(ActionError::BetTooLow { betting: 20 }))
        );
        assert_eq!(hand.status, HandStatus::Playing);
        assert_eq!(hand.players[2].current_round_bet, None);
    }

    #[test]
    fn test_small_raise_is_rejected() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        let err = hand.take_action("p2", PlayerAction::Bet { amount: 30 }, now);
        assert_eq!(
            err,
            Err(HandError::Action(ActionError::RaiseTooSmall {
                min_raise: 20
            }))
        );
    }

    #[test]
    fn test_out_of_turn_is_rejected() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        let err = hand.take_action("p0", PlayerAction::Fold, now);
        assert_eq!(err, Err(HandError::Action(ActionError::OutOfTurn)));
    }

    #[test]
    fn test_raise_reopens_action_and_bumps_min_raise() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        hand.take_action("p2", PlayerAction::Bet { amount: 60 }, now).unwrap();
        assert_eq!(hand.betting, 60);
        assert_eq!(hand.min_raise, 40);

        // p0 and p1 must both still get to act on the raise.
        now += Duration::seconds(1);
        hand.update_hand_for_auto_action(now).unwrap();
        assert_eq!(hand.acting_player().unwrap().id, "p0");
    }

    #[test]
    fn test_all_in_request_is_capped_by_largest_opponent() {
        let mut hand = hand_with_stacks(&[1000, 200, 500]);
        let now = Utc::now();
        hand.start(now).unwrap();

        // p2 shoves: opponents can contest at most 1000, own stack 500.
        hand.take_action("p2", PlayerAction::Bet { amount: 9999 }, now).unwrap();
        assert_eq!(hand.players[2].status, HandPlayerStatus::AllIn);
        assert_eq!(hand.players[2].current_round_bet, Some(500));
        assert_eq!(hand.betting, 500);
    }

    #[test]
    fn test_fold_out_awards_pot_without_dealing() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        hand.take_action("p2", PlayerAction::Fold, now).unwrap();
        now += Duration::seconds(1);
        hand.update_hand_for_auto_action(now).unwrap();
        hand.take_action("p0", PlayerAction::Fold, now).unwrap();

        // p1 is the only un-folded player: blinds go to them, no board.
        assert_eq!(hand.status, HandStatus::ShowingDown);
        assert_eq!(hand.round, HandRound::Done);
        assert!(hand.community_cards.is_empty());
        assert_eq!(hand.winners.get("p1"), Some(&30));
        assert_eq!(hand.players[1].stack, 1010);
        assert_eq!(total_chips(&hand), 3000);
    }

    #[test]
    fn test_timeout_auto_folds_when_behind_the_bet() {
        let mut hand = hand_with_stacks(&[1000, 1000, 1000]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        // p2 has 0 in, betting is 20: the timeout must fold them.
        now += Duration::seconds(2);
        hand.update_hand_for_auto_action(now).unwrap();
        assert_eq!(hand.players[2].status, HandPlayerStatus::Folded);
    }

    #[test]
    fn test_timeout_auto_checks_when_matched() {
        let mut hand = hand_with_stacks(&[1000, 1000]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        // Heads-up: p0 (small blind) calls, p1 already matches at 20.
        hand.take_action("p0", PlayerAction::Bet { amount: 20 }, now).unwrap();
        now += Duration::seconds(1);
        hand.update_hand_for_auto_action(now).unwrap();
        assert_eq!(hand.acting_player().unwrap().id, "p1");

        now += Duration::seconds(2);
        hand.update_hand_for_auto_action(now).unwrap();
        assert_eq!(hand.players[1].status, HandPlayerStatus::Playing);
        // The auto check ended pre-flop; the flop must be out.
        let now = run_until_flop(&mut hand, now);
        assert_eq!(hand.community_cards.len(), 3);
        let _ = now;
    }

    fn run_until_flop(hand: &mut GameHand, mut now: DateTime<Utc>) -> DateTime<Utc> {
        for _ in 0..10 {
            if hand.round != HandRound::PreFlop {
                break;
            }
            now += Duration::seconds(1);
            hand.update_hand_for_auto_action(now).unwrap();
        }
        now
    }

    #[test]
    fn test_all_in_call_enters_auto_and_runs_out_board() {
        let mut hand = hand_with_stacks(&[300, 300]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        hand.take_action("p0", PlayerAction::Bet { amount: 300 }, now).unwrap();
        assert_eq!(hand.players[0].status, HandPlayerStatus::AllIn);
        now += Duration::seconds(1);
        hand.update_hand_for_auto_action(now).unwrap();
        hand.take_action("p1", PlayerAction::Bet { amount: 300 }, now).unwrap();

        // Both all-in: AUTO mode deals the whole board on a delay.
        assert_eq!(hand.status, HandStatus::Auto);
        let now = run_until_settled(&mut hand, now);
        assert_eq!(hand.status, HandStatus::Over);
        assert_eq!(hand.round, HandRound::Done);
        assert_eq!(hand.community_cards.len(), 5);

        // All 600 chips come back out of the pot.
        let total: Chips = hand.players.iter().map(|p| p.stack).sum();
        assert_eq!(total, 600);
        let paid: Chips = hand.winners.values().sum();
        assert_eq!(paid, 600);
        let _ = now;
    }

    #[test]
    fn test_checked_down_hand_reaches_showdown_and_conserves_chips() {
        let mut hand = hand_with_stacks(&[500, 500, 500]);
        let mut now = Utc::now();
        hand.start(now).unwrap();

        // Everyone just calls/checks until the river closes.
        for _ in 0..40 {
            match hand.status {
                HandStatus::Playing => {
                    let id = hand.acting_player().unwrap().id.clone();
                    let amount = hand.betting;
                    hand.take_action(&id, PlayerAction::Bet { amount }, now).unwrap();
                }
                HandStatus::Over => break,
                _ => {}
            }
            now += Duration::seconds(1);
            hand.update_hand_for_auto_action(now).unwrap();
        }

        assert_eq!(hand.status, HandStatus::Over);
        assert_eq!(hand.community_cards.len(), 5);
        let total: Chips = hand.players.iter().map(|p| p.stack).sum();
        assert_eq!(total, 1500);
        let paid: Chips = hand.winners.values().sum();
        assert_eq!(paid, 60);
        // Settlement winners must be showing.
        for (id, _) in &hand.winners {
            let p = hand.players.iter().find(|p| &p.id == id).unwrap();
            assert!(p.show_card);
        }
    }

    #[test]
    fn test_stale_deadline_no_ops_after_teardown() {
        let mut hand = hand_with_stacks(&[1000, 1000]);
        let mut now = Utc::now();
        hand.start(now).unwrap();
        hand.clear_auto_action_times();

        // With no deadlines armed nothing may fire, however late.
        now += Duration::days(1);
        hand.update_hand_for_auto_action(now).unwrap();
        assert_eq!(hand.status, HandStatus::Playing);
        assert_eq!(hand.round, HandRound::PreFlop);
    }

    #[test]
    fn test_view_masks_unshown_cards() {
        let mut hand = hand_with_stacks(&[1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        let view = hand.view(Some("p0"));
        assert!(view.players[0].cards.is_some());
        assert!(view.players[1].cards.is_none());

        let spectator = hand.view(None);
        assert!(spectator.players.iter().all(|p| p.cards.is_none()));
        assert_eq!(spectator.pot, 30);
    }

    #[test]
    fn test_show_cards_reveals_during_showdown_only() {
        let mut hand = hand_with_stacks(&[1000, 1000]);
        let now = Utc::now();
        hand.start(now).unwrap();

        // Mid-betting the reveal is rejected and nothing leaks.
        let err = hand.take_action("p1", PlayerAction::ShowCards, now);
        assert_eq!(err, Err(HandError::Action(ActionError::HandNotPlaying)));
        assert!(!hand.players[1].show_card);

        // Heads-up fold-out puts the hand into the showdown window.
        hand.take_action("p0", PlayerAction::Fold, now).unwrap();
        assert_eq!(hand.status, HandStatus::ShowingDown);
        assert!(!hand.players[1].show_card);

        hand.take_action("p1", PlayerAction::ShowCards, now).unwrap();
        assert!(hand.players[1].show_card);
        let spectator = hand.view(None);
        assert!(spectator.players[1].cards.is_some());
    }

    mod settlement {
        use super::*;

        fn result(rank: HandRank, values: Vec<u8>) -> Option<HandValue> {
            Some(HandValue {
                rank,
                values,
                hole_card_indexes: vec![],
                community_card_indexes: vec![],
            })
        }

        use crate::game::eval::HandRank;

        #[test]
        fn test_short_stack_winner_takes_main_pot_only() {
            // 100/300/300 with the short stack holding the best hand:
            // the short stack wins 3x100, the others contest the rest.
            let contributions = [100, 300, 300];
            let results = [
                result(HandRank::FourOfAKind, vec![9, 14]),
                result(HandRank::Flush, vec![13, 10, 8, 4, 2]),
                result(HandRank::OnePair, vec![11, 14, 9, 5]),
            ];
            let settlement = settle_pot(&contributions, &results);
            assert_eq!(settlement.payouts, vec![300, 400, 0]);
            assert_eq!(settlement.leftover, vec![0, 0, 0]);
        }

        #[test]
        fn test_even_split_with_remainder_goes_to_earliest() {
            let contributions = [101, 101, 101];
            let results = [
                result(HandRank::Straight, vec![9]),
                result(HandRank::Straight, vec![9]),
                result(HandRank::HighCard, vec![14, 10, 8, 6, 4]),
            ];
            let settlement = settle_pot(&contributions, &results);
            // 303 split two ways: 152 / 151.
            assert_eq!(settlement.payouts, vec![152, 151, 0]);
        }

        #[test]
        fn test_folded_contributions_are_dead_money() {
            let contributions = [50, 100, 100];
            let results = [
                None, // folded after betting 50
                result(HandRank::TwoPair, vec![10, 5, 14]),
                result(HandRank::OnePair, vec![13, 14, 10, 7]),
            ];
            let settlement = settle_pot(&contributions, &results);
            assert_eq!(settlement.payouts, vec![0, 250, 0]);
        }

        #[test]
        fn test_layered_all_ins_four_ways() {
            // 25/75/150/150; best hand order: p3 > p2 > p1 > p0.
            let contributions = [25, 75, 150, 150];
            let results = [
                result(HandRank::HighCard, vec![10, 8, 6, 4, 3]),
                result(HandRank::OnePair, vec![5, 14, 10, 8]),
                result(HandRank::TwoPair, vec![9, 4, 13]),
                result(HandRank::Straight, vec![8]),
            ];
            let settlement = settle_pot(&contributions, &results);
            // p3 has the best hand everywhere: takes everything.
            assert_eq!(settlement.payouts, vec![0, 0, 0, 400]);
        }

        #[test]
        fn test_middle_stack_wins_its_layers() {
            // p1 all-in for 75 with the best hand; p2/p3 continue.
            let contributions = [25, 75, 150, 150];
            let results = [
                result(HandRank::HighCard, vec![10, 8, 6, 4, 3]),
                result(HandRank::Straight, vec![8]),
                result(HandRank::TwoPair, vec![9, 4, 13]),
                result(HandRank::OnePair, vec![5, 14, 10, 8]),
            ];
            let settlement = settle_pot(&contributions, &results);
            // p1 takes 25+75+75+75 = 250; p2 beats p3 for the rest.
            assert_eq!(settlement.payouts, vec![0, 250, 150, 0]);
            let total: Chips = settlement.payouts.iter().sum();
            assert_eq!(total, 400);
        }

        #[test]
        fn test_find_winners_prefers_any_result_over_none() {
            let results = [
                None,
                result(HandRank::HighCard, vec![7, 5, 4, 3, 2]),
                None,
            ];
            assert_eq!(find_winners(&results, &[0, 1, 2]), vec![1]);
        }
    }
}
