//! A tokio task that owns one [`Table`] and serializes all access to it.
//!
//! Commands arrive over a bounded mpsc channel and are handled one at a
//! time, which is what gives the engine its run-to-completion guarantee
//! without any locking. Two interval timers multiplex into the same
//! loop: a fast one driving hand deadlines (timeouts, turn advances,
//! auto-play streets) and a slower one pushing masked views to
//! subscribers whenever the table is dirty.

use chrono::Utc;
use log::info;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use crate::game::entities::{Chips, PlayerId, SeatIndex};
use crate::game::errors::TableError;
use crate::game::hand::PlayerAction;

use super::config::TableSettings;
use super::messages::TableCommand;
use super::table::{StackRequest, Table, TableView};

/// Cadence of the hand-deadline driver. Bounds how late a timeout or a
/// scheduled step can fire.
const AUTO_ACTION_INTERVAL: Duration = Duration::from_millis(200);

/// Cadence of pushing views to subscribers.
const SYNC_INTERVAL: Duration = Duration::from_millis(500);

const COMMAND_BUFFER: usize = 64;

pub struct TableActor {
    table: Table,
    inbox: mpsc::Receiver<TableCommand>,
    subscribers: Vec<(Option<PlayerId>, mpsc::UnboundedSender<TableView>)>,
}

impl TableActor {
    async fn run(mut self) {
        let mut auto = interval(AUTO_ACTION_INTERVAL);
        auto.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sync = interval(SYNC_INTERVAL);
        sync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_cmd = self.inbox.recv() => {
                    match maybe_cmd {
                        Some(cmd) => self.handle(cmd),
                        // All handles dropped: the table dies with them.
                        None => break,
                    }
                }
                _ = auto.tick() => self.table.tick(Utc::now()),
                _ = sync.tick() => self.sync_subscribers(),
            }
        }
        info!("table {}: actor shut down", self.table.id);
    }

    fn owner_gate(&self, player_id: &str) -> Result<(), TableError> {
        if self.table.owner_id == player_id {
            Ok(())
        } else {
            Err(TableError::NotOwner)
        }
    }

    fn handle(&mut self, cmd: TableCommand) {
        let now = Utc::now();
        match cmd {
            TableCommand::Join {
                player_id,
                name,
                buy_in,
                reply,
            } => {
                let _ = reply.send(self.table.join(&player_id, &name, buy_in, now));
            }
            TableCommand::Leave { player_id, reply } => {
                let _ = reply.send(self.table.leave(&player_id, now));
            }
            TableCommand::TakeSeat {
                player_id,
                seat,
                reply,
            } => {
                let _ = reply.send(self.table.request_seat(&player_id, seat, now));
            }
            TableCommand::LeaveSeat { player_id, reply } => {
                let _ = reply.send(self.table.request_leave_seat(&player_id, now));
            }
            TableCommand::UpdateStack {
                player_id,
                request,
                reply,
            } => {
                let _ = reply.send(self.table.request_stack_update(&player_id, request, now));
            }
            TableCommand::UpdateSettings {
                player_id,
                settings,
                reply,
            } => {
                let result = self
                    .owner_gate(&player_id)
                    .and_then(|()| self.table.update_settings(settings, now));
                let _ = reply.send(result);
            }
            TableCommand::Start { player_id, reply } => {
                let result = self
                    .owner_gate(&player_id)
                    .and_then(|()| self.table.start(now));
                let _ = reply.send(result);
            }
            TableCommand::Stop { player_id, reply } => {
                let result = self.owner_gate(&player_id).map(|()| self.table.stop(now));
                let _ = reply.send(result);
            }
            TableCommand::Pause { player_id, reply } => {
                let result = self.owner_gate(&player_id).map(|()| self.table.pause(now));
                let _ = reply.send(result);
            }
            TableCommand::Resume { player_id, reply } => {
                let result = self.owner_gate(&player_id).map(|()| self.table.resume(now));
                let _ = reply.send(result);
            }
            TableCommand::Act {
                player_id,
                action,
                reply,
            } => {
                let _ = reply.send(self.table.take_action(&player_id, action, now));
            }
            TableCommand::RevealSeed { player_id, reply } => {
                let result = self
                    .owner_gate(&player_id)
                    .and_then(|()| self.table.reveal_seed(now));
                let _ = reply.send(result);
            }
            TableCommand::GetView { viewer, reply } => {
                let _ = reply.send(self.table.view(viewer.as_deref()));
            }
            TableCommand::Subscribe { viewer, reply } => {
                let (tx, rx) = mpsc::unbounded_channel();
                // Seed the stream so new subscribers render immediately.
                let _ = tx.send(self.table.view(viewer.as_deref()));
                self.subscribers.push((viewer, tx));
                let _ = reply.send(rx);
            }
        }
    }

    fn sync_subscribers(&mut self) {
        if !self.table.is_dirty() {
            return;
        }
        let table = &self.table;
        self.subscribers
            .retain(|(viewer, tx)| tx.send(table.view(viewer.as_deref())).is_ok());
        self.table.unmark_dirty();
    }
}

/// Cheap, cloneable client for one table actor. All methods are async
/// request/response over the command channel; a closed channel surfaces
/// as [`TableError::TableClosed`].
#[derive(Clone)]
pub struct TableHandle {
    tx: mpsc::Sender<TableCommand>,
}

impl TableHandle {
    /// Move the table into its own task and return a handle to it.
    #[must_use]
    pub fn spawn(table: Table) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let actor = TableActor {
            table,
            inbox: rx,
            subscribers: Vec::new(),
        };
        tokio::spawn(actor.run());
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TableCommand,
    ) -> Result<T, TableError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| TableError::TableClosed)?;
        reply_rx.await.map_err(|_| TableError::TableClosed)
    }

    pub async fn join(
        &self,
        player_id: &str,
        name: &str,
        buy_in: Chips,
    ) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Join {
            player_id: player_id.to_string(),
            name: name.to_string(),
            buy_in,
            reply,
        })
        .await?
    }

    pub async fn leave(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Leave {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn take_seat(&self, player_id: &str, seat: SeatIndex) -> Result<(), TableError> {
        self.request(|reply| TableCommand::TakeSeat {
            player_id: player_id.to_string(),
            seat,
            reply,
        })
        .await?
    }

    pub async fn leave_seat(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::LeaveSeat {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn update_stack(
        &self,
        player_id: &str,
        request: StackRequest,
    ) -> Result<(), TableError> {
        self.request(|reply| TableCommand::UpdateStack {
            player_id: player_id.to_string(),
            request,
            reply,
        })
        .await?
    }

    pub async fn update_settings(
        &self,
        player_id: &str,
        settings: TableSettings,
    ) -> Result<(), TableError> {
        self.request(|reply| TableCommand::UpdateSettings {
            player_id: player_id.to_string(),
            settings,
            reply,
        })
        .await?
    }

    pub async fn start(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Start {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn stop(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Stop {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn pause(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Pause {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn resume(&self, player_id: &str) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Resume {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn act(&self, player_id: &str, action: PlayerAction) -> Result<(), TableError> {
        self.request(|reply| TableCommand::Act {
            player_id: player_id.to_string(),
            action,
            reply,
        })
        .await?
    }

    /// Fetch the committed shuffle seed once no hand can still use it.
    /// Owner only; the table rotates to a fresh seed on reveal.
    pub async fn reveal_seed(&self, player_id: &str) -> Result<String, TableError> {
        self.request(|reply| TableCommand::RevealSeed {
            player_id: player_id.to_string(),
            reply,
        })
        .await?
    }

    pub async fn view(&self, viewer: Option<String>) -> Result<TableView, TableError> {
        self.request(|reply| TableCommand::GetView { viewer, reply })
            .await
    }

    /// Subscribe to masked view pushes. The first view arrives
    /// immediately; later ones whenever the table changed.
    pub async fn subscribe(
        &self,
        viewer: Option<String>,
    ) -> Result<mpsc::UnboundedReceiver<TableView>, TableError> {
        self.request(|reply| TableCommand::Subscribe { viewer, reply })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spawn_table() -> TableHandle {
        let table = Table::new("t1", "owner", TableSettings::default(), Utc::now()).unwrap();
        TableHandle::spawn(table)
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let handle = spawn_table();
        handle.join("owner", "Owner", 1000).await.unwrap();
        handle.join("guest", "Guest", 1000).await.unwrap();
        handle.take_seat("owner", 0).await.unwrap();
        handle.take_seat("guest", 1).await.unwrap();

        assert_eq!(
            handle.reveal_seed("guest").await,
            Err(TableError::NotOwner)
        );
        handle.reveal_seed("owner").await.unwrap();

        assert_eq!(handle.start("guest").await, Err(TableError::NotOwner));
        handle.start("owner").await.unwrap();

        assert_eq!(
            handle.reveal_seed("owner").await,
            Err(TableError::HandInProgress)
        );

        let view = handle.view(Some("owner".to_string())).await.unwrap();
        assert!(view.hand.is_some());
    }

    #[tokio::test]
    async fn test_subscription_seeds_an_initial_view() {
        let handle = spawn_table();
        let mut rx = handle.subscribe(None).await.unwrap();
        let view = rx.recv().await.unwrap();
        assert_eq!(view.id, "t1");
        assert!(view.hand.is_none());
    }

    #[tokio::test]
    async fn test_auto_actions_advance_an_unattended_table() {
        // Aggressive pacing so timeouts and reveals fire within the
        // test's real-time budget.
        let settings = TableSettings {
            action_time_ms: 50,
            show_down_time_ms: 10,
            game_speed_ms: 10,
            ..TableSettings::default()
        };
        let table = Table::new("t2", "owner", settings, Utc::now()).unwrap();
        let handle = TableHandle::spawn(table);
        handle.join("owner", "Owner", 1000).await.unwrap();
        handle.join("guest", "Guest", 1000).await.unwrap();
        handle.take_seat("owner", 0).await.unwrap();
        handle.take_seat("guest", 1).await.unwrap();
        handle.start("owner").await.unwrap();

        // Nobody acts; the deadline driver must finish hands by itself.
        tokio::time::sleep(Duration::from_secs(3)).await;
        let view = handle.view(None).await.unwrap();
        assert!(view.hands_played >= 1);
    }
}
