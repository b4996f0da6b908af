//! Command protocol between [`super::actor::TableHandle`] clones and the
//! actor task that owns the table.

use tokio::sync::{mpsc, oneshot};

use crate::game::entities::{Chips, PlayerId, SeatIndex};
use crate::game::errors::TableError;
use crate::game::hand::PlayerAction;

use super::config::TableSettings;
use super::table::{StackRequest, TableView};

type Reply<T> = oneshot::Sender<T>;
type Ack = Reply<Result<(), TableError>>;

/// One request into the actor. Every command carries its own reply
/// channel; a dropped reply means the caller went away and is ignored.
#[derive(Debug)]
pub enum TableCommand {
    Join {
        player_id: PlayerId,
        name: String,
        buy_in: Chips,
        reply: Ack,
    },
    Leave {
        player_id: PlayerId,
        reply: Ack,
    },
    TakeSeat {
        player_id: PlayerId,
        seat: SeatIndex,
        reply: Ack,
    },
    LeaveSeat {
        player_id: PlayerId,
        reply: Ack,
    },
    UpdateStack {
        player_id: PlayerId,
        request: StackRequest,
        reply: Ack,
    },
    UpdateSettings {
        player_id: PlayerId,
        settings: TableSettings,
        reply: Ack,
    },
    Start {
        player_id: PlayerId,
        reply: Ack,
    },
    Stop {
        player_id: PlayerId,
        reply: Ack,
    },
    Pause {
        player_id: PlayerId,
        reply: Ack,
    },
    Resume {
        player_id: PlayerId,
        reply: Ack,
    },
    Act {
        player_id: PlayerId,
        action: PlayerAction,
        reply: Ack,
    },
    RevealSeed {
        player_id: PlayerId,
        reply: Reply<Result<String, TableError>>,
    },
    GetView {
        viewer: Option<PlayerId>,
        reply: Reply<TableView>,
    },
    Subscribe {
        viewer: Option<PlayerId>,
        reply: Reply<mpsc::UnboundedReceiver<TableView>>,
    },
}
