//! Per-connection task pair.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, Stream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use slidecast_protocol::constants::{
    WS_MAX_MESSAGE_SIZE, WS_PING_PERIOD, WS_PONG_WAIT, WS_WRITE_WAIT,
};

use crate::pumps::{read_pump, write_pump};
use crate::{ClientId, Frame, HubHandle, MailboxReceiver, Role};

/// Timing and size limits applied to one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Deadline for a single outbound write.
    pub write_wait: Duration,
    /// Read-idle deadline, reset by any inbound frame.
    pub pong_wait: Duration,
    /// Liveness ping period. Must be below `pong_wait`.
    pub ping_period: Duration,
    /// Largest accepted inbound payload in bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            write_wait: WS_WRITE_WAIT,
            pong_wait: WS_PONG_WAIT,
            ping_period: WS_PING_PERIOD,
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }
}

/// Handle to a registered connection's read and write cycles.
#[derive(Debug)]
pub struct Connection {
    id: ClientId,
    role: Role,
    cancel: CancellationToken,
    read: JoinHandle<()>,
    write: JoinHandle<()>,
}

impl Connection {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Asks both cycles to stop. The read cycle still unregisters on exit.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits until both cycles have finished.
    pub async fn closed(self) {
        let _ = self.read.await;
        let _ = self.write.await;
        debug!(client = self.id, "connection finished");
    }
}

/// Starts the read and write cycles for an already registered connection.
///
/// `mailbox` must be the receiving half of the mailbox handed to
/// [`HubHandle::register`] for `id`.
pub fn spawn_connection<W, R, E>(
    id: ClientId,
    role: Role,
    sink: W,
    stream: R,
    mailbox: MailboxReceiver,
    hub: HubHandle,
    limits: ConnectionLimits,
) -> Connection
where
    W: Sink<Frame, Error = E> + Unpin + Send + 'static,
    R: Stream<Item = Result<Frame, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    let cancel = CancellationToken::new();
    debug!(client = id, ?role, "starting connection cycles");

    let read = tokio::spawn(read_pump(stream, id, hub, limits, cancel.clone()));
    let write = tokio::spawn(write_pump(sink, id, mailbox, limits, cancel.clone()));

    Connection {
        id,
        role,
        cancel,
        read,
        write,
    }
}
