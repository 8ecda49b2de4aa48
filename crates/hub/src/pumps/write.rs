//! WebSocket write pump: drains the mailbox and keeps the peer alive.

use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::time::{Instant, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use slidecast_protocol::Message;
use slidecast_protocol::constants::BATCH_SEPARATOR;

use crate::{ClientId, ConnectionLimits, Frame, MailboxReceiver};

enum WriteError<E> {
    Sink(E),
    Deadline(Duration),
}

impl<E: Display> Display for WriteError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sink(e) => write!(f, "{e}"),
            Self::Deadline(wait) => write!(f, "write did not complete within {wait:?}"),
        }
    }
}

/// Writes mailbox items to the socket and pings on a fixed period.
///
/// Items already queued when one is taken are sent with it as a single
/// text frame. When the hub closes the mailbox a close frame is sent and
/// the cycle ends.
pub(crate) async fn write_pump<S, E>(
    mut write: S,
    id: ClientId,
    mut mailbox: MailboxReceiver,
    limits: ConnectionLimits,
    cancel: CancellationToken,
) where
    S: Sink<Frame, Error = E> + Unpin,
    E: Display,
{
    let wait = limits.write_wait;
    let mut ticker = interval_at(Instant::now() + limits.ping_period, limits.ping_period);

    loop {
        tokio::select! {
            biased;

            item = mailbox.recv() => {
                let Some(first) = item else {
                    debug!(client = id, "mailbox closed, sending close frame");
                    let _ = send_within(&mut write, Frame::Close(None), wait).await;
                    break;
                };
                let batch = coalesce(first, &mut mailbox);
                if let Err(e) = send_within(&mut write, Frame::Text(batch), wait).await {
                    warn!(client = id, "WebSocket write error: {e}");
                    break;
                }
            }

            _ = ticker.tick() => {
                trace!(client = id, "sending ping");
                if let Err(e) = send_within(&mut write, Frame::Ping(Vec::new()), wait).await {
                    warn!(client = id, "ping failed: {e}");
                    break;
                }
            }

            _ = cancel.cancelled() => {
                let _ = send_within(&mut write, Frame::Close(None), wait).await;
                break;
            }
        }
    }

    cancel.cancel();
    let _ = timeout(wait, write.close()).await;
}

/// Joins `first` with the items queued behind it when the batch starts.
/// Items enqueued while joining wait for the next frame.
fn coalesce(first: Arc<Message>, mailbox: &mut MailboxReceiver) -> String {
    let mut batch = first.raw().to_owned();
    for _ in 0..mailbox.len() {
        let Ok(next) = mailbox.try_recv() else {
            break;
        };
        batch.push(BATCH_SEPARATOR);
        batch.push_str(next.raw());
    }
    batch
}

async fn send_within<S, E>(write: &mut S, frame: Frame, wait: Duration) -> Result<(), WriteError<E>>
where
    S: Sink<Frame, Error = E> + Unpin,
{
    match timeout(wait, write.send(frame)).await {
        Ok(result) => result.map_err(WriteError::Sink),
        Err(_) => Err(WriteError::Deadline(wait)),
    }
}
