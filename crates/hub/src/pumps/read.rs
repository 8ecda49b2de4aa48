//! WebSocket read pump: decodes inbound frames and hands them to the hub.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use slidecast_protocol::Message;

use crate::{ClientId, ConnectionLimits, Frame, HubHandle, ProtocolError};

/// Reads frames until the peer goes away, then unregisters it.
///
/// Any inbound frame resets the read deadline. A protocol violation
/// (oversized payload, invalid UTF-8, undecodable JSON) ends the
/// connection.
pub(crate) async fn read_pump<S, E>(
    mut read: S,
    id: ClientId,
    hub: HubHandle,
    limits: ConnectionLimits,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    let deadline = sleep(limits.pong_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut deadline => {
                warn!(client = id, "read deadline expired, closing");
                break;
            }

            frame = read.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        warn!(client = id, "WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!(client = id, "WebSocket stream ended");
                        break;
                    }
                };
                deadline.as_mut().reset(Instant::now() + limits.pong_wait);

                let payload = match frame {
                    Frame::Text(text) => Ok(text),
                    Frame::Binary(data) => {
                        String::from_utf8(data).map_err(|_| ProtocolError::NotUtf8)
                    }
                    Frame::Ping(_) | Frame::Pong(_) => {
                        trace!(client = id, "keepalive frame");
                        continue;
                    }
                    Frame::Close(reason) => {
                        debug!(client = id, ?reason, "received close frame");
                        break;
                    }
                };
                let message = match payload.and_then(|text| decode(&text, limits.max_message_size)) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(client = id, "dropping connection: {e}");
                        break;
                    }
                };

                trace!(client = id, command = %message.command, "received message");
                if hub.route(id, message).await.is_err() {
                    debug!(client = id, "hub stopped, closing");
                    break;
                }
            }
        }
    }

    if let Err(e) = hub.unregister(id).await {
        debug!(client = id, "unregister skipped: {e}");
    }
    cancel.cancel();
}

fn decode(text: &str, limit: usize) -> Result<Message, ProtocolError> {
    if text.len() > limit {
        return Err(ProtocolError::Oversized {
            size: text.len(),
            limit,
        });
    }
    Ok(Message::decode(text)?)
}
