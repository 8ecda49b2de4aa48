//! Connection hub for slidecast sessions.
//!
//! A single [`Hub`] task owns the registry of connected peers and decides
//! where every inbound message goes. Each peer runs a read and a write
//! cycle ([`spawn_connection`]) that talk to the hub only through bounded
//! channels, so the registry is never shared between tasks.

mod connection;
mod frame;
mod hub;
mod pumps;

use std::sync::Arc;

use tokio::sync::mpsc;

use slidecast_protocol::Message;

pub use connection::{Connection, ConnectionLimits, spawn_connection};
pub use frame::Frame;
pub use hub::{Hub, HubHandle};

/// Outbound mailbox capacity per connection. A peer that falls this far
/// behind is evicted.
pub const MAILBOX_CAPACITY: usize = 15;

/// Identity assigned to a connection on registration.
pub type ClientId = u64;

/// Sending half of a connection mailbox. Only the hub holds one.
pub type MailboxSender = mpsc::Sender<Arc<Message>>;

/// Receiving half of a connection mailbox, drained by the write cycle.
pub type MailboxReceiver = mpsc::Receiver<Arc<Message>>;

/// Creates a bounded mailbox with [`MAILBOX_CAPACITY`] slots.
pub fn mailbox() -> (MailboxSender, MailboxReceiver) {
    mpsc::channel(MAILBOX_CAPACITY)
}

/// Role a connection plays in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Presenter,
    Viewer,
}

/// Errors produced by the hub.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("presenter already connected")]
    PresenterTaken,

    #[error("hub is no longer running")]
    HubClosed,
}

/// A frame that violates the wire protocol. Always fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message too large ({size} bytes, limit {limit})")]
    Oversized { size: usize, limit: usize },

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
