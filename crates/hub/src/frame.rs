//! Transport-neutral WebSocket frame.
//!
//! The connection cycles read and write [`Frame`]s so they can run over any
//! `Stream`/`Sink` pair; the server adapts its WebSocket type at the edge.

/// One WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close frame with an optional reason.
    Close(Option<String>),
}

impl Frame {
    /// Payload size in bytes as seen on the wire.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) | Self::Ping(data) | Self::Pong(data) => data.len(),
            Self::Close(reason) => reason.as_ref().map_or(0, String::len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
