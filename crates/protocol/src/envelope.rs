use serde::{Deserialize, Serialize};

use crate::constants::{Command, Status};

/// Envelope for all WebSocket communication.
///
/// Field names are kept short on the wire (`com`, `c`, `cn`, `s`, `m`) to
/// match the browser clients. The encoded text is cached in `raw` so a
/// message can be re-sent to many recipients without re-serializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    raw: String,
    #[serde(rename = "com")]
    pub command: Command,
    #[serde(rename = "c", default)]
    pub client_number: u64,
    #[serde(rename = "cn", default, skip_serializing_if = "Vec::is_empty")]
    pub client_numbers: Vec<u64>,
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(rename = "m", default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Message {
    /// Creates a message with no status, roster or text.
    pub fn new(command: Command, client_number: u64) -> Self {
        Self {
            raw: String::new(),
            command,
            client_number,
            client_numbers: Vec::new(),
            status: None,
            message: String::new(),
        }
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_client_numbers(mut self, client_numbers: Vec<u64>) -> Self {
        self.client_numbers = client_numbers;
        self
    }

    pub fn with_text(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Decodes a frame payload, keeping the normalized text as the raw form.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let raw = normalize(payload);
        let mut msg: Message = serde_json::from_str(&raw)?;
        msg.raw = raw;
        Ok(msg)
    }

    /// Serializes the message and caches the result as its raw form.
    pub fn sealed(mut self) -> Result<Self, serde_json::Error> {
        self.raw = serde_json::to_string(&self)?;
        Ok(self)
    }

    /// Returns the cached wire text. Empty until decoded or sealed.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Folds newlines into spaces and trims surrounding whitespace so a decoded
/// payload never carries the batch separator.
pub fn normalize(payload: &str) -> String {
    payload.replace('\n', " ").trim().to_string()
}
