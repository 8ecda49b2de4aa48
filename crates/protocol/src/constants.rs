use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Time allowed to write a WebSocket message.
pub const WS_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time to wait for a pong (or any incoming frame) from a peer.
///
/// This acts as a read deadline: if nothing arrives within this window the
/// connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send pings. Must be less than [`WS_PONG_WAIT`].
pub const WS_PING_PERIOD: Duration = Duration::from_secs(WS_PONG_WAIT.as_secs() * 9 / 10);

/// Maximum inbound message size in bytes.
pub const WS_MAX_MESSAGE_SIZE: usize = 512;

/// Path of the WebSocket upgrade endpoint.
pub const WS_PATH: &str = "/ws";

/// Path of the endpoint returning the current presenter code.
pub const CODE_PATH: &str = "/code";

/// Query parameter carrying the claimed presenter code on upgrade.
pub const TOTP_QUERY_PARAM: &str = "totp";

/// Separator between coalesced messages inside one outbound frame.
pub const BATCH_SEPARATOR: char = '\n';

/// Message command identifier (`com` on the wire).
///
/// Values outside the known set are kept as [`Command::Other`] so they can
/// still be routed by their numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Command {
    HideControls,
    ShowControls,
    Slided,
    Paused,
    Resumed,
    StatusRequest,
    StatusReply,
    OverviewShown,
    OverviewHidden,
    Connected,
    FragmentShown,
    ClientStats,
    DisplayNotification,
    /// Forward compatibility: unknown command values land here.
    Other(i64),
}

impl From<i64> for Command {
    fn from(value: i64) -> Self {
        match value {
            1 => Self::HideControls,
            2 => Self::ShowControls,
            3 => Self::Slided,
            4 => Self::Paused,
            5 => Self::Resumed,
            6 => Self::StatusRequest,
            7 => Self::StatusReply,
            8 => Self::OverviewShown,
            9 => Self::OverviewHidden,
            10 => Self::Connected,
            11 => Self::FragmentShown,
            12 => Self::ClientStats,
            13 => Self::DisplayNotification,
            other => Self::Other(other),
        }
    }
}

impl From<Command> for i64 {
    fn from(command: Command) -> Self {
        match command {
            Command::HideControls => 1,
            Command::ShowControls => 2,
            Command::Slided => 3,
            Command::Paused => 4,
            Command::Resumed => 5,
            Command::StatusRequest => 6,
            Command::StatusReply => 7,
            Command::OverviewShown => 8,
            Command::OverviewHidden => 9,
            Command::Connected => 10,
            Command::FragmentShown => 11,
            Command::ClientStats => 12,
            Command::DisplayNotification => 13,
            Command::Other(value) => value,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HideControls => "HideControls",
            Self::ShowControls => "ShowControls",
            Self::Slided => "Slided",
            Self::Paused => "Paused",
            Self::Resumed => "Resumed",
            Self::StatusRequest => "StatusRequest",
            Self::StatusReply => "StatusReply",
            Self::OverviewShown => "OverviewShown",
            Self::OverviewHidden => "OverviewHidden",
            Self::Connected => "Connected",
            Self::FragmentShown => "FragmentShown",
            Self::ClientStats => "ClientStats",
            Self::DisplayNotification => "DisplayNotification",
            Self::Other(value) => return write!(f, "Unknown({value})"),
        };
        f.write_str(name)
    }
}

/// Per-viewer status (`s` on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Status {
    Unknown,
    FocusedIn,
    FocusedOut,
    Disconnected,
    Connected,
    SelfConnected,
    Other(i64),
}

impl From<i64> for Status {
    fn from(value: i64) -> Self {
        match value {
            -1 => Self::Unknown,
            1 => Self::FocusedIn,
            2 => Self::FocusedOut,
            3 => Self::Disconnected,
            4 => Self::Connected,
            5 => Self::SelfConnected,
            other => Self::Other(other),
        }
    }
}

impl From<Status> for i64 {
    fn from(status: Status) -> Self {
        match status {
            Status::Unknown => -1,
            Status::FocusedIn => 1,
            Status::FocusedOut => 2,
            Status::Disconnected => 3,
            Status::Connected => 4,
            Status::SelfConnected => 5,
            Status::Other(value) => value,
        }
    }
}
