//! Wire protocol shared by the slidecast hub and the browser clients.

pub mod constants;
pub mod envelope;

// Re-export primary types for convenience.
pub use constants::{Command, Status};
pub use envelope::Message;
