//! Connection cycles: one task reading from the socket, one writing to it.

mod read;
mod write;

pub(crate) use read::read_pump;
pub(crate) use write::write_pump;
