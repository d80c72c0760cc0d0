//! Background tasks driving one client WebSocket.

pub(crate) mod ping;
pub(crate) mod read;
pub(crate) mod write;
