mod client;
mod server;
mod slots;

pub use client::ClientSession;
pub use server::ServerSession;
pub use slots::PlayerSlots;

use crate::net::PeerId;

/// Session-level happenings surfaced to the embedding binary for logging
/// and flow control; everything else is handled internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    PlayerJoined { peer: PeerId, slot: u8 },
    PlayerLeft { peer: PeerId, slot: u8 },
    RoundStarted,
    RoundEnded,
}
