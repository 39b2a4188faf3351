use crate::net::{HOST_PEER_ID, MAX_PLAYERS, PeerId, PlayerListPacket};

/// The four player slots. Slot 0 is permanently the hosting server's own
/// player; remote peers claim slots 1..=3 on connect and free them on
/// disconnect, HOST_PEER_ID never moves.
#[derive(Debug)]
pub struct PlayerSlots {
    peers: [Option<PeerId>; MAX_PLAYERS],
}

impl Default for PlayerSlots {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerSlots {
    pub fn new() -> Self {
        let mut peers = [None; MAX_PLAYERS];
        peers[0] = Some(HOST_PEER_ID);
        Self { peers }
    }

    /// Assigns the lowest free non-host slot, or `None` when all three
    /// client slots are taken.
    pub fn claim(&mut self, peer: PeerId) -> Option<u8> {
        if self.slot_of(peer).is_some() {
            return self.slot_of(peer);
        }
        for slot in 1..MAX_PLAYERS {
            if self.peers[slot].is_none() {
                self.peers[slot] = Some(peer);
                return Some(slot as u8);
            }
        }
        None
    }

    pub fn release(&mut self, peer: PeerId) -> Option<u8> {
        for slot in 1..MAX_PLAYERS {
            if self.peers[slot] == Some(peer) {
                self.peers[slot] = None;
                return Some(slot as u8);
            }
        }
        None
    }

    pub fn slot_of(&self, peer: PeerId) -> Option<u8> {
        self.peers
            .iter()
            .position(|&p| p == Some(peer))
            .map(|s| s as u8)
    }

    pub fn peer_at(&self, slot: u8) -> Option<PeerId> {
        self.peers.get(slot as usize).copied().flatten()
    }

    pub fn occupied(&self) -> impl Iterator<Item = (u8, PeerId)> + '_ {
        self.peers
            .iter()
            .enumerate()
            .filter_map(|(slot, peer)| peer.map(|p| (slot as u8, p)))
    }

    pub fn to_packet(&self) -> PlayerListPacket {
        PlayerListPacket { slots: self.peers }
    }
}
