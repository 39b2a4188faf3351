use std::collections::HashMap;

use glam::Vec3;
use log::debug;

use crate::net::{
    DeltaStatePacket, FullStatePacket, HOST_PEER_ID, InputPacket, LifecycleEvent, LifecyclePacket,
    MAX_PLAYERS, Packet, PacketType, PeerId, PlayerStatusPacket, RoundStatePacket, Transport,
    TransportEvent,
};
use crate::player::Buttons;
use crate::replication::{ApplyResult, Mirror, SyncError};
use crate::round::{RoundState, RoundTransition};
use crate::session::SessionEvent;

/// The replica end of a session. Holds a mirror per server entity and a
/// follower copy of the round state; never simulates on its own.
pub struct ClientSession<T: Transport> {
    transport: T,
    mirrors: HashMap<u32, Mirror>,
    round: RoundState,
    player_list: [Option<PeerId>; MAX_PLAYERS],
    /// (sprint, fire) cooldown seconds per slot, from status broadcasts.
    slot_status: [(f32, f32); MAX_PLAYERS],
    /// Highest state id applied to any mirror, echoed back as the ack.
    last_state_id: u32,
    connected: bool,
    events: Vec<SessionEvent>,
}

impl<T: Transport> ClientSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            mirrors: HashMap::new(),
            round: RoundState::new(),
            player_list: [None; MAX_PLAYERS],
            slot_status: [(0.0, 0.0); MAX_PLAYERS],
            last_state_id: 0,
            connected: false,
            events: Vec::new(),
        }
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn mirror(&self, net_id: u32) -> Option<&Mirror> {
        self.mirrors.get(&net_id)
    }

    pub fn mirrors(&self) -> impl Iterator<Item = &Mirror> {
        self.mirrors.values()
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    pub fn player_list(&self) -> &[Option<PeerId>; MAX_PLAYERS] {
        &self.player_list
    }

    pub fn slot_status(&self, slot: u8) -> (f32, f32) {
        self.slot_status[slot as usize]
    }

    pub fn last_state_id(&self) -> u32 {
        self.last_state_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drains everything the server sent since the last call and folds it
    /// into the local replica.
    pub fn update(&mut self) -> Result<(), SyncError> {
        for (peer, packet) in self.transport.receive()? {
            if peer != HOST_PEER_ID {
                debug!("ignoring packet from non-host peer {peer}");
                continue;
            }
            self.dispatch(packet);
        }

        // The transport notices the host during `receive`, so events are
        // polled after draining it.
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::PeerConnected(_) => self.connected = true,
                TransportEvent::PeerDisconnected(_) => self.connected = false,
            }
        }
        Ok(())
    }

    /// Ships this frame's input, piggybacking the newest applied state id so
    /// the server can retire acknowledged history.
    pub fn send_input(&mut self, pointer: Vec3, buttons: Buttons) -> Result<(), SyncError> {
        let packet = InputPacket {
            pointer: pointer.to_array(),
            buttons: buttons.bits(),
            last_ack_id: self.last_state_id,
        };
        self.transport
            .send(HOST_PEER_ID, PacketType::ClientInput(packet))?;
        Ok(())
    }

    fn dispatch(&mut self, packet: Packet) {
        match packet.payload {
            PacketType::FullState(full) => self.on_full_state(full),
            PacketType::DeltaState(delta) => self.on_delta_state(delta),
            PacketType::PlayerListUpdate(list) => self.player_list = list.slots,
            PacketType::RoundState(round) => self.on_round_state(round),
            PacketType::PlayerStatusUpdate(status) => self.on_player_status(status),
            PacketType::EntityLifecycle(lifecycle) => self.on_lifecycle(lifecycle),
            PacketType::ClientInput(_) => {
                debug!("ignoring server-bound input packet");
            }
        }
    }

    fn on_full_state(&mut self, full: FullStatePacket) {
        let Some(mirror) = self.mirrors.get_mut(&full.net_id) else {
            debug!("full state for unknown entity {}", full.net_id);
            return;
        };
        if mirror.apply_full(&full.state) == ApplyResult::Applied {
            self.last_state_id = self.last_state_id.max(full.state.state_id);
        }
    }

    fn on_delta_state(&mut self, delta: DeltaStatePacket) {
        let Some(mirror) = self.mirrors.get_mut(&delta.net_id) else {
            debug!("delta state for unknown entity {}", delta.net_id);
            return;
        };
        match mirror.apply_delta(&delta) {
            ApplyResult::Applied => {
                self.last_state_id = self.last_state_id.max(delta.state_id);
            }
            ApplyResult::MissingBase => {
                // A full snapshot will arrive within the cadence window.
                debug!(
                    "delta base {} missing for entity {}, waiting for full",
                    delta.base_id, delta.net_id
                );
            }
            ApplyResult::Stale => {}
        }
    }

    fn on_round_state(&mut self, round: RoundStatePacket) {
        match self.round.apply_remote(&round) {
            RoundTransition::Started => {
                // Server ids restarted from zero; drop everything stale.
                self.mirrors.clear();
                self.last_state_id = 0;
                debug!("round started");
                self.events.push(SessionEvent::RoundStarted);
            }
            RoundTransition::Ended => {
                debug!("round over, scores {:?}", self.round.scores);
                self.events.push(SessionEvent::RoundEnded);
            }
            RoundTransition::None => {}
        }
    }

    fn on_player_status(&mut self, status: PlayerStatusPacket) {
        if let Some(entry) = self.slot_status.get_mut(status.slot as usize) {
            *entry = (status.sprint_cooldown, status.fire_cooldown);
        }
    }

    fn on_lifecycle(&mut self, lifecycle: LifecyclePacket) {
        match lifecycle.event {
            LifecycleEvent::Spawned => {
                debug!("entity {} spawned", lifecycle.net_id);
                self.mirrors
                    .insert(lifecycle.net_id, Mirror::from_spawn(&lifecycle));
            }
            LifecycleEvent::Despawned => {
                if self.mirrors.remove(&lifecycle.net_id).is_none() {
                    debug!("despawn for unknown entity {}", lifecycle.net_id);
                }
            }
        }
    }
}
