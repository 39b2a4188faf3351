use std::collections::HashMap;

use glam::Vec3;
use log::{debug, warn};

use crate::net::{
    InputPacket, MAX_PLAYERS, Packet, PacketType, PeerId, PlayerStatusPacket, RoundPhase,
    Transport, TransportEvent,
};
use crate::player::{
    self, Buttons, PROJECTILE_HIT_RADIUS, PROJECTILE_SPAWN_DISTANCE, PROJECTILE_SPEED,
    SCORE_PER_HIT, SPAWN_POINTS,
};
use crate::replication::{
    AckTracker, Entity, EntityData, ReplicationContext, SnapshotBroadcaster, SyncError,
    prune_histories,
};
use crate::round::RoundState;
use crate::session::{PlayerSlots, SessionEvent};

/// The authoritative end of a session. Owns every live entity, drives the
/// simulation, and feeds the snapshot broadcaster once per tick.
pub struct ServerSession<T: Transport> {
    transport: T,
    slots: PlayerSlots,
    ctx: ReplicationContext,
    broadcaster: SnapshotBroadcaster,
    acks: AckTracker,
    round: RoundState,
    entities: HashMap<u32, Entity>,
    /// Net id of each slot's player entity while a round is running.
    player_entities: [Option<u32>; MAX_PLAYERS],
    events: Vec<SessionEvent>,
}

impl<T: Transport> ServerSession<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slots: PlayerSlots::new(),
            ctx: ReplicationContext::new(),
            broadcaster: SnapshotBroadcaster::new(),
            acks: AckTracker::new(),
            round: RoundState::new(),
            entities: HashMap::new(),
            player_entities: [None; MAX_PLAYERS],
            events: Vec::new(),
        }
    }

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn slots(&self) -> &PlayerSlots {
        &self.slots
    }

    pub fn entity(&self, net_id: u32) -> Option<&Entity> {
        self.entities.get(&net_id)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn player_net_id(&self, slot: u8) -> Option<u32> {
        self.player_entities
            .get(slot as usize)
            .copied()
            .flatten()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Applies the hosting player's own input for this tick, bypassing the
    /// wire. Slot 0 always belongs to the host.
    pub fn set_local_input(&mut self, pointer: Vec3, buttons: Buttons) -> Result<(), SyncError> {
        if self.round.is_active() {
            self.apply_player_input(0, pointer, buttons)?;
        }
        Ok(())
    }

    /// Leaves the lobby (or a finished round): resets ids and scores, clears
    /// the field, and spawns one player entity per occupied slot.
    pub fn start_round(&mut self) -> Result<(), SyncError> {
        // A restart of a running round must read as end-then-start on
        // replicas, or they would never drop their stale mirrors.
        if self.round.is_active() {
            self.finish_round()?;
        }
        self.entities.clear();
        self.player_entities = [None; MAX_PLAYERS];
        self.ctx.reset_round();
        // Acks from the previous round reference retired state ids.
        self.acks.clear();
        self.round.start();
        self.transport
            .broadcast(PacketType::RoundState(self.round.to_packet()))?;

        let occupied: Vec<(u8, PeerId)> = self.slots.occupied().collect();
        for (slot, _) in occupied {
            self.spawn_player(slot)?;
        }

        debug!("round started with {} players", self.entities.len());
        self.events.push(SessionEvent::RoundStarted);
        Ok(())
    }

    /// One fixed-rate tick: ingest connections and input, advance the
    /// simulation, then broadcast state.
    pub fn update(&mut self, dt: f32) -> Result<(), SyncError> {
        for event in self.transport.poll_events() {
            match event {
                TransportEvent::PeerConnected(peer) => self.on_peer_connected(peer)?,
                TransportEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer)?,
            }
        }

        for (peer, packet) in self.transport.receive()? {
            self.dispatch(peer, packet)?;
        }

        if self.round.is_active() {
            self.simulate(dt)?;
            if self.round.tick(dt) {
                self.finish_round()?;
            }
        }

        self.broadcast_state()?;
        Ok(())
    }

    fn on_peer_connected(&mut self, peer: PeerId) -> Result<(), SyncError> {
        match self.slots.claim(peer) {
            Some(slot) => {
                debug!("peer {peer} joined as player {slot}");
                self.events.push(SessionEvent::PlayerJoined { peer, slot });
                if self.round.phase() != RoundPhase::Lobby {
                    self.catch_up(peer)?;
                }
            }
            None => {
                // The transport caps connections at the slot count, so this
                // only fires if a stale peer table entry lingered.
                warn!("peer {peer} connected but no slot is free");
            }
        }
        Ok(())
    }

    /// A peer arriving mid-round missed the spawn broadcasts. Replay the
    /// round state and every live entity's spawn, each followed by its
    /// newest full snapshot, so the joiner can mirror immediately instead
    /// of dropping snapshots until the next round.
    fn catch_up(&mut self, peer: PeerId) -> Result<(), SyncError> {
        self.transport
            .send(peer, PacketType::RoundState(self.round.to_packet()))?;
        for entity in self.entities.values() {
            self.transport
                .send(peer, PacketType::EntityLifecycle(entity.spawn_packet()))?;
            if let Some(full) = entity.history.encode_full(entity.net_id) {
                self.transport.send(peer, PacketType::FullState(full))?;
            }
        }
        Ok(())
    }

    fn on_peer_disconnected(&mut self, peer: PeerId) -> Result<(), SyncError> {
        self.acks.remove(peer);
        let Some(slot) = self.slots.release(peer) else {
            return Ok(());
        };
        debug!("peer {peer} left, freeing player {slot}");
        self.events.push(SessionEvent::PlayerLeft { peer, slot });

        if let Some(net_id) = self.player_entities[slot as usize].take() {
            self.despawn(net_id)?;
        }

        // With only the host left there is nobody to play against; drop
        // back to the lobby until someone joins again.
        if self.round.phase() != RoundPhase::Lobby && self.slots.occupied().count() <= 1 {
            let leftovers: Vec<u32> = self.entities.keys().copied().collect();
            for net_id in leftovers {
                self.despawn(net_id)?;
            }
            self.player_entities = [None; MAX_PLAYERS];
            self.round.back_to_lobby();
            self.transport
                .broadcast(PacketType::RoundState(self.round.to_packet()))?;
        }
        Ok(())
    }

    fn dispatch(&mut self, peer: PeerId, packet: Packet) -> Result<(), SyncError> {
        match packet.payload {
            PacketType::ClientInput(input) => self.on_client_input(peer, input),
            other => {
                debug!("ignoring {} packet from peer {peer}", other.tag());
                Ok(())
            }
        }
    }

    fn on_client_input(&mut self, peer: PeerId, input: InputPacket) -> Result<(), SyncError> {
        let Some(slot) = self.slots.slot_of(peer) else {
            warn!("dropping input from unknown source {peer}");
            return Ok(());
        };

        // State ids start at 1; an ack of 0 means the client has applied
        // nothing yet and must not drag the pruning floor down.
        if input.last_ack_id > 0 {
            self.acks.record(peer, input.last_ack_id);
        }

        if !self.round.is_active() {
            return Ok(());
        }
        let pointer = Vec3::from_array(input.pointer);
        self.apply_player_input(slot, pointer, Buttons::from_bits_truncate(input.buttons))
    }

    fn apply_player_input(
        &mut self,
        slot: u8,
        pointer: Vec3,
        buttons: Buttons,
    ) -> Result<(), SyncError> {
        let Some(net_id) = self.player_entities[slot as usize] else {
            return Ok(());
        };
        let mut fired = None;
        if let Some(entity) = self.entities.get_mut(&net_id) {
            entity.orientation = player::face_pointer(entity.position, pointer);
            let forward = player::forward(entity.orientation);
            let held = buttons & (Buttons::UP | Buttons::DOWN | Buttons::RIGHT | Buttons::LEFT);
            if let Some(data) = entity.player_data_mut() {
                data.buttons = held;
            }

            if buttons.contains(Buttons::SPRINT)
                && entity.player_data_mut().is_some_and(|d| d.try_sprint())
            {
                entity.position += forward * player::SPRINT_DASH;
            }
            if buttons.contains(Buttons::FIRE)
                && entity.player_data_mut().is_some_and(|d| d.try_fire())
            {
                let muzzle = entity.position + forward * PROJECTILE_SPAWN_DISTANCE;
                fired = Some((slot, muzzle, forward * PROJECTILE_SPEED));
            }
        }
        if let Some((slot, muzzle, velocity)) = fired {
            self.spawn_projectile(slot, muzzle, velocity)?;
        }
        Ok(())
    }

    fn simulate(&mut self, dt: f32) -> Result<(), SyncError> {
        // Players: ability timers and held-button movement.
        for entity in self.entities.values_mut() {
            if let EntityData::Player(data) = &mut entity.data {
                data.tick(dt);
                player::step_movement(&mut entity.position, data.buttons, dt);
            }
        }

        // Projectiles: integrate, expire, and test against players.
        let players: Vec<(u32, u8, Vec3)> = self
            .entities
            .values()
            .filter_map(|e| {
                e.player_data()
                    .map(|p| (e.net_id, p.slot, e.position))
            })
            .collect();

        let mut despawns = Vec::new();
        let mut hits = Vec::new();
        for entity in self.entities.values_mut() {
            let EntityData::Projectile(projectile) = &mut entity.data else {
                continue;
            };
            entity.position += projectile.velocity * dt;
            projectile.lifetime -= dt;
            if projectile.lifetime <= 0.0 {
                despawns.push(entity.net_id);
                continue;
            }
            for &(_, slot, position) in &players {
                if slot == projectile.owner_slot {
                    continue;
                }
                if entity.position.distance(position) <= PROJECTILE_HIT_RADIUS {
                    hits.push(projectile.owner_slot);
                    despawns.push(entity.net_id);
                    break;
                }
            }
        }

        for owner_slot in hits {
            if let Some(net_id) = self.player_entities[owner_slot as usize] {
                if let Some(data) = self
                    .entities
                    .get_mut(&net_id)
                    .and_then(Entity::player_data_mut)
                {
                    data.add_score(SCORE_PER_HIT);
                }
            }
        }

        for net_id in despawns {
            self.despawn(net_id)?;
        }

        // Keep the broadcast score table in lockstep with player entities.
        for (slot, score) in self
            .entities
            .values()
            .filter_map(|e| e.player_data().map(|p| (p.slot as usize, p.score)))
        {
            self.round.scores[slot] = score;
        }
        Ok(())
    }

    fn broadcast_state(&mut self) -> Result<(), SyncError> {
        self.transport
            .broadcast(PacketType::PlayerListUpdate(self.slots.to_packet()))?;

        if self.round.phase() != RoundPhase::Lobby {
            self.transport
                .broadcast(PacketType::RoundState(self.round.to_packet()))?;
        }

        if self.round.is_active() {
            self.broadcaster
                .broadcast_tick(&mut self.ctx, self.entities.values_mut(), &mut self.transport)?;
            prune_histories(self.entities.values_mut(), self.acks.global_floor());

            for packet in self.status_packets() {
                self.transport
                    .broadcast(PacketType::PlayerStatusUpdate(packet))?;
            }
        }
        Ok(())
    }

    fn status_packets(&self) -> Vec<PlayerStatusPacket> {
        self.entities
            .values()
            .filter_map(|e| {
                e.player_data().map(|p| PlayerStatusPacket {
                    slot: p.slot,
                    sprint_cooldown: p.sprint_cooldown(),
                    fire_cooldown: p.fire_cooldown(),
                })
            })
            .collect()
    }

    fn finish_round(&mut self) -> Result<(), SyncError> {
        self.round.finish();
        self.transport
            .broadcast(PacketType::RoundState(self.round.to_packet()))?;
        debug!("round over, scores {:?}", self.round.scores);
        self.events.push(SessionEvent::RoundEnded);
        Ok(())
    }

    fn spawn_player(&mut self, slot: u8) -> Result<(), SyncError> {
        let net_id = self.ctx.allocate_net_id();
        let entity = Entity::player(net_id, slot, SPAWN_POINTS[slot as usize]);
        self.transport
            .broadcast(PacketType::EntityLifecycle(entity.spawn_packet()))?;
        self.entities.insert(net_id, entity);
        self.player_entities[slot as usize] = Some(net_id);
        Ok(())
    }

    fn spawn_projectile(
        &mut self,
        owner_slot: u8,
        position: Vec3,
        velocity: Vec3,
    ) -> Result<(), SyncError> {
        let net_id = self.ctx.allocate_net_id();
        let entity = Entity::projectile(net_id, owner_slot, position, velocity);
        self.transport
            .broadcast(PacketType::EntityLifecycle(entity.spawn_packet()))?;
        self.entities.insert(net_id, entity);
        debug!("player {owner_slot} fired projectile {net_id}");
        Ok(())
    }

    fn despawn(&mut self, net_id: u32) -> Result<(), SyncError> {
        let Some(entity) = self.entities.remove(&net_id) else {
            return Ok(());
        };
        if let Some(slot) = entity.owner_slot() {
            if entity.player_data().is_some() {
                self.player_entities[slot as usize] = None;
            }
        }
        self.transport
            .broadcast(PacketType::EntityLifecycle(entity.despawn_packet()))?;
        self.ctx.release_net_id(net_id);
        Ok(())
    }
}
