use glam::{Quat, Vec3};

use crate::net::{
    DeltaStatePacket, EntityKind, EntityKindState, EntityState, LifecycleEvent, LifecyclePacket,
    delta_fields,
};
use crate::player::Player;

use super::history::StateHistory;

#[derive(Debug, Clone)]
pub struct Projectile {
    pub owner_slot: u8,
    pub velocity: Vec3,
    pub lifetime: f32,
}

#[derive(Debug, Clone)]
pub enum EntityData {
    Player(Player),
    Projectile(Projectile),
}

/// A server-authoritative replicated entity: stable network id, transform,
/// kind-specific fields, and the history of snapshots broadcast for it.
#[derive(Debug)]
pub struct Entity {
    pub net_id: u32,
    pub position: Vec3,
    pub orientation: Quat,
    pub data: EntityData,
    pub history: StateHistory,
}

impl Entity {
    pub fn player(net_id: u32, slot: u8, spawn: Vec3) -> Self {
        Self {
            net_id,
            position: spawn,
            orientation: Quat::IDENTITY,
            data: EntityData::Player(Player::new(slot)),
            history: StateHistory::new(),
        }
    }

    pub fn projectile(net_id: u32, owner_slot: u8, position: Vec3, velocity: Vec3) -> Self {
        Self {
            net_id,
            position,
            orientation: Quat::IDENTITY,
            data: EntityData::Projectile(Projectile {
                owner_slot,
                velocity,
                lifetime: crate::player::PROJECTILE_LIFETIME,
            }),
            history: StateHistory::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match &self.data {
            EntityData::Player(_) => EntityKind::Player,
            EntityData::Projectile(_) => EntityKind::Projectile,
        }
    }

    pub fn player_data(&self) -> Option<&Player> {
        match &self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn player_data_mut(&mut self) -> Option<&mut Player> {
        match &mut self.data {
            EntityData::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn owner_slot(&self) -> Option<u8> {
        match &self.data {
            EntityData::Player(p) => Some(p.slot),
            EntityData::Projectile(p) => Some(p.owner_slot),
        }
    }

    /// Freezes the current simulation state into a wire snapshot stamped
    /// with `state_id`.
    pub fn capture(&self, state_id: u32) -> EntityState {
        let q = self.orientation;
        let kind_state = match &self.data {
            EntityData::Player(p) => EntityKindState::Player {
                buttons: p.buttons.bits(),
                score: p.score,
                sprint_cooldown: p.sprint_cooldown(),
                fire_cooldown: p.fire_cooldown(),
            },
            EntityData::Projectile(p) => EntityKindState::Projectile {
                owner_slot: p.owner_slot,
            },
        };

        EntityState {
            state_id,
            position: self.position.into(),
            orientation: EntityState::encode_orientation([q.x, q.y, q.z, q.w]),
            kind_state,
        }
    }

    pub fn spawn_packet(&self) -> LifecyclePacket {
        LifecyclePacket {
            kind: self.kind(),
            owner_slot: self.owner_slot(),
            net_id: self.net_id,
            event: LifecycleEvent::Spawned,
        }
    }

    pub fn despawn_packet(&self) -> LifecyclePacket {
        LifecyclePacket {
            kind: self.kind(),
            owner_slot: self.owner_slot(),
            net_id: self.net_id,
            event: LifecycleEvent::Despawned,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    Applied,
    /// Snapshot id not newer than what the mirror already holds; reordering,
    /// not an error.
    Stale,
    /// Delta base is not the mirror's current state; repaired by the next
    /// full snapshot cycle.
    MissingBase,
}

/// Client-side, non-authoritative copy of one server entity. Created and
/// destroyed only by explicit lifecycle events; mutated only by snapshots.
#[derive(Debug, Clone)]
pub struct Mirror {
    pub net_id: u32,
    pub kind: EntityKind,
    pub owner_slot: Option<u8>,
    pub position: Vec3,
    pub orientation: Quat,
    pub kind_state: Option<EntityKindState>,
    /// Id of the last applied snapshot; 0 while nothing has arrived.
    pub state_id: u32,
}

impl Mirror {
    pub fn from_spawn(packet: &LifecyclePacket) -> Self {
        Self {
            net_id: packet.net_id,
            kind: packet.kind,
            owner_slot: packet.owner_slot,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            kind_state: None,
            state_id: 0,
        }
    }

    pub fn apply_full(&mut self, state: &EntityState) -> ApplyResult {
        if state.state_id <= self.state_id {
            return ApplyResult::Stale;
        }

        self.position = Vec3::from(state.position);
        self.orientation = decode_quat(state);
        self.kind_state = Some(state.kind_state);
        self.state_id = state.state_id;
        ApplyResult::Applied
    }

    pub fn apply_delta(&mut self, delta: &DeltaStatePacket) -> ApplyResult {
        if delta.state_id <= self.state_id {
            return ApplyResult::Stale;
        }
        if delta.base_id != self.state_id {
            return ApplyResult::MissingBase;
        }

        if delta.mask & delta_fields::POSITION != 0 {
            self.position = Vec3::from(delta.position);
        }
        if delta.mask & delta_fields::ORIENTATION != 0 {
            let q = EntityState {
                state_id: delta.state_id,
                position: delta.position,
                orientation: delta.orientation,
                kind_state: delta.kind_state,
            };
            self.orientation = decode_quat(&q);
        }
        if delta.mask & delta_fields::KIND_STATE != 0 {
            self.kind_state = Some(delta.kind_state);
        }
        self.state_id = delta.state_id;
        ApplyResult::Applied
    }
}

fn decode_quat(state: &EntityState) -> Quat {
    let q = state.decode_orientation();
    Quat::from_xyzw(q[0], q[1], q[2], q[3]).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Buttons;

    fn mirror_for(entity: &Entity) -> Mirror {
        Mirror::from_spawn(&entity.spawn_packet())
    }

    #[test]
    fn full_snapshot_roundtrip() {
        let mut entity = Entity::player(3, 1, Vec3::new(4.0, 1.0, -2.0));
        entity.orientation = Quat::from_rotation_y(1.2);
        let player = entity.player_data_mut().unwrap();
        player.buttons = Buttons::UP | Buttons::LEFT;
        player.add_score(15);

        let state = entity.capture(8);
        let mut mirror = mirror_for(&entity);
        assert_eq!(mirror.apply_full(&state), ApplyResult::Applied);

        assert_eq!(mirror.position, entity.position);
        assert!(mirror.orientation.dot(entity.orientation).abs() > 0.9999);
        match mirror.kind_state.unwrap() {
            EntityKindState::Player { buttons, score, .. } => {
                assert_eq!(buttons, (Buttons::UP | Buttons::LEFT).bits());
                assert_eq!(score, 15);
            }
            other => panic!("unexpected kind state {other:?}"),
        }
        assert_eq!(mirror.state_id, 8);
    }

    #[test]
    fn delta_applies_onto_matching_base() {
        let mut entity = Entity::player(1, 0, Vec3::ZERO);

        let s1 = entity.capture(5);
        entity.position = Vec3::new(6.0, 0.0, 1.0);
        let s2 = entity.capture(9);

        entity.history.record(s1).unwrap();
        entity.history.record(s2).unwrap();

        let mut mirror = mirror_for(&entity);
        mirror.apply_full(&s1);

        let delta = entity.history.encode_delta(1, 5).unwrap();
        assert_eq!(mirror.apply_delta(&delta), ApplyResult::Applied);

        assert_eq!(mirror.position, Vec3::new(6.0, 0.0, 1.0));
        assert_eq!(mirror.state_id, 9);
    }

    #[test]
    fn delta_without_base_is_dropped() {
        let mut entity = Entity::player(1, 0, Vec3::ZERO);
        let s1 = entity.capture(5);
        entity.position = Vec3::new(1.0, 0.0, 0.0);
        let s2 = entity.capture(9);
        entity.history.record(s1).unwrap();
        entity.history.record(s2).unwrap();

        // Mirror never saw the base: the delta must not apply.
        let mut mirror = mirror_for(&entity);
        let delta = entity.history.encode_delta(1, 5).unwrap();
        assert_eq!(mirror.apply_delta(&delta), ApplyResult::MissingBase);
        assert_eq!(mirror.state_id, 0);
        assert_eq!(mirror.position, Vec3::ZERO);
    }

    #[test]
    fn stale_application_is_idempotent() {
        let mut entity = Entity::player(1, 0, Vec3::ZERO);
        let s1 = entity.capture(5);
        entity.position = Vec3::new(2.0, 0.0, 0.0);
        let s2 = entity.capture(9);

        let mut mirror = mirror_for(&entity);
        mirror.apply_full(&s2);

        assert_eq!(mirror.apply_full(&s1), ApplyResult::Stale);
        assert_eq!(mirror.apply_full(&s2), ApplyResult::Stale);
        assert_eq!(mirror.position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(mirror.state_id, 9);
    }

    #[test]
    fn full_delta_delta_full_sequence_lands_exactly() {
        // Linear motion from (0,0,0) to (3,0,0) over ids 1..=4, sent as
        // full, delta, delta, full.
        let mut entity = Entity::projectile(2, 1, Vec3::ZERO, Vec3::X);
        let mut mirror = mirror_for(&entity);

        for id in 1u32..=4 {
            entity.position = Vec3::new((id - 1) as f32, 0.0, 0.0);
            let state = entity.capture(id);
            let base_id = entity.history.latest().map(|s| s.state_id);
            entity.history.record(state).unwrap();

            let full_frame = id == 1 || id == 4;
            match base_id {
                Some(base) if !full_frame => {
                    let delta = entity.history.encode_delta(2, base).unwrap();
                    assert_eq!(mirror.apply_delta(&delta), ApplyResult::Applied);
                }
                _ => {
                    let full = entity.history.encode_full(2).unwrap();
                    assert_eq!(mirror.apply_full(&full.state), ApplyResult::Applied);
                }
            }
        }

        assert_eq!(mirror.position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(mirror.state_id, 4);
    }
}
