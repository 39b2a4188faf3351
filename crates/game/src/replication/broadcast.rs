use std::io;

use crate::net::{PacketType, Transport};

use super::context::ReplicationContext;
use super::entity::Entity;
use super::history::HistoryError;

/// Every 6th network tick broadcasts full state for all entities; the
/// other 5 send deltas against the previous tick's snapshot.
pub const FULL_SNAPSHOT_INTERVAL: u32 = 6;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Server-side snapshot emitter. Uniform broadcast: one full/delta cycle
/// shared by all clients rather than per-client tailored deltas.
#[derive(Debug)]
pub struct SnapshotBroadcaster {
    ticks_until_full: u32,
}

impl Default for SnapshotBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBroadcaster {
    pub fn new() -> Self {
        // First tick after construction is always a full frame.
        Self { ticks_until_full: 0 }
    }

    /// Captures and broadcasts one snapshot per entity. Each emitted state
    /// is recorded into the entity's own history first so it can serve as
    /// a future delta base.
    pub fn broadcast_tick<'a, T, I>(
        &mut self,
        ctx: &mut ReplicationContext,
        entities: I,
        transport: &mut T,
    ) -> Result<(), SyncError>
    where
        T: Transport,
        I: IntoIterator<Item = &'a mut Entity>,
    {
        let full_frame = self.ticks_until_full == 0;
        if full_frame {
            self.ticks_until_full = FULL_SNAPSHOT_INTERVAL - 1;
        } else {
            self.ticks_until_full -= 1;
        }

        for entity in entities {
            let base_id = entity.history.latest().map(|s| s.state_id);
            let state = entity.capture(ctx.next_state_id());
            entity.history.record(state)?;

            let payload = match base_id {
                Some(base) if !full_frame => {
                    match entity.history.encode_delta(entity.net_id, base) {
                        Some(delta) => PacketType::DeltaState(delta),
                        // No usable base left: recover with a full.
                        None => full_payload(entity),
                    }
                }
                _ => full_payload(entity),
            };

            transport.broadcast(payload)?;
        }

        Ok(())
    }
}

fn full_payload(entity: &Entity) -> PacketType {
    // capture+record ran just above, so the history is never empty here.
    match entity.history.encode_full(entity.net_id) {
        Some(full) => PacketType::FullState(full),
        None => unreachable!("encode_full after record"),
    }
}

/// Drops history entries every connected client has acknowledged past.
/// Called once per tick after broadcasting.
pub fn prune_histories<'a, I>(entities: I, floor: Option<u32>)
where
    I: IntoIterator<Item = &'a mut Entity>,
{
    let Some(floor) = floor else {
        return;
    };
    for entity in entities {
        entity.history.prune(floor);
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::net::{LoopbackTransport, PacketType};

    fn drain_payloads(transport: &mut LoopbackTransport) -> Vec<PacketType> {
        transport
            .receive()
            .unwrap()
            .into_iter()
            .map(|(_, p)| p.payload)
            .collect()
    }

    #[test]
    fn full_every_sixth_tick() {
        let mut server = LoopbackTransport::server();
        let mut client = LoopbackTransport::client_of(&server);

        let mut ctx = ReplicationContext::new();
        let mut broadcaster = SnapshotBroadcaster::new();
        let mut entity = Entity::player(1, 0, Vec3::ZERO);

        let mut kinds = Vec::new();
        for tick in 0..12 {
            entity.position = Vec3::new(tick as f32, 0.0, 0.0);
            broadcaster
                .broadcast_tick(&mut ctx, [&mut entity], &mut server)
                .unwrap();
            for payload in drain_payloads(&mut client) {
                kinds.push(matches!(payload, PacketType::FullState(_)));
            }
        }

        let fulls: Vec<usize> = kinds
            .iter()
            .enumerate()
            .filter(|(_, is_full)| **is_full)
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fulls, vec![0, 6]);
    }

    #[test]
    fn baseless_history_falls_back_to_full_mid_window() {
        let mut server = LoopbackTransport::server();
        let mut client = LoopbackTransport::client_of(&server);

        let mut ctx = ReplicationContext::new();
        let mut broadcaster = SnapshotBroadcaster::new();
        let mut entity = Entity::player(1, 0, Vec3::ZERO);

        broadcaster
            .broadcast_tick(&mut ctx, [&mut entity], &mut server)
            .unwrap();
        drain_payloads(&mut client);

        // An entity whose history holds no base yet (here: wiped by a
        // reset) cannot be delta-encoded and must recover with a full
        // snapshot even inside the delta window.
        entity.history = crate::replication::StateHistory::new();
        entity.position = Vec3::new(5.0, 0.0, 0.0);
        broadcaster
            .broadcast_tick(&mut ctx, [&mut entity], &mut server)
            .unwrap();

        let payloads = drain_payloads(&mut client);
        assert_eq!(payloads.len(), 1);
        assert!(matches!(payloads[0], PacketType::FullState(_)));
    }

    #[test]
    fn emitted_snapshots_extend_history() {
        let mut server = LoopbackTransport::server();
        let _client = LoopbackTransport::client_of(&server);

        let mut ctx = ReplicationContext::new();
        let mut broadcaster = SnapshotBroadcaster::new();
        let mut entity = Entity::player(1, 0, Vec3::ZERO);

        for _ in 0..4 {
            broadcaster
                .broadcast_tick(&mut ctx, [&mut entity], &mut server)
                .unwrap();
        }

        assert_eq!(entity.history.len(), 4);
        assert_eq!(entity.history.latest().unwrap().state_id, 4);
    }

    #[test]
    fn prune_respects_missing_floor() {
        let mut entity = Entity::player(1, 0, Vec3::ZERO);
        for id in 1..=3 {
            let state = entity.capture(id);
            entity.history.record(state).unwrap();
        }

        prune_histories([&mut entity], None);
        assert_eq!(entity.history.len(), 3);

        prune_histories([&mut entity], Some(3));
        assert_eq!(entity.history.len(), 1);
    }
}
