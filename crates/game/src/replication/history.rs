use std::collections::VecDeque;

use crate::net::{DeltaStatePacket, EntityState, FullStatePacket, delta_fields};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("state id {attempted} does not advance past last recorded id {last}")]
    NonMonotonic { last: u32, attempted: u32 },
}

/// Previously-broadcast snapshots of one entity, oldest to newest. Retained
/// entries serve as delta bases until every connected client has
/// acknowledged past them.
#[derive(Debug, Default)]
pub struct StateHistory {
    entries: VecDeque<EntityState>,
}

impl StateHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a snapshot. Ids must strictly increase; recording over or
    /// behind an existing id is a logic error upstream.
    pub fn record(&mut self, state: EntityState) -> Result<(), HistoryError> {
        if let Some(last) = self.entries.back() {
            if state.state_id <= last.state_id {
                return Err(HistoryError::NonMonotonic {
                    last: last.state_id,
                    attempted: state.state_id,
                });
            }
        }
        self.entries.push_back(state);
        Ok(())
    }

    pub fn latest(&self) -> Option<&EntityState> {
        self.entries.back()
    }

    pub fn get(&self, state_id: u32) -> Option<&EntityState> {
        self.entries.iter().find(|s| s.state_id == state_id)
    }

    pub fn encode_full(&self, net_id: u32) -> Option<FullStatePacket> {
        self.latest().map(|state| FullStatePacket {
            net_id,
            state: *state,
        })
    }

    /// Field-level difference between the retained snapshot at `base_id`
    /// and the latest snapshot. `None` when the base has been pruned, was
    /// never recorded, or is not older than the latest entry; the caller
    /// falls back to a full snapshot.
    pub fn encode_delta(&self, net_id: u32, base_id: u32) -> Option<DeltaStatePacket> {
        let latest = self.latest()?;
        if base_id >= latest.state_id {
            return None;
        }
        let base = self.get(base_id)?;

        let mut mask = 0u8;
        if base.position != latest.position {
            mask |= delta_fields::POSITION;
        }
        if base.orientation != latest.orientation {
            mask |= delta_fields::ORIENTATION;
        }
        if base.kind_state != latest.kind_state {
            mask |= delta_fields::KIND_STATE;
        }

        Some(DeltaStatePacket {
            net_id,
            base_id,
            state_id: latest.state_id,
            mask,
            position: latest.position,
            orientation: latest.orientation,
            kind_state: latest.kind_state,
        })
    }

    /// Discards entries below `floor` but always keeps the newest entry,
    /// so a history that has ever recorded never becomes empty.
    pub fn prune(&mut self, floor: u32) {
        while self.entries.len() > 1 {
            match self.entries.front() {
                Some(front) if front.state_id < floor => {
                    self.entries.pop_front();
                }
                _ => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::EntityKindState;

    fn snapshot(state_id: u32, x: f32) -> EntityState {
        EntityState {
            state_id,
            position: [x, 0.0, 0.0],
            orientation: [0, 0, 0, 32767],
            kind_state: EntityKindState::Projectile { owner_slot: 1 },
        }
    }

    #[test]
    fn record_rejects_non_increasing_ids() {
        let mut history = StateHistory::new();

        history.record(snapshot(5, 0.0)).unwrap();
        assert!(matches!(
            history.record(snapshot(5, 1.0)),
            Err(HistoryError::NonMonotonic { last: 5, attempted: 5 })
        ));
        assert!(history.record(snapshot(3, 1.0)).is_err());
        assert!(history.record(snapshot(6, 1.0)).is_ok());
    }

    #[test]
    fn delta_masks_only_changed_fields() {
        let mut history = StateHistory::new();
        history.record(snapshot(5, 1.0)).unwrap();
        history.record(snapshot(9, 2.5)).unwrap();

        let delta = history.encode_delta(7, 5).unwrap();
        assert_eq!(delta.base_id, 5);
        assert_eq!(delta.state_id, 9);
        assert_eq!(delta.mask, delta_fields::POSITION);
        assert_eq!(delta.position, [2.5, 0.0, 0.0]);
    }

    #[test]
    fn delta_unavailable_after_base_pruned() {
        let mut history = StateHistory::new();
        history.record(snapshot(5, 1.0)).unwrap();
        history.record(snapshot(9, 2.0)).unwrap();

        history.prune(9);
        assert!(history.encode_delta(7, 5).is_none());
        assert!(history.encode_full(7).is_some());
    }

    #[test]
    fn delta_unavailable_for_unknown_or_newer_base() {
        let mut history = StateHistory::new();
        history.record(snapshot(5, 1.0)).unwrap();

        assert!(history.encode_delta(7, 4).is_none());
        assert!(history.encode_delta(7, 5).is_none());
    }

    #[test]
    fn prune_keeps_newest_entry() {
        let mut history = StateHistory::new();
        for id in 1..=4 {
            history.record(snapshot(id, id as f32)).unwrap();
        }

        history.prune(100);
        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().state_id, 4);
    }

    #[test]
    fn prune_retains_entries_at_or_above_floor() {
        let mut history = StateHistory::new();
        for id in [3, 7, 10, 12] {
            history.record(snapshot(id, id as f32)).unwrap();
        }

        history.prune(7);
        assert!(history.get(3).is_none());
        assert!(history.get(7).is_some());
        assert!(history.encode_delta(1, 7).is_some());
    }
}
