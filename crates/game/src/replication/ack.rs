use std::collections::HashMap;

use crate::net::PeerId;

/// Per-client acknowledgement bookkeeping. Every input packet carries the
/// newest state id the sender has applied; the minimum across all connected
/// clients is the safe pruning boundary for every history.
#[derive(Debug, Default)]
pub struct AckTracker {
    acks: HashMap<PeerId, u32>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an acknowledgement, never regressing: input packets may
    /// arrive out of order.
    pub fn record(&mut self, peer: PeerId, state_id: u32) {
        let entry = self.acks.entry(peer).or_insert(state_id);
        if state_id > *entry {
            *entry = state_id;
        }
    }

    pub fn last_acked(&self, peer: PeerId) -> Option<u32> {
        self.acks.get(&peer).copied()
    }

    /// A departed client must stop holding the floor down.
    pub fn remove(&mut self, peer: PeerId) {
        self.acks.remove(&peer);
    }

    pub fn clear(&mut self) {
        self.acks.clear();
    }

    /// Minimum acknowledged id over all connected clients. `None` with no
    /// clients: history then grows unpruned, acceptable at this scale.
    pub fn global_floor(&self) -> Option<u32> {
        self.acks.values().copied().min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_is_minimum_over_clients() {
        let mut tracker = AckTracker::new();
        tracker.record(1, 10);
        tracker.record(2, 7);
        tracker.record(3, 12);

        assert_eq!(tracker.global_floor(), Some(7));
    }

    #[test]
    fn no_clients_means_no_floor() {
        let tracker = AckTracker::new();
        assert_eq!(tracker.global_floor(), None);
    }

    #[test]
    fn acks_never_regress() {
        let mut tracker = AckTracker::new();
        tracker.record(1, 9);
        tracker.record(1, 4);

        assert_eq!(tracker.last_acked(1), Some(9));
    }

    #[test]
    fn removing_lagging_client_raises_floor() {
        let mut tracker = AckTracker::new();
        tracker.record(1, 3);
        tracker.record(2, 20);

        tracker.remove(1);
        assert_eq!(tracker.global_floor(), Some(20));
    }
}
