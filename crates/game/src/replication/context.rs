/// Server-owned id sources: the global state-id counter shared by every
/// entity, and the network-id allocator. Passed explicitly to whatever
/// issues ids instead of living in process globals.
#[derive(Debug)]
pub struct ReplicationContext {
    next_state_id: u32,
    next_net_id: u32,
    free_net_ids: Vec<u32>,
}

impl Default for ReplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationContext {
    pub fn new() -> Self {
        Self {
            next_state_id: 1,
            next_net_id: 1,
            free_net_ids: Vec::new(),
        }
    }

    /// Issues the next global state id. Monotone across all entities,
    /// never reused within a round.
    pub fn next_state_id(&mut self) -> u32 {
        let id = self.next_state_id;
        self.next_state_id += 1;
        id
    }

    /// Highest id issued so far, 0 before the first issue.
    pub fn current_state_id(&self) -> u32 {
        self.next_state_id - 1
    }

    /// Network ids are reused, but only after an explicit release.
    pub fn allocate_net_id(&mut self) -> u32 {
        if let Some(id) = self.free_net_ids.pop() {
            return id;
        }
        let id = self.next_net_id;
        self.next_net_id += 1;
        id
    }

    pub fn release_net_id(&mut self, net_id: u32) {
        debug_assert!(!self.free_net_ids.contains(&net_id));
        self.free_net_ids.push(net_id);
    }

    /// Round start resets the state-id baseline; clients rebuild their
    /// mirrors on the round transition, so no live mirror observes the
    /// counter going backwards.
    pub fn reset_round(&mut self) {
        self.next_state_id = 1;
        self.next_net_id = 1;
        self.free_net_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_ids_are_strictly_increasing() {
        let mut ctx = ReplicationContext::new();
        assert_eq!(ctx.current_state_id(), 0);

        let a = ctx.next_state_id();
        let b = ctx.next_state_id();
        assert!(b > a);
        assert_eq!(ctx.current_state_id(), b);
    }

    #[test]
    fn net_ids_reused_only_after_release() {
        let mut ctx = ReplicationContext::new();
        let a = ctx.allocate_net_id();
        let b = ctx.allocate_net_id();
        assert_ne!(a, b);

        ctx.release_net_id(a);
        assert_eq!(ctx.allocate_net_id(), a);
        assert_ne!(ctx.allocate_net_id(), b);
    }

    #[test]
    fn round_reset_restarts_counters() {
        let mut ctx = ReplicationContext::new();
        ctx.next_state_id();
        ctx.next_state_id();
        ctx.allocate_net_id();

        ctx.reset_round();
        assert_eq!(ctx.next_state_id(), 1);
        assert_eq!(ctx.allocate_net_id(), 1);
    }
}
