use crate::net::{MAX_PLAYERS, RoundPhase, RoundStatePacket};

pub const ROUND_DURATION_SECS: f32 = 600.0;

/// Observed phase change after applying a remote round-state broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTransition {
    None,
    Started,
    Ended,
}

/// Round phase plus score table. The server owns the single authoritative
/// copy and drives transitions; a client replica changes phase only by
/// applying the server's broadcasts.
#[derive(Debug, Clone)]
pub struct RoundState {
    phase: RoundPhase,
    time_remaining: f32,
    pub scores: [i32; MAX_PLAYERS],
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            phase: RoundPhase::Lobby,
            time_remaining: 0.0,
            scores: [0; MAX_PLAYERS],
        }
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == RoundPhase::Active
    }

    pub fn time_remaining(&self) -> f32 {
        self.time_remaining
    }

    /// `Lobby -> Active` (also restarts from `Over`): fresh score table and
    /// a full round timer.
    pub fn start(&mut self) {
        self.phase = RoundPhase::Active;
        self.time_remaining = ROUND_DURATION_SECS;
        self.scores = [0; MAX_PLAYERS];
    }

    /// `Active -> Over`: input effects stop, scores freeze.
    pub fn finish(&mut self) {
        if self.phase == RoundPhase::Active {
            self.phase = RoundPhase::Over;
            self.time_remaining = 0.0;
        }
    }

    pub fn back_to_lobby(&mut self) {
        self.phase = RoundPhase::Lobby;
        self.time_remaining = 0.0;
    }

    /// Advances the round timer; returns true when the timer just expired
    /// and the round flipped to `Over`.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.phase != RoundPhase::Active {
            return false;
        }
        self.time_remaining -= dt;
        if self.time_remaining <= 0.0 {
            self.finish();
            return true;
        }
        false
    }

    pub fn to_packet(&self) -> RoundStatePacket {
        RoundStatePacket {
            phase: self.phase,
            time_remaining: self.time_remaining,
            scores: self.scores,
        }
    }

    /// Client-side application of a round-state broadcast. The replica
    /// never decides to change phase on its own; it only follows.
    pub fn apply_remote(&mut self, packet: &RoundStatePacket) -> RoundTransition {
        let was_active = self.is_active();

        self.phase = packet.phase;
        self.time_remaining = packet.time_remaining;
        if packet.phase != RoundPhase::Lobby {
            self.scores = packet.scores;
        }

        match (was_active, self.is_active()) {
            (false, true) => RoundTransition::Started,
            (true, false) => RoundTransition::Ended,
            _ => RoundTransition::None,
        }
    }
}
