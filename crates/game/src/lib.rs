pub mod net;
pub mod player;
pub mod replication;
pub mod round;
pub mod session;

pub use net::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, DeltaStatePacket, EntityKind, EntityKindState, EntityState,
    FullStatePacket, InputPacket, LifecycleEvent, LifecyclePacket, LoopbackTransport, MAX_CLIENTS,
    MAX_PLAYERS, Packet, PacketError, PacketHeader, PacketType, PeerId, PlayerListPacket,
    PlayerStatusPacket, RoundPhase, RoundStatePacket, Transport, TransportEvent, UdpTransport,
};
pub use player::{Buttons, Player};
pub use replication::{
    AckTracker, ApplyResult, Entity, EntityData, Mirror, ReplicationContext, SnapshotBroadcaster,
    StateHistory, SyncError,
};
pub use round::{ROUND_DURATION_SECS, RoundState, RoundTransition};
pub use session::{ClientSession, PlayerSlots, ServerSession, SessionEvent};
