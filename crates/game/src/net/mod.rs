mod loopback;
mod protocol;
mod transport;

pub use loopback::LoopbackTransport;
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, DeltaStatePacket, EntityKind, EntityKindState, EntityState,
    FullStatePacket, InputPacket, LifecycleEvent, LifecyclePacket, MAX_CLIENTS, MAX_PACKET_SIZE,
    MAX_PLAYERS, PROTOCOL_MAGIC, PROTOCOL_VERSION, Packet, PacketError, PacketHeader, PacketType,
    PlayerListPacket, PlayerStatusPacket, RoundPhase, RoundStatePacket, delta_fields,
};
pub use transport::{HOST_PEER_ID, PeerId, Transport, TransportEvent, UdpTransport};
