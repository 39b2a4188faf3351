use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4152_4E41;
pub const DEFAULT_PORT: u16 = 27016;
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Player slots, including slot 0 for the hosting server's own player.
pub const MAX_PLAYERS: usize = 4;
/// Remote clients the server accepts; slot 0 stays with the host.
pub const MAX_CLIENTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub enum EntityKind {
    Player,
    Projectile,
}

/// Kind-specific half of a snapshot. Players replicate their held buttons,
/// score and ability cooldowns; projectiles only carry their owner.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum EntityKindState {
    Player {
        buttons: u8,
        score: i32,
        sprint_cooldown: f32,
        fire_cooldown: f32,
    },
    Projectile {
        owner_slot: u8,
    },
}

impl EntityKindState {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Player { .. } => EntityKind::Player,
            Self::Projectile { .. } => EntityKind::Projectile,
        }
    }
}

/// One full snapshot of one entity at one state id.
#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct EntityState {
    pub state_id: u32,
    pub position: [f32; 3],
    pub orientation: [i16; 4],
    pub kind_state: EntityKindState,
}

impl EntityState {
    pub fn encode_orientation(quat: [f32; 4]) -> [i16; 4] {
        [
            (quat[0].clamp(-1.0, 1.0) * 32767.0) as i16,
            (quat[1].clamp(-1.0, 1.0) * 32767.0) as i16,
            (quat[2].clamp(-1.0, 1.0) * 32767.0) as i16,
            (quat[3].clamp(-1.0, 1.0) * 32767.0) as i16,
        ]
    }

    pub fn decode_orientation(&self) -> [f32; 4] {
        [
            self.orientation[0] as f32 / 32767.0,
            self.orientation[1] as f32 / 32767.0,
            self.orientation[2] as f32 / 32767.0,
            self.orientation[3] as f32 / 32767.0,
        ]
    }
}

/// Changed-field mask carried by delta snapshots.
pub mod delta_fields {
    pub const POSITION: u8 = 1 << 0;
    pub const ORIENTATION: u8 = 1 << 1;
    pub const KIND_STATE: u8 = 1 << 2;
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct FullStatePacket {
    pub net_id: u32,
    pub state: EntityState,
}

/// A delta snapshot against `base_id`. Fields are only meaningful where the
/// corresponding `delta_fields` bit is set in `mask`; the payload stays
/// fixed-size regardless.
#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct DeltaStatePacket {
    pub net_id: u32,
    pub base_id: u32,
    pub state_id: u32,
    pub mask: u8,
    pub position: [f32; 3],
    pub orientation: [i16; 4],
    pub kind_state: EntityKindState,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct InputPacket {
    pub pointer: [f32; 3],
    pub buttons: u8,
    pub last_ack_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub enum RoundPhase {
    Lobby,
    Active,
    Over,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct RoundStatePacket {
    pub phase: RoundPhase,
    pub time_remaining: f32,
    pub scores: [i32; MAX_PLAYERS],
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerListPacket {
    pub slots: [Option<u32>; MAX_PLAYERS],
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct PlayerStatusPacket {
    pub slot: u8,
    pub sprint_cooldown: f32,
    pub fire_cooldown: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub enum LifecycleEvent {
    Spawned,
    Despawned,
}

#[derive(Debug, Clone, Copy, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct LifecyclePacket {
    pub kind: EntityKind,
    pub owner_slot: Option<u8>,
    pub net_id: u32,
    pub event: LifecycleEvent,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketType {
    ClientInput(InputPacket),
    FullState(FullStatePacket),
    DeltaState(DeltaStatePacket),
    PlayerListUpdate(PlayerListPacket),
    RoundState(RoundStatePacket),
    PlayerStatusUpdate(PlayerStatusPacket),
    EntityLifecycle(LifecyclePacket),
}

impl PacketType {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ClientInput(_) => "ClientInput",
            Self::FullState(_) => "FullState",
            Self::DeltaState(_) => "DeltaState",
            Self::PlayerListUpdate(_) => "PlayerListUpdate",
            Self::RoundState(_) => "RoundState",
            Self::PlayerStatusUpdate(_) => "PlayerStatusUpdate",
            Self::EntityLifecycle(_) => "EntityLifecycle",
        }
    }
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("invalid packet header")]
    InvalidHeader,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        let packet: Self =
            rkyv::from_bytes::<Self, rancor::Error>(data).map_err(PacketError::Deserialize)?;
        if !packet.header.is_valid() {
            return Err(PacketError::InvalidHeader);
        }
        Ok(packet)
    }
}
