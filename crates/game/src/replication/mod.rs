mod ack;
mod broadcast;
mod context;
mod entity;
mod history;

pub use ack::AckTracker;
pub use broadcast::{FULL_SNAPSHOT_INTERVAL, SnapshotBroadcaster, SyncError, prune_histories};
pub use context::ReplicationContext;
pub use entity::{ApplyResult, Entity, EntityData, Mirror, Projectile};
pub use history::{HistoryError, StateHistory};
