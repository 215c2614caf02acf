//! Domain models for Keepsake

mod collection;
mod item;
mod owner;
mod remote;
mod sync_state;
mod voice;

pub use collection::{Collection, CollectionId};
pub use item::{CapturedItem, ItemId, Visibility};
pub use owner::OwnerId;
pub use remote::{ChangeEvent, ChangeKind, CollectionRecord, EntityKind, ItemRecord, RemoteRecord};
pub use sync_state::SyncState;
pub use voice::VoiceClip;
