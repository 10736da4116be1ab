//! Infrastructure layer: concrete implementations of the domain traits.

pub mod dto;
pub mod identity_cache;
pub mod message_pusher;
pub mod snapshot_file;
pub mod store;

pub use identity_cache::{CacheError, IdentityCache};
pub use message_pusher::WebSocketMessagePusher;
pub use snapshot_file::FileCanvasSnapshotStore;
pub use store::{InMemoryStore, PersistenceQueue};
