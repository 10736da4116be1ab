//! Domain layer: canvas, stacking rules, users and the traits at the layer seams.

pub mod canvas;
pub mod cooldown;
pub mod error;
pub mod event;
pub mod message_pusher;
pub mod snapshot;
pub mod stacker;
pub mod store;
pub mod user;
pub mod value_object;

pub use canvas::{Canvas, Color, Palette};
pub use cooldown::{ActivityCooldown, BaseCooldown, FixedCooldown, MAX_COOLDOWN, StackingPolicy};
pub use error::{CanvasError, MessagePushError, SnapshotError, StoreError};
pub use event::{ServerEvent, StackCause};
pub use message_pusher::{Connection, MessagePusher, PusherChannel};
pub use snapshot::CanvasSnapshotStore;
pub use stacker::{PixelStacker, StackEvent, StackEventKind, StackEvents};
pub use store::{NewPlacement, PlacementRecord, Store};
pub use user::{ActiveUser, Role, User, UserLogin};
pub use value_object::{ConnectionId, ConnectionKey, Pixel, UserId};
