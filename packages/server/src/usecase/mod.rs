//! UseCase 層
//!
//! 1 つの操作につき 1 つの構造体を持ち、`execute` で実行する。
//! 外部とのやりとりはドメイン層の trait（Store, MessagePusher, CanvasSnapshotStore）越しに行う。

pub mod connect_client;
pub mod disconnect_client;
pub mod error;
pub mod get_canvas;
pub mod place_pixel;
pub mod resolve_session;
pub mod save_canvas;

pub use connect_client::ConnectClientUseCase;
pub use disconnect_client::DisconnectClientUseCase;
pub use error::{ConnectError, PlaceError, ResolveError, SaveCanvasError};
pub use get_canvas::{AuthService, CanvasInfo, CanvasSettings, GetCanvasUseCase};
pub use place_pixel::{PlaceOutcome, PlacePixelUseCase, RejectReason};
pub use resolve_session::{RequestInfo, ResolveSessionUseCase, ResolvedSession, connection_key};
pub use save_canvas::{RestoreOutcome, SaveCanvasUseCase};
