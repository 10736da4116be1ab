//! UseCase 層のエラー定義

use thiserror::Error;

use crate::{
    domain::{SnapshotError, StoreError},
    infrastructure::CacheError,
};

/// 接続登録のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    /// 同じ接続キーのクライアントがすでに接続中
    #[error("connection key '{0}' is already connected")]
    DuplicateKey(String),

    #[error("failed to register connection: {0}")]
    Registry(String),
}

/// セッション解決のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// 配置リクエストのペイロードが不正
///
/// 1 メッセージを捨てるだけで接続は維持する。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceError {
    #[error("pixel ({x}, {y}) is outside the canvas")]
    OutOfBounds { x: u32, y: u32 },

    #[error("color index {0} is not in the palette")]
    InvalidColor(u8),
}

/// スナップショット保存・復元のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaveCanvasError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
