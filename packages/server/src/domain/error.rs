//! Domain layer errors.

use thiserror::Error;

/// Canvas の操作で起こるエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanvasError {
    /// 座標がキャンバスの外
    #[error("pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// スナップショットが設定サイズより大きい
    #[error("snapshot holds {actual} bytes but the canvas has {expected} cells")]
    SnapshotTooLarge { expected: usize, actual: usize },
}

/// Store（永続化層）のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// 対象が存在しない（回復可能、プロビジョニングのきっかけになる）
    #[error("not found: {0}")]
    NotFound(String),

    /// 一意制約違反
    #[error("conflict: {0}")]
    Conflict(String),

    /// 接続断など一時的な失敗
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// メッセージ送信のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessagePushError {
    /// 同じキーの接続がすでに登録されている
    #[error("connection key '{0}' is already registered")]
    DuplicateKey(String),

    /// 送信先の接続が見つからない
    #[error("client not found: {0}")]
    ClientNotFound(String),

    /// 送信キューが閉じている
    #[error("failed to push message: {0}")]
    PushFailed(String),

    /// メッセージのエンコードに失敗
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// スナップショット保存先のエラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(String),
}
