//! Value Objects
//!
//! 不変で、同一性ではなく値そのもので比較されるドメインの型。

use std::fmt;

use uuid::Uuid;

/// Store が払い出すユーザー ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u64);

impl UserId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ConnectionRegistry のキー（セッショントークン or IP アドレス）
///
/// どちらを使うかは `server.connection_key` の設定で決まる。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey(String);

impl ConnectionKey {
    pub fn from_token(token: &str) -> Self {
        Self(format!("token:{}", token))
    }

    pub fn from_ip(ip: &str) -> Self {
        Self(format!("ip:{}", ip))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1 本の WebSocket 接続を識別する ID
///
/// 同じ ConnectionKey で登録し直された接続と区別するために使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// キャンバス上の 1 ピクセル（座標 + パレットのインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub color: u8,
}
