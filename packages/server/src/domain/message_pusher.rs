//! MessagePusher trait 定義
//!
//! 接続中のクライアントへのメッセージ通知のインターフェース。
//! 各接続は専用の送信キューと writer ループを持ち、ブロードキャストは
//! キューに積むだけで、遅い接続に引きずられない。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{
    MessagePushError,
    event::ServerEvent,
    value_object::{ConnectionId, ConnectionKey},
};

/// 接続ごとの送信キュー（エンコード済みの JSON）
pub type PusherChannel = mpsc::UnboundedSender<Arc<str>>;

/// 登録される 1 本の接続
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: PusherChannel,
    /// キャンセルすると読み書きのループとイベント転送が止まる
    pub cancel: CancellationToken,
}

impl Connection {
    pub fn new(sender: PusherChannel, cancel: CancellationToken) -> Self {
        Self {
            id: ConnectionId::generate(),
            sender,
            cancel,
        }
    }
}

#[async_trait]
pub trait MessagePusher: Send + Sync {
    /// 接続を登録（同じキーがすでにあれば DuplicateKey で拒否）
    async fn register_client(
        &self,
        key: ConnectionKey,
        connection: Connection,
    ) -> Result<(), MessagePushError>;

    /// 接続を登録解除（`id` が一致するときだけ）
    async fn unregister_client(&self, key: &ConnectionKey, id: ConnectionId);

    /// 特定のクライアントに送信
    async fn push_to(&self, key: &ConnectionKey, event: &ServerEvent)
    -> Result<(), MessagePushError>;

    /// 全クライアントに送信し、キューに積めた接続数を返す
    async fn broadcast(&self, event: &ServerEvent) -> Result<usize, MessagePushError>;

    /// 登録中の接続数
    fn online_count(&self) -> usize;
}
