//! UseCase: クライアント切断処理
//!
//! 接続を ConnectionRegistry から外すだけで、ユーザーの stacker には触らない。
//! 再接続してもクールダウンは途切れずに進む。

use std::sync::Arc;

use crate::domain::{ConnectionId, ConnectionKey, MessagePusher};

/// クライアント切断のユースケース
pub struct DisconnectClientUseCase {
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl DisconnectClientUseCase {
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self { message_pusher }
    }

    /// 切断を実行
    ///
    /// `id` が登録中の接続と一致するときだけ登録を解除する。
    ///
    /// # Returns
    ///
    /// 切断後の接続数
    pub async fn execute(&self, key: &ConnectionKey, id: ConnectionId) -> usize {
        self.message_pusher.unregister_client(key, id).await;
        self.message_pusher.online_count()
    }
}
