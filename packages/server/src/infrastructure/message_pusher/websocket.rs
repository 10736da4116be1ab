//! WebSocket を使った MessagePusher 実装（ConnectionRegistry）
//!
//! ## 責務
//!
//! - ConnectionKey → Connection の対応を管理
//! - クライアントへのメッセージ送信（push_to, broadcast）
//!
//! ## 設計ノート
//!
//! WebSocket とその送信キューの生成は UI 層（`ui/handler/websocket.rs`）で行われます。
//! この実装は生成された sender を受け取り、メッセージ送信に使用します。
//!
//! ブロードキャストは読み取りロック中に sender のスナップショットを取り、
//! ロックを外してからキューに積みます。登録・解除がブロードキャストと競合しても
//! 走査中のマップが書き換わることはありません。
//!
//! 重複キーは拒否します（`MessagePushError::DuplicateKey`）。

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    domain::{
        Connection, ConnectionId, ConnectionKey, MessagePushError, MessagePusher, PusherChannel,
        ServerEvent,
    },
    infrastructure::dto::conversion::encode_event,
};

pub struct WebSocketMessagePusher {
    /// 接続中のクライアント
    ///
    /// Key: ConnectionKey
    /// Value: Connection
    clients: RwLock<HashMap<ConnectionKey, Connection>>,
    /// 登録中の接続数（アクティビティ連動クールダウンと共有）
    online: Arc<AtomicUsize>,
}

impl WebSocketMessagePusher {
    pub fn new() -> Self {
        Self::with_online_counter(Arc::new(AtomicUsize::new(0)))
    }

    /// 接続数カウンタを外から渡して作成
    pub fn with_online_counter(online: Arc<AtomicUsize>) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            online,
        }
    }

    fn encode(event: &ServerEvent) -> Result<Arc<str>, MessagePushError> {
        encode_event(event)
            .map(Arc::from)
            .map_err(|e| MessagePushError::Encode(e.to_string()))
    }
}

impl Default for WebSocketMessagePusher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePusher for WebSocketMessagePusher {
    async fn register_client(
        &self,
        key: ConnectionKey,
        connection: Connection,
    ) -> Result<(), MessagePushError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&key) {
            return Err(MessagePushError::DuplicateKey(key.to_string()));
        }
        tracing::debug!(
            "Connection {} registered under '{}'",
            connection.id,
            key.as_str()
        );
        clients.insert(key, connection);
        self.online.store(clients.len(), Ordering::Relaxed);
        Ok(())
    }

    async fn unregister_client(&self, key: &ConnectionKey, id: ConnectionId) {
        let mut clients = self.clients.write().await;
        if clients.get(key).is_some_and(|c| c.id == id) {
            clients.remove(key);
            tracing::debug!("Connection {} unregistered from '{}'", id, key.as_str());
        }
        self.online.store(clients.len(), Ordering::Relaxed);
    }

    async fn push_to(
        &self,
        key: &ConnectionKey,
        event: &ServerEvent,
    ) -> Result<(), MessagePushError> {
        let sender = {
            let clients = self.clients.read().await;
            clients.get(key).map(|c| c.sender.clone())
        };
        let Some(sender) = sender else {
            return Err(MessagePushError::ClientNotFound(key.to_string()));
        };

        let message = Self::encode(event)?;
        sender
            .send(message)
            .map_err(|e| MessagePushError::PushFailed(e.to_string()))?;
        tracing::debug!("Pushed message to '{}'", key.as_str());
        Ok(())
    }

    async fn broadcast(&self, event: &ServerEvent) -> Result<usize, MessagePushError> {
        let message = Self::encode(event)?;
        let targets: Vec<(ConnectionKey, PusherChannel)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .map(|(key, c)| (key.clone(), c.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        for (key, sender) in targets {
            // ブロードキャストでは一部の送信失敗を許容
            if sender.send(message.clone()).is_err() {
                tracing::debug!("Queue for '{}' is closed, skipping", key.as_str());
            } else {
                delivered += 1;
            }
        }
        tracing::debug!("Broadcasted message to {} connections", delivered);
        Ok(delivered)
    }

    fn online_count(&self) -> usize {
        self.online.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pixel, StackCause};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - register/unregister による key → connection の管理
    // - push_to: 特定の接続への送信
    // - broadcast: 全接続への送信（詰まった接続・閉じた接続があっても止まらない）
    // - 重複キーの拒否ポリシー
    // ========================================

    fn connection() -> (Connection, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(tx, CancellationToken::new()), rx)
    }

    fn placed_event() -> ServerEvent {
        ServerEvent::PixelsPlaced(vec![Pixel {
            x: 1,
            y: 2,
            color: 3,
        }])
    }

    #[tokio::test]
    async fn test_push_to_success() {
        // テスト項目: 特定の接続にだけメッセージが届く
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (alice, mut alice_rx) = connection();
        let (bob, mut bob_rx) = connection();
        let alice_key = ConnectionKey::from_ip("10.0.0.1");
        pusher
            .register_client(alice_key.clone(), alice)
            .await
            .unwrap();
        pusher
            .register_client(ConnectionKey::from_ip("10.0.0.2"), bob)
            .await
            .unwrap();

        // when (操作):
        let result = pusher
            .push_to(&alice_key, &ServerEvent::PlacementAck { x: 1, y: 2 })
            .await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(
            alice_rx.recv().await.as_deref(),
            Some(r#"{"type":"ACK","ackFor":"PLACE","x":1,"y":2}"#)
        );
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_push_to_client_not_found() {
        // テスト項目: 存在しない接続への送信はエラーを返す
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let result = pusher
            .push_to(
                &ConnectionKey::from_ip("10.0.0.9"),
                &ServerEvent::PlacementAck { x: 0, y: 0 },
            )
            .await;

        // then (期待する結果):
        assert!(matches!(result, Err(MessagePushError::ClientNotFound(_))));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        // テスト項目: ブロードキャストは全接続に同じメッセージを積む
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let mut receivers = Vec::new();
        for i in 0..3 {
            let (conn, rx) = connection();
            pusher
                .register_client(ConnectionKey::from_ip(&format!("10.0.0.{}", i)), conn)
                .await
                .unwrap();
            receivers.push(rx);
        }

        // when (操作):
        let delivered = pusher.broadcast(&placed_event()).await.unwrap();

        // then (期待する結果):
        assert_eq!(delivered, 3);
        for rx in &mut receivers {
            assert_eq!(
                rx.recv().await.as_deref(),
                Some(r#"{"type":"pixel","pixels":[{"x":1,"y":2,"color":3}]}"#)
            );
        }
    }

    #[tokio::test]
    async fn test_broadcast_skips_closed_and_ignores_stalled_connections() {
        // テスト項目: 読まれていない接続や閉じた接続があってもブロードキャストは止まらない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let (stalled, _stalled_rx) = connection();
        let (closed, closed_rx) = connection();
        let (healthy, mut healthy_rx) = connection();
        drop(closed_rx);
        pusher
            .register_client(ConnectionKey::from_ip("stalled"), stalled)
            .await
            .unwrap();
        pusher
            .register_client(ConnectionKey::from_ip("closed"), closed)
            .await
            .unwrap();
        pusher
            .register_client(ConnectionKey::from_ip("healthy"), healthy)
            .await
            .unwrap();

        // when (操作): 詰まった接続のキューに大量に積む
        for _ in 0..1000 {
            pusher.broadcast(&placed_event()).await.unwrap();
        }

        // then (期待する結果):
        let mut received = 0;
        while healthy_rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 1000);
    }

    #[tokio::test]
    async fn test_per_connection_order_is_fifo() {
        // テスト項目: 1 つの接続に対するメッセージは送った順に届く
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let key = ConnectionKey::from_ip("10.0.0.1");
        let (conn, mut rx) = connection();
        pusher.register_client(key.clone(), conn).await.unwrap();

        // when (操作):
        for count in 0..5 {
            pusher
                .push_to(
                    &key,
                    &ServerEvent::PixelsAvailable {
                        count,
                        cause: StackCause::StackGain,
                    },
                )
                .await
                .unwrap();
        }

        // then (期待する結果):
        for count in 0..5 {
            let message = rx.recv().await.unwrap();
            assert!(message.contains(&format!("\"count\":{}", count)));
        }
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        // テスト項目: 同じキーでの 2 本目の登録は拒否され、1 本目が残る
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let key = ConnectionKey::from_ip("10.0.0.1");
        let (first, mut first_rx) = connection();
        let (second, mut second_rx) = connection();
        pusher.register_client(key.clone(), first).await.unwrap();

        // when (操作):
        let result = pusher.register_client(key.clone(), second).await;
        pusher.broadcast(&placed_event()).await.unwrap();

        // then (期待する結果):
        assert_eq!(
            result,
            Err(MessagePushError::DuplicateKey("ip:10.0.0.1".to_string()))
        );
        assert_eq!(pusher.online_count(), 1);
        assert!(first_rx.recv().await.is_some());
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregister_requires_matching_connection_id() {
        // テスト項目: 別の接続 ID では登録解除されない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();
        let key = ConnectionKey::from_ip("10.0.0.1");
        let (conn, _rx) = connection();
        let id = conn.id;
        pusher.register_client(key.clone(), conn).await.unwrap();

        // when (操作):
        pusher
            .unregister_client(&key, ConnectionId::generate())
            .await;
        let after_wrong_id = pusher.online_count();
        pusher.unregister_client(&key, id).await;

        // then (期待する結果):
        assert_eq!(after_wrong_id, 1);
        assert_eq!(pusher.online_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_empty_registry() {
        // テスト項目: 接続がなくてもエラーにならない
        // given (前提条件):
        let pusher = WebSocketMessagePusher::new();

        // when (操作):
        let result = pusher.broadcast(&placed_event()).await;

        // then (期待する結果):
        assert_eq!(result, Ok(0));
    }
}
