//! UseCase: クライアント接続処理
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ConnectClientUseCase::execute() / greet() / attach_stack_events()
//! - 接続の登録、接続直後に送るメッセージの順番、stacker イベントの転送
//!
//! ### なぜこのテストが必要か
//! - 再接続で進行中のクールダウンがリセットされないことを保証
//! - 切断後に stacker イベントの転送が止まり、stacker 自体は止まらないことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：新規接続、stack > 0 / stack == 0 での挨拶
//! - 異常系：重複した接続キー

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{
    ActiveUser, Connection, ConnectionKey, MessagePushError, MessagePusher, ServerEvent,
    StackCause,
};

use super::error::ConnectError;

/// クライアント接続のユースケース
pub struct ConnectClientUseCase {
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectClientUseCase {
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self { message_pusher }
    }

    /// 接続を ConnectionRegistry に登録
    ///
    /// # Returns
    ///
    /// * `Ok(())` - 登録成功
    /// * `Err(ConnectError::DuplicateKey)` - 同じキーの接続がすでにある
    pub async fn execute(
        &self,
        key: ConnectionKey,
        connection: Connection,
    ) -> Result<(), ConnectError> {
        self.message_pusher
            .register_client(key, connection)
            .await
            .map_err(|e| match e {
                MessagePushError::DuplicateKey(key) => ConnectError::DuplicateKey(key),
                other => ConnectError::Registry(other.to_string()),
            })
    }

    /// 接続直後のメッセージを送り、必要なら stacker を動かす
    ///
    /// 1. `pixels{cause: auth}`
    /// 2. `userinfo`
    /// 3. stack > 0 なら `pixels{cause: connected}`
    /// 4. stacker が止まっていれば再開（動いていれば触らない）
    /// 5. stack == 0 なら `cooldown{wait}`
    pub async fn greet(
        &self,
        active: &ActiveUser,
        key: &ConnectionKey,
    ) -> Result<(), MessagePushError> {
        let stacker = &active.stacker;
        self.message_pusher
            .push_to(
                key,
                &ServerEvent::PixelsAvailable {
                    count: stacker.stack(),
                    cause: StackCause::Auth,
                },
            )
            .await?;
        self.message_pusher
            .push_to(
                key,
                &ServerEvent::UserInfo {
                    method: active.user.login.method.clone(),
                    role: active.user.role,
                    username: active.user.name.clone(),
                },
            )
            .await?;

        let stack = stacker.stack();
        if stack > 0 {
            self.message_pusher
                .push_to(
                    key,
                    &ServerEvent::PixelsAvailable {
                        count: stack,
                        cause: StackCause::Connected,
                    },
                )
                .await?;
        }

        if stacker.resume().await {
            tracing::debug!("Stacker of user {} resumed", active.id());
        }

        if stacker.stack() == 0 {
            self.message_pusher
                .push_to(
                    key,
                    &ServerEvent::Cooldown {
                        wait: stacker.remaining_cooldown(),
                    },
                )
                .await?;
        }
        Ok(())
    }

    /// stacker のイベントを `pixels` メッセージとしてこの接続に転送する
    ///
    /// `cancel` が発火するか購読が別の接続に移ると終了する。stacker 自体は止めない。
    pub fn attach_stack_events(
        &self,
        active: Arc<ActiveUser>,
        key: ConnectionKey,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let mut events = active.stacker.subscribe();
        let message_pusher = self.message_pusher.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(event) = event else {
                    tracing::debug!("Stack events of '{}' moved to another connection", key);
                    break;
                };
                let pushed = message_pusher
                    .push_to(
                        &key,
                        &ServerEvent::PixelsAvailable {
                            count: event.stack,
                            cause: event.kind.into(),
                        },
                    )
                    .await;
                if let Err(e) = pushed {
                    tracing::debug!("Stopped forwarding stack events to '{}': {}", key, e);
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{FixedCooldown, Role, StackingPolicy, User, UserId, UserLogin},
        infrastructure::WebSocketMessagePusher,
    };
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// initial_stack: 0 ならクールダウン中、それ以外は 1 で有効化する
    fn active_user(initial_stack: u32) -> Arc<ActiveUser> {
        let policy = Arc::new(StackingPolicy::new(
            3,
            1.0,
            Arc::new(FixedCooldown::new(Duration::from_millis(1000))),
        ));
        let now = chrono::Utc::now();
        let cooldown_expiry = (initial_stack == 0).then(|| now + chrono::Duration::seconds(60));
        Arc::new(ActiveUser::activate(
            User {
                id: UserId::new(1),
                name: "alice".to_string(),
                role: Role::User,
                login: UserLogin::ip("10.0.0.1"),
                pixel_count: 0,
                pixel_count_alltime: 0,
                cooldown_expiry,
            },
            policy,
            now,
        ))
    }

    async fn connect(
        usecase: &ConnectClientUseCase,
        key: &ConnectionKey,
    ) -> mpsc::UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        usecase
            .execute(key.clone(), Connection::new(tx, CancellationToken::new()))
            .await
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Arc<str>>) -> Vec<Value> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(serde_json::from_str(&message).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_duplicate_key_is_rejected() {
        // テスト項目: 同じキーでの 2 本目の接続は DuplicateKey エラー
        // given (前提条件):
        let usecase = ConnectClientUseCase::new(Arc::new(WebSocketMessagePusher::new()));
        let key = ConnectionKey::from_ip("10.0.0.1");
        let _rx = connect(&usecase, &key).await;

        // when (操作):
        let (tx, _rx2) = mpsc::unbounded_channel();
        let result = usecase
            .execute(key, Connection::new(tx, CancellationToken::new()))
            .await;

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ConnectError::DuplicateKey("ip:10.0.0.1".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_greet_with_available_pixels() {
        // テスト項目: stack > 0 なら auth → userinfo → connected の順で送られ、cooldown は送られない
        // given (前提条件):
        let usecase = ConnectClientUseCase::new(Arc::new(WebSocketMessagePusher::new()));
        let key = ConnectionKey::from_ip("10.0.0.1");
        let mut rx = connect(&usecase, &key).await;
        let active = active_user(1);

        // when (操作):
        usecase.greet(&active, &key).await.unwrap();

        // then (期待する結果):
        let messages = drain(&mut rx);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["type"], "pixels");
        assert_eq!(messages[0]["cause"], "auth");
        assert_eq!(messages[1]["type"], "userinfo");
        assert_eq!(messages[1]["method"], "ip");
        assert_eq!(messages[1]["role"], "USER");
        assert_eq!(messages[1]["username"], "alice");
        assert_eq!(messages[2]["cause"], "connected");
        assert_eq!(messages[2]["count"], 1);
        assert!(active.stacker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_greet_with_empty_stack_sends_cooldown() {
        // テスト項目: stack == 0 なら connected は送られず、残りクールダウンが送られる
        // given (前提条件):
        let usecase = ConnectClientUseCase::new(Arc::new(WebSocketMessagePusher::new()));
        let key = ConnectionKey::from_ip("10.0.0.1");
        let mut rx = connect(&usecase, &key).await;
        let active = active_user(0);

        // when (操作):
        usecase.greet(&active, &key).await.unwrap();

        // then (期待する結果):
        let messages = drain(&mut rx);
        let types: Vec<&str> = messages.iter().map(|m| m["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["pixels", "userinfo", "cooldown"]);
        assert_eq!(messages[0]["count"], 0);
        assert_eq!(messages[2]["wait"], 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_does_not_reset_running_interval() {
        // テスト項目: 再接続の挨拶で進行中のクールダウンはリセットされない
        // given (前提条件):
        let usecase = ConnectClientUseCase::new(Arc::new(WebSocketMessagePusher::new()));
        let key = ConnectionKey::from_ip("10.0.0.1");
        let mut rx = connect(&usecase, &key).await;
        let active = active_user(0);
        active.stacker.start().await;
        tokio::time::sleep(Duration::from_millis(600)).await;

        // when (操作):
        usecase.greet(&active, &key).await.unwrap();

        // then (期待する結果): 残りは 400ms のまま
        let messages = drain(&mut rx);
        let wait = messages[2]["wait"].as_f64().unwrap();
        assert!((wait - 0.4).abs() < 0.01, "wait was {}", wait);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_events_are_forwarded_until_cancelled() {
        // テスト項目: stacker のイベントが pixels として届き、キャンセル後は届かない
        // given (前提条件):
        let usecase = ConnectClientUseCase::new(Arc::new(WebSocketMessagePusher::new()));
        let key = ConnectionKey::from_ip("10.0.0.1");
        let mut rx = connect(&usecase, &key).await;
        let active = active_user(0);
        let cancel = CancellationToken::new();
        let forwarder = usecase.attach_stack_events(active.clone(), key.clone(), cancel.clone());

        // when (操作):
        active.stacker.start().await;
        tokio::time::sleep(Duration::from_millis(1001)).await;
        let gained = rx.recv().await.unwrap();
        cancel.cancel();
        forwarder.await.unwrap();
        active.stacker.consume().await;

        // then (期待する結果): stacker 自体は動き続けている
        let gained: Value = serde_json::from_str(&gained).unwrap();
        assert_eq!(gained["cause"], "stackGain");
        assert_eq!(gained["count"], 1);
        assert!(rx.try_recv().is_err());
        assert!(active.stacker.is_running());
    }
}
