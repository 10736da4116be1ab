//! UseCase: 接続元のセッション解決
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - ResolveSessionUseCase::execute() メソッド
//! - トークン → キャッシュ → Store の順での解決、IP での匿名ユーザー作成
//!
//! ### なぜこのテストが必要か
//! - 同じユーザーに対して ActiveUser（と stacker）が 1 つだけ作られることを保証
//! - Store の NotFound とそれ以外の失敗を区別して扱うことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：キャッシュヒット、Store ヒット、新規作成
//! - 異常系：Store が使えない
//! - エッジケース：未知のトークン、IP 認証が無効

use std::sync::Arc;

use tsubu_shared::time::Clock;
use uuid::Uuid;

use crate::{
    config::ConnectionKeyMode,
    domain::{
        ActiveUser, ConnectionKey, StackingPolicy, Store, User, UserLogin, user::ANONYMOUS_NAME,
    },
    infrastructure::{CacheError, IdentityCache},
};

use super::error::ResolveError;

/// 接続リクエストから取り出した情報
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Cookie かクエリで渡されたセッショントークン
    pub token: Option<String>,
    pub ip: String,
    pub user_agent: String,
}

/// 解決結果
pub struct ResolvedSession {
    /// 解決できなければ None（閲覧のみ可能）
    pub user: Option<Arc<ActiveUser>>,
    /// 今回新しく発行したトークン（クライアントに Cookie で返す）
    pub issued_token: Option<String>,
}

impl ResolvedSession {
    fn anonymous() -> Self {
        Self {
            user: None,
            issued_token: None,
        }
    }

    fn found(user: Arc<ActiveUser>) -> Self {
        Self {
            user: Some(user),
            issued_token: None,
        }
    }

    /// この接続で有効なトークン（今回発行したもの、なければリクエストのもの）
    pub fn token<'a>(&'a self, request: &'a RequestInfo) -> Option<&'a str> {
        self.issued_token
            .as_deref()
            .or(request.token.as_deref())
    }
}

/// ConnectionRegistry に登録するキーを決める
pub fn connection_key(mode: ConnectionKeyMode, token: Option<&str>, ip: &str) -> ConnectionKey {
    match (mode, token) {
        (ConnectionKeyMode::Session, Some(token)) => ConnectionKey::from_token(token),
        _ => ConnectionKey::from_ip(ip),
    }
}

/// セッション解決のユースケース
pub struct ResolveSessionUseCase {
    store: Arc<dyn Store>,
    cache: Arc<IdentityCache>,
    policy: Arc<StackingPolicy>,
    clock: Arc<dyn Clock>,
    /// トークンのない接続を IP ごとの匿名ユーザーとして扱うか
    use_ip: bool,
}

impl ResolveSessionUseCase {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<IdentityCache>,
        policy: Arc<StackingPolicy>,
        clock: Arc<dyn Clock>,
        use_ip: bool,
    ) -> Self {
        Self {
            store,
            cache,
            policy,
            clock,
            use_ip,
        }
    }

    /// セッション解決を実行
    ///
    /// 1. トークンがあれば キャッシュ → Store の順に探す
    /// 2. 見つからず IP 認証が有効なら、IP で キャッシュ → Store の順に探す
    /// 3. それでも見つからなければ匿名ユーザーを作成し、トークンを発行する
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedSession)` - 解決結果（ユーザーなしの場合も含む）
    /// * `Err(ResolveError)` - Store が NotFound 以外で失敗した
    pub async fn execute(&self, request: &RequestInfo) -> Result<ResolvedSession, ResolveError> {
        if let Some(token) = request.token.as_deref() {
            let key = ConnectionKey::from_token(token);
            if let Some(active) = self.cache.get_by_key(&key).await {
                return Ok(ResolvedSession::found(active));
            }
            match self.store.get_user_by_token(token).await {
                Ok(user) => {
                    let active = self.activate(key, user).await?;
                    return Ok(ResolvedSession::found(active));
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!("Unknown session token from {}", request.ip);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !self.use_ip {
            return Ok(ResolvedSession::anonymous());
        }

        let key = ConnectionKey::from_ip(&request.ip);
        if let Some(active) = self.cache.get_by_key(&key).await {
            return Ok(ResolvedSession::found(active));
        }
        match self.store.get_user_by_login(&UserLogin::ip(&request.ip)).await {
            Ok(user) => {
                let active = self.activate(key, user).await?;
                Ok(ResolvedSession::found(active))
            }
            Err(e) if e.is_not_found() => self.provision(key, request).await,
            Err(e) => Err(e.into()),
        }
    }

    /// キャッシュだけを見る（Store には問い合わせず、作成もしない）
    pub async fn lookup_cached(&self, request: &RequestInfo) -> Option<Arc<ActiveUser>> {
        if let Some(token) = request.token.as_deref() {
            if let Some(active) = self.cache.get_by_key(&ConnectionKey::from_token(token)).await {
                return Some(active);
            }
        }
        if !self.use_ip {
            return None;
        }
        self.cache
            .get_by_key(&ConnectionKey::from_ip(&request.ip))
            .await
    }

    async fn provision(
        &self,
        key: ConnectionKey,
        request: &RequestInfo,
    ) -> Result<ResolvedSession, ResolveError> {
        let user = self
            .store
            .create_user(
                ANONYMOUS_NAME,
                UserLogin::ip(&request.ip),
                &request.ip,
                &request.user_agent,
            )
            .await?;
        tracing::info!("Provisioned user {} for {}", user.id, request.ip);

        let token = Uuid::new_v4().to_string();
        let issued_token = match self.store.save_session(user.id, &token).await {
            Ok(()) => Some(token),
            Err(e) => {
                tracing::warn!("Failed to save session for user {}: {}", user.id, e);
                None
            }
        };

        let active = self.activate(key, user.clone()).await?;
        if let Some(token) = issued_token.as_deref() {
            self.activate(ConnectionKey::from_token(token), user).await?;
        }
        Ok(ResolvedSession {
            user: Some(active),
            issued_token,
        })
    }

    /// キャッシュに載せる。同時に同じキーで解決された場合は先に載った方を使う
    async fn activate(&self, key: ConnectionKey, user: User) -> Result<Arc<ActiveUser>, ResolveError> {
        match self
            .cache
            .insert(key.clone(), user, self.policy.clone(), self.clock.now())
            .await
        {
            Ok(active) => Ok(active),
            Err(CacheError::Conflict(raw)) => match self.cache.get_by_key(&key).await {
                Some(active) => Ok(active),
                None => Err(CacheError::Conflict(raw).into()),
            },
        }
    }
}
