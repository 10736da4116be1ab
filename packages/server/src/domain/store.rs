//! Store trait 定義
//!
//! ユーザー・セッション・配置履歴の永続化先へのインターフェース。
//! 具体的な実装は Infrastructure 層が提供します（依存性の逆転）。
//!
//! すべての操作は失敗しうる。「見つからない」は [`StoreError::NotFound`] として
//! 他の失敗と区別される。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    StoreError,
    user::{User, UserLogin},
    value_object::{Pixel, UserId},
};

/// 配置 1 件の書き込み要求
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlacement {
    pub pixel: Pixel,
    pub placer: UserId,
    pub placed_at: DateTime<Utc>,
}

/// Store に保存された配置履歴
///
/// 座標ごとに `most_recent` が立っている記録は高々 1 件。
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRecord {
    pub id: u64,
    pub pixel: Pixel,
    pub placer: UserId,
    pub placed_at: DateTime<Utc>,
    pub most_recent: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// ID でユーザーを取得
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError>;

    /// ログイン情報でユーザーを取得
    async fn get_user_by_login(&self, login: &UserLogin) -> Result<User, StoreError>;

    /// セッショントークンでユーザーを取得
    async fn get_user_by_token(&self, token: &str) -> Result<User, StoreError>;

    /// ユーザーを作成（同じログイン情報がすでにあれば Conflict）
    async fn create_user(
        &self,
        name: &str,
        login: UserLogin,
        ip: &str,
        user_agent: &str,
    ) -> Result<User, StoreError>;

    /// セッショントークンを保存
    async fn save_session(&self, user_id: UserId, token: &str) -> Result<(), StoreError>;

    /// 配置を記録（トランザクション）
    ///
    /// 1. 同じ座標の most_recent を下ろす
    /// 2. 新しい記録を most_recent として追加
    /// 3. 配置者のカウンタを増やす
    async fn record_placement(&self, placement: NewPlacement) -> Result<(), StoreError>;

    /// クールダウン期限のチェックポイントを保存
    async fn set_cooldown_expiry(
        &self,
        user_id: UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
