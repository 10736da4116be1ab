//! InMemory Store 実装
//!
//! ドメイン層が定義する Store trait の具体的な実装。
//! HashMap をインメモリ DB として使用します。
//!
//! プロセスが終了すると内容は失われます。SQL データベースなどの永続化先は
//! 同じ trait を実装することで差し替えられます。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    NewPlacement, PlacementRecord, Role, Store, StoreError, User, UserId, UserLogin,
};

#[derive(Default)]
struct StoreState {
    next_user_id: u64,
    next_placement_id: u64,
    users: HashMap<UserId, UserRow>,
    /// login (method:key) → user
    logins: HashMap<String, UserId>,
    /// session token → user
    sessions: HashMap<String, UserId>,
    placements: Vec<PlacementRecord>,
}

struct UserRow {
    user: User,
    #[allow(dead_code)]
    signup_ip: String,
    #[allow(dead_code)]
    user_agent: String,
}

/// インメモリ Store 実装
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    /// 配置履歴をすべて取得（古い順）
    pub async fn placements(&self) -> Vec<PlacementRecord> {
        self.state.lock().await.placements.clone()
    }

    /// 座標の most_recent な配置を取得
    pub async fn most_recent_at(&self, x: u32, y: u32) -> Option<PlacementRecord> {
        let state = self.state.lock().await;
        state
            .placements
            .iter()
            .find(|p| p.most_recent && p.pixel.x == x && p.pixel.y == y)
            .cloned()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_user_by_id(&self, id: UserId) -> Result<User, StoreError> {
        let state = self.state.lock().await;
        state
            .users
            .get(&id)
            .map(|row| row.user.clone())
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    async fn get_user_by_login(&self, login: &UserLogin) -> Result<User, StoreError> {
        let state = self.state.lock().await;
        state
            .logins
            .get(&login.to_string())
            .and_then(|id| state.users.get(id))
            .map(|row| row.user.clone())
            .ok_or_else(|| StoreError::NotFound(format!("login {}", login)))
    }

    async fn get_user_by_token(&self, token: &str) -> Result<User, StoreError> {
        let state = self.state.lock().await;
        state
            .sessions
            .get(token)
            .and_then(|id| state.users.get(id))
            .map(|row| row.user.clone())
            .ok_or_else(|| StoreError::NotFound("session token".to_string()))
    }

    async fn create_user(
        &self,
        name: &str,
        login: UserLogin,
        ip: &str,
        user_agent: &str,
    ) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        let raw_login = login.to_string();
        if state.logins.contains_key(&raw_login) {
            return Err(StoreError::Conflict(format!(
                "user with same login ({}) already in store",
                raw_login
            )));
        }

        state.next_user_id += 1;
        let user = User {
            id: UserId::new(state.next_user_id),
            name: name.to_string(),
            role: Role::User,
            login,
            pixel_count: 0,
            pixel_count_alltime: 0,
            cooldown_expiry: None,
        };
        state.logins.insert(raw_login, user.id);
        state.users.insert(
            user.id,
            UserRow {
                user: user.clone(),
                signup_ip: ip.to_string(),
                user_agent: user_agent.to_string(),
            },
        );
        Ok(user)
    }

    async fn save_session(&self, user_id: UserId, token: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        if state.sessions.contains_key(token) {
            return Err(StoreError::Conflict("session token already exists".to_string()));
        }
        state.sessions.insert(token.to_string(), user_id);
        Ok(())
    }

    async fn record_placement(&self, placement: NewPlacement) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        // 全部成功するか何も変えないか: 先に配置者を確認する
        if !state.users.contains_key(&placement.placer) {
            return Err(StoreError::NotFound(format!("user {}", placement.placer)));
        }

        let (x, y) = (placement.pixel.x, placement.pixel.y);
        for previous in state
            .placements
            .iter_mut()
            .filter(|p| p.most_recent && p.pixel.x == x && p.pixel.y == y)
        {
            previous.most_recent = false;
        }

        state.next_placement_id += 1;
        let record = PlacementRecord {
            id: state.next_placement_id,
            pixel: placement.pixel,
            placer: placement.placer,
            placed_at: placement.placed_at,
            most_recent: true,
        };
        state.placements.push(record);

        if let Some(row) = state.users.get_mut(&placement.placer) {
            row.user.pixel_count += 1;
            row.user.pixel_count_alltime += 1;
        }
        Ok(())
    }

    async fn set_cooldown_expiry(
        &self,
        user_id: UserId,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let row = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        row.user.cooldown_expiry = Some(expiry);
        Ok(())
    }
}
