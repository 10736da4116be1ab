//! User entity and its in-memory active form.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

use super::{cooldown::StackingPolicy, stacker::PixelStacker, value_object::UserId};

/// Display name given to identities provisioned from an IP address.
pub const ANONYMOUS_NAME: &str = "-snip-";

/// Login method used for per-IP anonymous identities.
pub const IP_LOGIN_METHOD: &str = "ip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Can place and look up pixels.
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Moderator => "MODERATOR",
            Role::Admin => "ADMIN",
        }
    }
}

/// How a user signs in: a method (`ip`, `discord`, ...) plus the
/// method-specific key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserLogin {
    pub method: String,
    pub key: String,
}

impl UserLogin {
    pub fn new(method: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            key: key.into(),
        }
    }

    pub fn ip(ip: &str) -> Self {
        Self::new(IP_LOGIN_METHOD, ip)
    }

    /// Parse the `method:key` storage form.
    pub fn parse(raw: &str) -> Option<Self> {
        let (method, key) = raw.split_once(':')?;
        Some(Self::new(method, key))
    }
}

impl fmt::Display for UserLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.method, self.key)
    }
}

/// A user as the Store knows it.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub login: UserLogin,
    pub pixel_count: u64,
    pub pixel_count_alltime: u64,
    pub cooldown_expiry: Option<DateTime<Utc>>,
}

/// A user with live process state: its stacker and the placement lock.
///
/// Outlives individual connections; regeneration keeps going across reconnects.
pub struct ActiveUser {
    pub user: User,
    pub stacker: PixelStacker,
    placement: Mutex<()>,
}

impl ActiveUser {
    /// Start from `stack = 0` while the persisted cooldown checkpoint lies in
    /// the future, otherwise from one available pixel.
    pub fn activate(user: User, policy: Arc<StackingPolicy>, now: DateTime<Utc>) -> Self {
        let cooling_down = user.cooldown_expiry.is_some_and(|expiry| expiry > now);
        let initial_stack = if cooling_down { 0 } else { 1 };
        Self::with_stacker(user, PixelStacker::new(policy, initial_stack))
    }

    pub fn with_stacker(user: User, stacker: PixelStacker) -> Self {
        Self {
            user,
            stacker,
            placement: Mutex::new(()),
        }
    }

    pub fn id(&self) -> UserId {
        self.user.id
    }

    /// Serialize placements for this user: held for the whole pipeline.
    pub async fn lock_placement(&self) -> MutexGuard<'_, ()> {
        self.placement.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cooldown::FixedCooldown;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn test_user(cooldown_expiry: Option<DateTime<Utc>>) -> User {
        User {
            id: UserId::new(1),
            name: "alice".to_string(),
            role: Role::User,
            login: UserLogin::ip("127.0.0.1"),
            pixel_count: 0,
            pixel_count_alltime: 0,
            cooldown_expiry,
        }
    }

    fn test_policy() -> Arc<StackingPolicy> {
        Arc::new(StackingPolicy::new(
            3,
            1.0,
            Arc::new(FixedCooldown::new(Duration::from_secs(1))),
        ))
    }

    #[test]
    fn test_user_login_round_trip() {
        // テスト項目: UserLogin は method:key 形式で保存・復元できる
        // given (前提条件):
        let login = UserLogin::new("discord", "1234:5678");

        // when (操作):
        let parsed = UserLogin::parse(&login.to_string());

        // then (期待する結果): key に ':' が含まれていても最初の ':' で分割される
        assert_eq!(parsed, Some(login));
        assert_eq!(UserLogin::parse("no-separator"), None);
    }

    #[tokio::test]
    async fn test_activate_while_cooling_down_starts_empty() {
        // テスト項目: クールダウン期限が未来なら stack=0 で開始する
        // given (前提条件):
        let now = Utc::now();
        let user = test_user(Some(now + ChronoDuration::seconds(30)));

        // when (操作):
        let active = ActiveUser::activate(user, test_policy(), now);

        // then (期待する結果):
        assert_eq!(active.stacker.stack(), 0);
    }

    #[tokio::test]
    async fn test_activate_after_cooldown_starts_with_one() {
        // テスト項目: クールダウン期限が過去、または未設定なら stack=1 で開始する
        // given (前提条件):
        let now = Utc::now();
        let expired = test_user(Some(now - ChronoDuration::seconds(1)));
        let fresh = test_user(None);

        // when (操作):
        let expired = ActiveUser::activate(expired, test_policy(), now);
        let fresh = ActiveUser::activate(fresh, test_policy(), now);

        // then (期待する結果):
        assert_eq!(expired.stacker.stack(), 1);
        assert_eq!(fresh.stacker.stack(), 1);
    }

    #[test]
    fn test_role_wire_names() {
        // テスト項目: Role はクライアントに送る大文字の名前を持つ
        // given (前提条件):
        let roles = [Role::User, Role::Moderator, Role::Admin];

        // when (操作):
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();

        // then (期待する結果):
        assert_eq!(names, vec!["USER", "MODERATOR", "ADMIN"]);
    }
}
