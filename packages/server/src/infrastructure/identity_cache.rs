//! In-memory cache of active identities.
//!
//! One entry per identity id plus one entry per lookup key (session token or
//! IP). An identity cached under several keys (e.g. first by IP, later by the
//! token issued to it) shares a single [`ActiveUser`], so its stacker keeps
//! running across all of them.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{ActiveUser, ConnectionKey, StackingPolicy, User, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Key already cached: {0}")]
    Conflict(String),
}

#[derive(Default)]
struct Entries {
    by_id: HashMap<UserId, Arc<ActiveUser>>,
    by_key: HashMap<ConnectionKey, UserId>,
}

#[derive(Default)]
pub struct IdentityCache {
    entries: RwLock<Entries>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_by_key(&self, key: &ConnectionKey) -> Option<Arc<ActiveUser>> {
        let entries = self.entries.read().await;
        entries
            .by_key
            .get(key)
            .and_then(|id| entries.by_id.get(id))
            .cloned()
    }

    pub async fn get_by_id(&self, id: UserId) -> Option<Arc<ActiveUser>> {
        self.entries.read().await.by_id.get(&id).cloned()
    }

    /// Cache `user` under `key`.
    ///
    /// A key that is already cached is rejected. If the identity itself is
    /// already active (cached under another key) the key becomes an alias for
    /// the existing entry and no new stacker is created.
    pub async fn insert(
        &self,
        key: ConnectionKey,
        user: User,
        policy: Arc<StackingPolicy>,
        now: DateTime<Utc>,
    ) -> Result<Arc<ActiveUser>, CacheError> {
        let mut entries = self.entries.write().await;
        if entries.by_key.contains_key(&key) {
            return Err(CacheError::Conflict(key.to_string()));
        }

        let active = match entries.by_id.get(&user.id) {
            Some(existing) => existing.clone(),
            None => {
                let active = Arc::new(ActiveUser::activate(user, policy, now));
                entries.by_id.insert(active.id(), active.clone());
                tracing::debug!("Identity {} activated", active.id());
                active
            }
        };
        entries.by_key.insert(key, active.id());
        Ok(active)
    }

    /// Drop every entry of the identity and stop its regeneration.
    pub async fn evict(&self, id: UserId) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            entries.by_key.retain(|_, cached| *cached != id);
            entries.by_id.remove(&id)
        };
        match removed {
            Some(active) => {
                active.stacker.stop().await;
                tracing::debug!("Identity {} evicted", id);
                true
            }
            None => false,
        }
    }

    /// Evict every cached identity. Used on shutdown to stop all regeneration timers.
    ///
    /// Returns the number of identities evicted.
    pub async fn evict_all(&self) -> usize {
        let ids: Vec<UserId> = self.entries.read().await.by_id.keys().copied().collect();
        let mut evicted = 0;
        for id in ids {
            if self.evict(id).await {
                evicted += 1;
            }
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
