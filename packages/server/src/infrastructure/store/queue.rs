//! 配置パスからの Store 書き込みを 1 本のワーカーで順番に処理するキュー
//!
//! 配置パイプラインは書き込みをキューに積むだけで待たない。
//! ワーカーは 1 つなので、同じ座標への記録は配置された順に適用される。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::domain::{NewPlacement, Store, UserId};

enum Job {
    RecordPlacement(NewPlacement),
    CooldownExpiry {
        user_id: UserId,
        expiry: DateTime<Utc>,
    },
    Flush(oneshot::Sender<()>),
}

/// 永続化キューへのハンドル
#[derive(Clone)]
pub struct PersistenceQueue {
    jobs: mpsc::UnboundedSender<Job>,
}

impl PersistenceQueue {
    /// ワーカーを起動してキューを作成
    ///
    /// すべての `PersistenceQueue` が drop されるとワーカーは終了する。
    pub fn spawn(store: Arc<dyn Store>) -> (Self, JoinHandle<()>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(store, rx));
        (Self { jobs }, worker)
    }

    /// 配置を記録する（結果は待たない）
    pub fn record_placement(&self, placement: NewPlacement) {
        if self.jobs.send(Job::RecordPlacement(placement)).is_err() {
            tracing::warn!("Persistence worker is gone, placement not recorded");
        }
    }

    /// クールダウン期限のチェックポイントを保存する（結果は待たない）
    pub fn set_cooldown_expiry(&self, user_id: UserId, expiry: DateTime<Utc>) {
        if self
            .jobs
            .send(Job::CooldownExpiry { user_id, expiry })
            .is_err()
        {
            tracing::warn!(
                "Persistence worker is gone, cooldown expiry for user {} not saved",
                user_id
            );
        }
    }

    /// それまでに積まれたジョブがすべて処理されるまで待つ
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.jobs.send(Job::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn run_worker(store: Arc<dyn Store>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::RecordPlacement(placement) => {
                let (x, y, placer) = (placement.pixel.x, placement.pixel.y, placement.placer);
                if let Err(e) = store.record_placement(placement).await {
                    tracing::warn!(
                        "Failed to record placement at ({}, {}) by user {}: {}",
                        x,
                        y,
                        placer,
                        e
                    );
                }
            }
            Job::CooldownExpiry { user_id, expiry } => {
                if let Err(e) = store.set_cooldown_expiry(user_id, expiry).await {
                    tracing::warn!(
                        "Failed to save cooldown expiry for user {}: {}",
                        user_id,
                        e
                    );
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Persistence worker stopped");
}
