//! UseCase: キャンバスのスナップショット保存・復元
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - SaveCanvasUseCase::execute() / restore() / spawn_periodic()
//!
//! ### なぜこのテストが必要か
//! - 設定より大きいスナップショットで黙って状態を壊さないことを保証
//!   （猶予時間を置いてから切り詰める）
//! - 定期保存がキャンセルで止まることを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：保存、同じサイズ・小さいサイズの復元
//! - 異常系：スナップショットがない、保存先の失敗
//! - エッジケース：設定より大きいスナップショット

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{Canvas, CanvasError, CanvasSnapshotStore};

use super::error::SaveCanvasError;

/// 復元の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// スナップショットがなかった（背景色のまま）
    Blank,
    /// そのまま読み込んだ
    Loaded { bytes: usize },
    /// 大きすぎたので切り詰めて読み込んだ
    Truncated { expected: usize, actual: usize },
}

/// キャンバス保存のユースケース
pub struct SaveCanvasUseCase {
    canvas: Arc<Canvas>,
    snapshots: Arc<dyn CanvasSnapshotStore>,
}

impl SaveCanvasUseCase {
    pub fn new(canvas: Arc<Canvas>, snapshots: Arc<dyn CanvasSnapshotStore>) -> Self {
        Self { canvas, snapshots }
    }

    /// 現在のキャンバスを保存
    ///
    /// # Returns
    ///
    /// 保存したバイト数
    pub async fn execute(&self) -> Result<usize, SaveCanvasError> {
        let board = self.canvas.serialize();
        self.snapshots.save(&board).await?;
        Ok(board.len())
    }

    /// 保存されたスナップショットを読み込む
    ///
    /// 設定より大きい場合は `grace` だけ待ってから切り詰める。
    /// 待っている間にプロセスを止めれば元のファイルはそのまま残る。
    pub async fn restore(&self, grace: Duration) -> Result<RestoreOutcome, SaveCanvasError> {
        let Some(bytes) = self.snapshots.load().await? else {
            return Ok(RestoreOutcome::Blank);
        };
        match self.canvas.load(&bytes) {
            Ok(()) => Ok(RestoreOutcome::Loaded { bytes: bytes.len() }),
            Err(CanvasError::SnapshotTooLarge { expected, actual }) => {
                tracing::warn!(
                    "Canvas snapshot has {} bytes but the board has {} cells. \
                     It will be truncated in {} seconds; stop the server now to keep it.",
                    actual,
                    expected,
                    grace.as_secs()
                );
                tokio::time::sleep(grace).await;
                self.canvas.load_truncated(&bytes);
                tracing::warn!("Canvas snapshot truncated to {} bytes", expected);
                Ok(RestoreOutcome::Truncated { expected, actual })
            }
            Err(e) => {
                // load が返すのは SnapshotTooLarge だけ
                tracing::error!("Unexpected canvas error while restoring: {}", e);
                Ok(RestoreOutcome::Blank)
            }
        }
    }

    /// `interval` ごとに保存するタスクを起動する。`cancel` で止まる
    pub fn spawn_periodic(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let usecase = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match usecase.execute().await {
                    Ok(bytes) => tracing::debug!("Periodic canvas save ({} bytes)", bytes),
                    Err(e) => tracing::warn!("Periodic canvas save failed: {}", e),
                }
            }
            tracing::debug!("Periodic canvas save stopped");
        })
    }
}
