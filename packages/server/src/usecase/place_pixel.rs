//! UseCase: ピクセル配置（PlacementPipeline）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - PlacePixelUseCase::execute() メソッド
//! - 配置の各ステップ（ACK、消費、キャンバス更新、永続化、クールダウン通知、ブロードキャスト）
//!
//! ### なぜこのテストが必要か
//! - 拒否される配置では何も変わらない（ACK もブロードキャストも永続化もない）ことを保証
//! - 同じ座標への同時配置でもキャンバスと Store が食い違わないことを確認
//! - 永続化に失敗してもキャンバスの変更は巻き戻らないことを確認
//!
//! ### どのような状況を想定しているか
//! - 正常系：配置成功、stack が 0 になったときのクールダウン通知
//! - 異常系：ユーザーなし、stack 0、同じ色、範囲外、パレット外
//! - エッジケース：2 人が同じ座標に同時に配置

use std::sync::{Arc, Mutex, PoisonError};

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tsubu_shared::time::Clock;

use crate::{
    domain::{ActiveUser, Canvas, ConnectionKey, MessagePusher, NewPlacement, Pixel, ServerEvent},
    infrastructure::PersistenceQueue,
};

use super::error::PlaceError;

/// 配置が黙って拒否された理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// 接続にユーザーが紐付いていない
    NoIdentity,
    /// 使えるピクセルがない
    NoPixelsAvailable,
    /// すでに同じ色
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceOutcome {
    Placed,
    Rejected(RejectReason),
}

/// ピクセル配置のユースケース
pub struct PlacePixelUseCase {
    canvas: Arc<Canvas>,
    /// MessagePusher（メッセージ通知の抽象化）
    message_pusher: Arc<dyn MessagePusher>,
    persistence: PersistenceQueue,
    clock: Arc<dyn Clock>,
    /// キャンバス更新と永続化の積み込みを一体にする
    commit: Mutex<()>,
}

impl PlacePixelUseCase {
    pub fn new(
        canvas: Arc<Canvas>,
        message_pusher: Arc<dyn MessagePusher>,
        persistence: PersistenceQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            canvas,
            message_pusher,
            persistence,
            clock,
            commit: Mutex::new(()),
        }
    }

    /// [`execute`](Self::execute) を独立したタスクで実行する
    ///
    /// 呼び出し元のタスクが abort されても、ACK と消費のあとでキャンバス更新や
    /// ブロードキャスト、stacker の再開が途中で止まることはない。
    pub fn execute_detached(
        self: &Arc<Self>,
        user: Option<Arc<ActiveUser>>,
        key: ConnectionKey,
        pixel: Pixel,
    ) -> JoinHandle<Result<PlaceOutcome, PlaceError>> {
        let usecase = self.clone();
        tokio::spawn(async move { usecase.execute(user.as_deref(), &key, pixel).await })
    }

    /// 配置を実行
    ///
    /// 同じユーザーの配置は 1 つずつ処理される。
    ///
    /// # Arguments
    ///
    /// * `user` - 接続に紐付いたユーザー（なければ None）
    /// * `key` - 配置した接続のキー（ACK とクールダウン通知の送り先）
    /// * `pixel` - 配置リクエスト
    ///
    /// # Returns
    ///
    /// * `Ok(PlaceOutcome)` - 配置した、または黙って拒否した
    /// * `Err(PlaceError)` - 座標や色が不正（このメッセージだけ捨てる）
    pub async fn execute(
        &self,
        user: Option<&ActiveUser>,
        key: &ConnectionKey,
        pixel: Pixel,
    ) -> Result<PlaceOutcome, PlaceError> {
        let Some(active) = user else {
            return Ok(PlaceOutcome::Rejected(RejectReason::NoIdentity));
        };
        self.canvas
            .get(pixel.x, pixel.y)
            .map_err(|_| PlaceError::OutOfBounds {
                x: pixel.x,
                y: pixel.y,
            })?;
        if !self.canvas.palette().contains_index(pixel.color) {
            return Err(PlaceError::InvalidColor(pixel.color));
        }

        let _placement = active.lock_placement().await;
        let stacker = &active.stacker;

        // 1. 拒否判定（何も変えない）
        if stacker.stack() == 0 {
            return Ok(PlaceOutcome::Rejected(RejectReason::NoPixelsAvailable));
        }
        if self.canvas.get(pixel.x, pixel.y) == Ok(pixel.color) {
            return Ok(PlaceOutcome::Rejected(RejectReason::Unchanged));
        }

        // 2. 処理中は stacker を止める
        stacker.stop().await;

        // 3. 配置した接続にだけ ACK
        if let Err(e) = self
            .message_pusher
            .push_to(
                key,
                &ServerEvent::PlacementAck {
                    x: pixel.x,
                    y: pixel.y,
                },
            )
            .await
        {
            tracing::debug!("Failed to acknowledge placement to '{}': {}", key, e);
        }

        // 4. 1 つ消費
        stacker.consume().await;

        // 5-6. キャンバス更新と永続化（結果は待たない）
        {
            let _commit = self.commit.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = self.canvas.set(pixel.x, pixel.y, pixel.color) {
                tracing::error!("Canvas rejected a validated placement: {}", e);
            }
            self.persistence.record_placement(NewPlacement {
                pixel,
                placer: active.id(),
                placed_at: self.clock.now(),
            });
        }
        tracing::debug!(
            "User {} placed color {} at ({}, {})",
            active.id(),
            pixel.color,
            pixel.x,
            pixel.y
        );

        // 7. 減った stack で次の間隔を計算し直す
        stacker.start().await;

        // 8. 使い切ったらクールダウン期限を保存して通知
        if stacker.stack() == 0 {
            let wait = stacker.remaining_cooldown();
            let expiry = self.clock.now()
                + TimeDelta::from_std(wait).unwrap_or_else(|_| TimeDelta::zero());
            self.persistence.set_cooldown_expiry(active.id(), expiry);
            if let Err(e) = self
                .message_pusher
                .push_to(key, &ServerEvent::Cooldown { wait })
                .await
            {
                tracing::debug!("Failed to send cooldown to '{}': {}", key, e);
            }
        }

        // 9. 配置した本人を含む全員に配信
        if let Err(e) = self
            .message_pusher
            .broadcast(&ServerEvent::PixelsPlaced(vec![pixel]))
            .await
        {
            tracing::warn!("Failed to broadcast placement: {}", e);
        }

        Ok(PlaceOutcome::Placed)
    }
}
