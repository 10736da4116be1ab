//! PixelStacker: the per-identity regenerating placement allowance.
//!
//! ## 状態
//!
//! - **Idle**: タイマーなし
//! - **Running**: タイマーが 1 本だけ動いていて、次の 1 ピクセルの付与を待っている
//!
//! ## 不変条件
//!
//! - 常に `0 <= stack <= max_stacked`
//! - 1 つの identity に対して動いているタイマータスクは高々 1 本。
//!   `start` / `stop` は古いタスクをキャンセルし、終了を待ってから（join してから）
//!   新しいタスクを起動する。古いタスクの発火が新しいタスクの付与と重なることはない。
//!
//! ## イベント
//!
//! 付与・消費のたびに [`StackEvent`] を容量 1 のチャンネルに送る。
//! 受信側が前のイベントを読むまで送信側は待つ（捨てない）。購読者は最新の 1 つだけで、
//! `subscribe` し直すと前の購読者は切り離される。

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{
    sync::{Mutex as AsyncMutex, mpsc},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use super::cooldown::StackingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEventKind {
    Gained,
    Consumed,
}

/// Notification that the stack changed; `stack` is the value after the change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEvent {
    pub kind: StackEventKind,
    pub stack: u32,
}

impl StackEvent {
    pub fn gained(stack: u32) -> Self {
        Self {
            kind: StackEventKind::Gained,
            stack,
        }
    }

    pub fn consumed(stack: u32) -> Self {
        Self {
            kind: StackEventKind::Consumed,
            stack,
        }
    }
}

/// Receiving end of a stacker subscription.
pub type StackEvents = mpsc::Receiver<StackEvent>;

struct StackState {
    stack: u32,
    running: bool,
    last_reset: Instant,
}

struct Shared {
    policy: Arc<StackingPolicy>,
    state: Mutex<StackState>,
    listener: Mutex<Option<mpsc::Sender<StackEvent>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> MutexGuard<'_, Option<mpsc::Sender<StackEvent>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One unit, unless the reserve is already full.
    fn grant(&self) -> Option<u32> {
        let mut state = self.state();
        if state.stack >= self.policy.max_stacked {
            return None;
        }
        state.stack += 1;
        Some(state.stack)
    }

    async fn emit(&self, event: StackEvent) {
        let sender = { self.listener().clone() };
        let Some(sender) = sender else {
            return;
        };
        if sender.send(event).await.is_err() {
            // subscriber went away; detach it unless someone re-subscribed meanwhile
            let mut slot = self.listener();
            if slot
                .as_ref()
                .is_some_and(|current| current.same_channel(&sender))
            {
                *slot = None;
            }
        }
    }
}

struct Timer {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct PixelStacker {
    shared: Arc<Shared>,
    timer: AsyncMutex<Option<Timer>>,
}

impl PixelStacker {
    /// Create an idle stacker. `initial_stack` is clamped to `max_stacked`.
    pub fn new(policy: Arc<StackingPolicy>, initial_stack: u32) -> Self {
        let stack = initial_stack.min(policy.max_stacked);
        Self {
            shared: Arc::new(Shared {
                policy,
                state: Mutex::new(StackState {
                    stack,
                    running: false,
                    last_reset: Instant::now(),
                }),
                listener: Mutex::new(None),
            }),
            timer: AsyncMutex::new(None),
        }
    }

    pub fn stack(&self) -> u32 {
        self.shared.state().stack
    }

    pub fn max_stacked(&self) -> u32 {
        self.shared.policy.max_stacked
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().running
    }

    /// Interval until the next grant, computed from the current stack.
    pub fn cooldown(&self) -> Duration {
        let stack = self.stack();
        self.shared.policy.cooldown(stack)
    }

    /// [`cooldown`](Self::cooldown) minus the time since the timer was last
    /// reset, floored at zero.
    pub fn remaining_cooldown(&self) -> Duration {
        let state = self.shared.state();
        self.shared
            .policy
            .cooldown(state.stack)
            .saturating_sub(state.last_reset.elapsed())
    }

    /// Attach a listener, detaching the previous one.
    pub fn subscribe(&self) -> StackEvents {
        let (tx, rx) = mpsc::channel(1);
        *self.shared.listener() = Some(tx);
        rx
    }

    /// Cancel any armed timer, wait for it to finish, then arm a fresh one.
    pub async fn start(&self) {
        let mut timer = self.timer.lock().await;
        self.cancel_and_join(&mut timer).await;
        self.arm(&mut timer);
    }

    /// Arm the timer only when idle, so an in-flight interval is not reset.
    ///
    /// Returns `true` when a timer was armed.
    pub async fn resume(&self) -> bool {
        let mut timer = self.timer.lock().await;
        if self.is_running() {
            return false;
        }
        self.cancel_and_join(&mut timer).await;
        self.arm(&mut timer);
        true
    }

    /// Cancel any armed timer and wait for it to finish. Idempotent.
    pub async fn stop(&self) {
        let mut timer = self.timer.lock().await;
        self.cancel_and_join(&mut timer).await;
    }

    /// Take one unit. No-op at zero. Does not restart the timer.
    pub async fn consume(&self) {
        let stack = {
            let mut state = self.shared.state();
            if state.stack == 0 {
                return;
            }
            state.stack -= 1;
            state.stack
        };
        self.shared.emit(StackEvent::consumed(stack)).await;
    }

    async fn cancel_and_join(&self, slot: &mut Option<Timer>) {
        let Some(timer) = slot.take() else {
            self.shared.state().running = false;
            return;
        };
        // idle as soon as the timer is cancelled, even if this future is
        // dropped before the join completes
        timer.cancel.cancel();
        self.shared.state().running = false;
        if let Err(e) = timer.task.await {
            if e.is_panic() {
                tracing::error!("Stacker timer task panicked: {}", e);
            }
        }
    }

    fn arm(&self, slot: &mut Option<Timer>) {
        {
            let mut state = self.shared.state();
            state.running = true;
            state.last_reset = Instant::now();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(self.shared.clone(), cancel.clone()));
        *slot = Some(Timer { cancel, task });
    }
}

impl Drop for PixelStacker {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.cancel.cancel();
        }
    }
}

async fn run_timer(shared: Arc<Shared>, cancel: CancellationToken) {
    loop {
        let interval = {
            let mut state = shared.state();
            if state.stack >= shared.policy.max_stacked {
                state.running = false;
                return;
            }
            state.last_reset = Instant::now();
            shared.policy.cooldown(state.stack)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        if cancel.is_cancelled() {
            return;
        }

        // full reserve: the check at the top of the loop goes idle
        let Some(stack) = shared.grant() else {
            continue;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = shared.emit(StackEvent::gained(stack)) => {}
        }
    }
}
