//! Cooldown policy shared by every identity's [`PixelStacker`].
//!
//! [`PixelStacker`]: super::stacker::PixelStacker

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// Upper bound of any computed cooldown. Longer intervals saturate to it.
pub const MAX_COOLDOWN: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Base interval between placements before stacking is taken into account.
pub trait BaseCooldown: Send + Sync {
    fn base_interval(&self) -> Duration;
}

/// A constant base interval.
#[derive(Debug, Clone, Copy)]
pub struct FixedCooldown(Duration);

impl FixedCooldown {
    pub fn new(interval: Duration) -> Self {
        Self(interval)
    }
}

impl BaseCooldown for FixedCooldown {
    fn base_interval(&self) -> Duration {
        self.0
    }
}

/// Base interval that grows with the number of live connections:
/// `2.5 × sqrt(online + 11.96) + 6.5` seconds.
#[derive(Debug, Clone)]
pub struct ActivityCooldown {
    online: Arc<AtomicUsize>,
}

impl ActivityCooldown {
    pub fn new(online: Arc<AtomicUsize>) -> Self {
        Self { online }
    }
}

impl BaseCooldown for ActivityCooldown {
    fn base_interval(&self) -> Duration {
        let online = self.online.load(Ordering::Relaxed) as f64;
        Duration::from_secs_f64(2.5 * (online + 11.96).sqrt() + 6.5)
    }
}

/// Stacking rules: reserve size and how the refill interval scales with it.
pub struct StackingPolicy {
    pub max_stacked: u32,
    pub multiplier: f64,
    base: Arc<dyn BaseCooldown>,
}

impl StackingPolicy {
    pub fn new(max_stacked: u32, multiplier: f64, base: Arc<dyn BaseCooldown>) -> Self {
        Self {
            max_stacked,
            multiplier,
            base,
        }
    }

    /// `base × multiplier × (stack + 1)`.
    ///
    /// The multiplier is applied once; the growth with `stack` is linear.
    /// Saturates at [`MAX_COOLDOWN`].
    pub fn cooldown(&self, stack: u32) -> Duration {
        let factor = (self.multiplier * (f64::from(stack) + 1.0)).max(0.0);
        let secs = self.base.base_interval().as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs)
            .map_or(MAX_COOLDOWN, |interval| interval.min(MAX_COOLDOWN))
    }
}
