//! Inter-task pacing
//!
//! Sequential runs insert a delay between tasks to stay under an
//! unpublished rate limit. An adaptive pacer doubles that delay on every
//! rate-limited task and halves it again (down to the configured floor)
//! after a streak of successes.

use super::config::{PACER_MAX_DELAY_MS, PACER_RECOVERY_STREAK};
use crate::shutdown::ShutdownCoordinator;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Smallest delay an adaptive pacer grows to on its first 429
const MIN_ADAPTIVE_STEP_MS: u64 = 250;

/// Shared inter-task delay
///
/// Read by the dispatcher and adjusted by the result consumer; all state is
/// atomic so both sides can hold a shared reference.
#[derive(Debug)]
pub struct Pacer {
    floor_ms: u64,
    max_ms: u64,
    current_ms: AtomicU64,
    streak: AtomicU32,
    recovery_streak: u32,
    adaptive: bool,
}

impl Pacer {
    /// Constant delay between tasks
    pub fn fixed(delay: Duration) -> Self {
        let ms = duration_ms(delay);
        Self {
            floor_ms: ms,
            max_ms: ms,
            current_ms: AtomicU64::new(ms),
            streak: AtomicU32::new(0),
            recovery_streak: PACER_RECOVERY_STREAK,
            adaptive: false,
        }
    }

    /// Delay that starts at `floor`, grows on 429s (up to the pacer cap) and
    /// recovers after [`PACER_RECOVERY_STREAK`] consecutive successes
    pub fn adaptive(floor: Duration) -> Self {
        let ms = duration_ms(floor);
        Self {
            floor_ms: ms,
            max_ms: PACER_MAX_DELAY_MS.max(ms),
            current_ms: AtomicU64::new(ms),
            streak: AtomicU32::new(0),
            recovery_streak: PACER_RECOVERY_STREAK,
            adaptive: true,
        }
    }

    /// Override the cap
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max_ms = duration_ms(max).max(self.floor_ms);
        self
    }

    /// Override how many successes in a row shrink the delay
    pub fn with_recovery_streak(mut self, streak: u32) -> Self {
        self.recovery_streak = streak.max(1);
        self
    }

    /// Current delay
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.current_ms.load(Ordering::Relaxed))
    }

    /// Whether the delay adapts to outcomes
    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Note a successful task
    pub fn on_success(&self) {
        if !self.adaptive {
            return;
        }
        let streak = self.streak.fetch_add(1, Ordering::Relaxed) + 1;
        if streak < self.recovery_streak {
            return;
        }
        self.streak.store(0, Ordering::Relaxed);
        let current = self.current_ms.load(Ordering::Relaxed);
        if current > self.floor_ms {
            let next = (current / 2).max(self.floor_ms);
            self.current_ms.store(next, Ordering::Relaxed);
            debug!(delay_ms = next, "Pacer delay reduced");
        }
    }

    /// Note a rate-limited task
    pub fn on_rate_limited(&self) {
        self.streak.store(0, Ordering::Relaxed);
        if !self.adaptive {
            return;
        }
        let current = self.current_ms.load(Ordering::Relaxed);
        let next = current
            .saturating_mul(2)
            .max(MIN_ADAPTIVE_STEP_MS)
            .min(self.max_ms);
        if next != current {
            self.current_ms.store(next, Ordering::Relaxed);
            warn!(delay_ms = next, "Rate limited - increasing delay between tasks");
        }
    }

    /// Sleep for the current delay; returns early if shutdown is requested
    pub async fn wait(&self, shutdown: &ShutdownCoordinator) {
        let delay = self.delay();
        if delay.is_zero() || shutdown.is_shutdown_requested() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for_shutdown() => {}
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
