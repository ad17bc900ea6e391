//! Cosmetic progress animation.
//!
//! A [`ProgressSchedule`] maps an estimated duration onto `steps` evenly spaced
//! percentage values; a [`ProgressTicker`] plays that schedule on a tokio
//! interval until it reaches 100 or is stopped. Nothing here knows how far the
//! real operation has actually progressed.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Tick interval used when the estimate is zero or unknown.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Deterministic tick plan for one estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSchedule {
    interval: Duration,
    steps: u32,
}

impl ProgressSchedule {
    pub fn new(total_estimated_millis: u64, steps: u32) -> Self {
        let steps = steps.max(1);
        let interval = if total_estimated_millis == 0 {
            MIN_TICK_INTERVAL
        } else {
            let nanos = u128::from(total_estimated_millis) * 1_000_000 / u128::from(steps);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX).max(1))
        };
        Self { interval, steps }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn increment(&self) -> f64 {
        100.0 / f64::from(self.steps)
    }

    /// Percentage after `tick` ticks (1-based); the final tick is exactly 100.
    pub fn percent_at(&self, tick: u32) -> f64 {
        if tick >= self.steps {
            100.0
        } else {
            f64::from(tick) * 100.0 / f64::from(self.steps)
        }
    }

    pub fn percentages(&self) -> impl Iterator<Item = f64> + '_ {
        (1..=self.steps).map(move |i| self.percent_at(i))
    }
}

/// Running tick source. Dropping it stops it.
pub struct ProgressTicker {
    active: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    rx: mpsc::UnboundedReceiver<f64>,
}

impl ProgressTicker {
    pub fn start(total_estimated_millis: u64, steps: u32) -> Self {
        Self::with_schedule(ProgressSchedule::new(total_estimated_millis, steps))
    }

    pub fn with_schedule(schedule: ProgressSchedule) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));
        let task_active = active.clone();
        let handle = tokio::spawn(async move {
            let period = schedule.interval();
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for tick in 1..=schedule.steps() {
                interval.tick().await;
                if !task_active.load(Ordering::Acquire) {
                    return;
                }
                if tx.send(schedule.percent_at(tick)).is_err() {
                    return;
                }
            }
            task_active.store(false, Ordering::Release);
        });
        Self {
            active,
            handle: Some(handle),
            rx,
        }
    }

    /// Next percentage, or `None` once the schedule finished or the ticker stopped.
    pub async fn next_tick(&mut self) -> Option<f64> {
        self.rx.recv().await
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Cancel pending emissions. Safe to call repeatedly or after completion.
    pub fn stop(&mut self) {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.rx.close();
        // Ticks already queued belong to the cancelled animation.
        while self.rx.try_recv().is_ok() {}
        if was_active {
            tracing::debug!("progress ticker stopped before completion");
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
