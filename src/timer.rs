//! The single source of simulated time.
//!
//! Emits ticks at real intervals of `tick_interval / speed`; every emission
//! carries `(now, tick_number)` where `now` is wall-clock elapsed scaled by
//! `speed`. Tick numbers start at 0, are monotonic and never skipped.

use std::time::Instant;
use tokio::time::{interval, Duration, Interval, MissedTickBehavior};
use tracing::info;

/// One tick emission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerTick {
    /// Simulated seconds since the process epoch.
    pub now: f64,
    /// 0-based tick counter.
    pub tick_number: u32,
}

/// Monotonic tick generator and simulated clock.
pub struct Timer {
    tick_interval: f64,
    speed: f64,
    epoch: Instant,
    interval: Option<Interval>,
    tick_number: u32,
    shutdown: bool,
}

impl Timer {
    /// Create a stopped timer. The simulated clock starts running at
    /// construction so logins before market open still get ordered times;
    /// ticks only flow after [`Timer::start`].
    #[must_use]
    pub fn new(tick_interval: f64, speed: f64) -> Self {
        Self {
            tick_interval,
            speed,
            epoch: Instant::now(),
            interval: None,
            tick_number: 0,
            shutdown: false,
        }
    }

    /// Simulated seconds since construction.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * self.speed
    }

    /// Start emitting ticks; the first tick (number 0) fires immediately.
    pub fn start(&mut self) {
        if self.shutdown || self.interval.is_some() {
            return;
        }
        let mut ticker = interval(Duration::from_secs_f64(self.tick_interval / self.speed));
        // Ticks are an ordering anchor and must never be skipped; late ticks
        // fire back-to-back until the schedule catches up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.interval = Some(ticker);
    }

    /// True while ticks are flowing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Only call while [`Timer::is_running`]; a
    /// stopped timer returns `None` immediately.
    pub async fn tick(&mut self) -> Option<TimerTick> {
        let ticker = self.interval.as_mut()?;
        ticker.tick().await;
        let tick = TimerTick {
            now: self.now(),
            tick_number: self.tick_number,
        };
        self.tick_number += 1;
        Some(tick)
    }

    /// Stop further ticks. Idempotent.
    pub fn shutdown(&mut self, now: f64, reason: &str) {
        if self.shutdown {
            return;
        }
        self.shutdown = true;
        self.interval = None;
        info!(now, reason, "timer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ticks_are_sequential_from_zero() {
        let mut timer = Timer::new(0.005, 1.0);
        timer.start();
        for expected in 0..3u32 {
            let tick = timer.tick().await.unwrap();
            assert_eq!(tick.tick_number, expected);
        }
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_stops_ticks() {
        let mut timer = Timer::new(0.25, 1.0);
        timer.start();
        timer.shutdown(0.0, "test");
        timer.shutdown(0.0, "test again");
        assert!(!timer.is_running());
        assert!(timer.tick().await.is_none());
        // A stopped timer will not restart.
        timer.start();
        assert!(!timer.is_running());
    }

    #[test]
    fn now_scales_by_speed() {
        let slow = Timer::new(0.25, 1.0);
        let fast = Timer::new(0.25, 8.0);
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(fast.now() > slow.now());
    }
}
