//! Sliding-window message-rate limiter.
//!
//! A ring of the timestamps of the last N admitted messages. A new message
//! is admitted iff the ring is not yet full or its oldest entry has aged out
//! of the window. O(1) per message.

/// Per-session frequency limiter.
#[derive(Clone, Debug)]
pub struct FrequencyLimiter {
    interval: f64,
    limit: usize,
    ring: Vec<f64>,
    head: usize,
}

impl FrequencyLimiter {
    /// Create a limiter admitting at most `limit` messages per `interval`
    /// seconds. The caller pre-scales the interval by the timer speed so that
    /// simulated time matches real time under fast-forward.
    #[must_use]
    pub fn new(interval: f64, limit: usize) -> Self {
        Self {
            interval,
            limit,
            ring: Vec::with_capacity(limit),
            head: 0,
        }
    }

    /// Admit a message at time `now`, recording it, or reject it leaving the
    /// ring untouched.
    pub fn try_admit(&mut self, now: f64) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.ring.len() < self.limit {
            self.ring.push(now);
            return true;
        }
        if self.ring[self.head] <= now - self.interval {
            self.ring[self.head] = now;
            self.head = (self.head + 1) % self.limit;
            return true;
        }
        false
    }
}
