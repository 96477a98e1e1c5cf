//! Sliding-window rate limiter for action dispatch.
//!
//! Admission is by timestamp count within a rolling window.  Nothing is
//! ever dropped: a caller that cannot be admitted waits until the oldest
//! stamp ages out, so a single consumer loop preserves arrival order.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Default: at most 10 dispatches per 10 seconds.
pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

pub struct ThrottleGate {
    capacity: usize,
    window: Duration,
    stamps: VecDeque<Instant>,
}

impl ThrottleGate {
    /// `capacity` of zero disables throttling entirely.
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            stamps: VecDeque::new(),
        }
    }

    /// Try to admit at `now`.  Admission records a stamp.
    pub fn admit(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.capacity == 0 || self.stamps.len() < self.capacity {
            self.stamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until the oldest stamp ages out of the window.  Zero when
    /// admission would succeed right now.
    pub fn next_admission_in(&mut self, now: Instant) -> Duration {
        self.prune(now);
        if self.capacity == 0 || self.stamps.len() < self.capacity {
            return Duration::ZERO;
        }
        match self.stamps.front() {
            Some(oldest) => (*oldest + self.window).duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Wait until admitted.  Sleeps exactly until the next stamp expires
    /// rather than polling.
    pub async fn acquire(&mut self) {
        loop {
            let now = Instant::now();
            if self.admit(now) {
                return;
            }
            let wait = self.next_admission_in(now);
            tracing::debug!(wait_ms = wait.as_millis() as u64, "throttled, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for ThrottleGate {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_capacity_instantly() {
        let mut gate = ThrottleGate::new(3, Duration::from_secs(10));
        let now = Instant::now();
        assert!(gate.admit(now));
        assert!(gate.admit(now));
        assert!(gate.admit(now));
        assert!(!gate.admit(now));
    }

    #[tokio::test(start_paused = true)]
    async fn reports_time_until_next_admission() {
        let mut gate = ThrottleGate::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(gate.admit(start));

        tokio::time::advance(Duration::from_secs(4)).await;
        let now = Instant::now();
        assert_eq!(gate.next_admission_in(now), Duration::from_secs(6));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(gate.admit(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_the_window_to_slide() {
        let mut gate = ThrottleGate::new(10, Duration::from_secs(10));
        for _ in 0..10 {
            gate.acquire().await;
        }

        // The eleventh must wait a full window under paused time.
        let before = Instant::now();
        gate.acquire().await;
        assert!(Instant::now().duration_since(before) >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_stamps_age_out_individually() {
        let mut gate = ThrottleGate::new(2, Duration::from_secs(10));
        assert!(gate.admit(Instant::now()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(gate.admit(Instant::now()));
        assert!(!gate.admit(Instant::now()));

        // First stamp expires 5s later; only one slot opens.
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(gate.admit(Instant::now()));
        assert!(!gate.admit(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_capacity_disables_throttling() {
        let mut gate = ThrottleGate::new(0, Duration::from_secs(10));
        let now = Instant::now();
        for _ in 0..1000 {
            assert!(gate.admit(now));
        }
    }
}
