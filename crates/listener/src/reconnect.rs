//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

/// Controls how the stream transport re-dials after a connection drop.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay before the second re-dial.  The first re-dial after a drop is
    /// always immediate.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub backoff_factor: f64,
    /// Maximum number of consecutive failures before giving up.
    /// `0` means unlimited retries.
    pub max_failures: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            max_failures: 10,
        }
    }
}

impl ReconnectBackoff {
    /// Compute the delay before the next dial given the number of
    /// consecutive failures so far.
    ///
    /// Zero failures means the previous connection worked at some point;
    /// the re-dial is immediate.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.backoff_factor.powi(failures as i32 - 1);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        // Add ~25% jitter to prevent thundering herd.
        let jitter = capped_ms * 0.25 * pseudo_random_fraction(failures);
        Duration::from_millis((capped_ms + jitter) as u64)
    }

    /// Whether the given consecutive-failure count exhausts the budget.
    pub fn should_give_up(&self, failures: u32) -> bool {
        self.max_failures > 0 && failures >= self.max_failures
    }
}

/// Cheap deterministic "random" fraction [0, 1) based on the failure count.
/// Not cryptographically secure — just enough to spread reconnect storms.
fn pseudo_random_fraction(failures: u32) -> f64 {
    let hash = failures.wrapping_mul(2654435761); // Knuth multiplicative hash
    (hash as f64) / (u32::MAX as f64)
}
