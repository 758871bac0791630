//! Inter-request pacing. Target platforms rate-limit and block bursty
//! access, so batch loops pause for a uniformly random delay between
//! units. Injected rather than inlined so tests run with `Pacing::none()`.

use std::time::Duration;

use rand::Rng;

use placematch_common::PacingConfig;

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    min: Duration,
    max: Duration,
}

impl Pacing {
    pub fn new(config: PacingConfig) -> Self {
        let min = Duration::from_millis(config.min_ms.min(config.max_ms));
        let max = Duration::from_millis(config.max_ms.max(config.min_ms));
        Self { min, max }
    }

    /// Zero-delay policy for tests.
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Sleep for a uniformly random duration within the configured window.
    pub async fn pause(&self) {
        if self.max.is_zero() {
            return;
        }
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        let delay = if max_ms > min_ms {
            Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
        } else {
            self.min
        };
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placematch_common::PacingConfig;

    #[tokio::test]
    async fn zero_policy_returns_immediately() {
        let started = std::time::Instant::now();
        Pacing::none().pause().await;
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn pause_stays_within_bounds() {
        let pacing = Pacing::new(PacingConfig { min_ms: 1, max_ms: 5 });
        let started = std::time::Instant::now();
        pacing.pause().await;
        let elapsed = started.elapsed();
        assert!(elapsed < Duration::from_millis(500), "elapsed {elapsed:?}");
    }

    #[test]
    fn inverted_bounds_are_reordered() {
        let pacing = Pacing::new(PacingConfig { min_ms: 100, max_ms: 10 });
        assert!(pacing.min <= pacing.max);
    }
}
