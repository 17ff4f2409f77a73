//! Sliding-window admission control.
//!
//! Gates every relay operation before it touches the network. The window is
//! process-wide with no per-caller identity: it throttles the total
//! throughput of this process. Timestamps older than the window are pruned
//! before the size check, so at most `max` admitted requests ever have
//! timestamps inside any trailing window interval.
//!
//! The window mutation (prune + check + record) runs under a sync mutex with
//! no await inside, so a burst of same-tick requests is evaluated strictly
//! in admission order.

use std::sync::Mutex;

use tokio::time::Instant;

use crate::relay::config::RateLimitConfig;
use crate::relay::error::RelayError;

/// Sliding-window request-rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    hits: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(Vec::new()),
        }
    }

    /// Admit or reject one request.
    ///
    /// When disabled, always admits and does no bookkeeping. Otherwise drops
    /// recorded timestamps older than the trailing window, rejects with
    /// [`RelayError::RateLimitExceeded`] if `max` are still inside it, and
    /// records the admission on success.
    pub fn check(&self) -> Result<(), RelayError> {
        if !self.config.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut hits = self.hits.lock().expect("rate window mutex poisoned");

        hits.retain(|t| now.duration_since(*t) < self.config.window);

        if hits.len() >= self.config.max {
            return Err(RelayError::RateLimitExceeded {
                max: self.config.max,
                window_ms: self.config.window.as_millis() as u64,
            });
        }

        hits.push(now);
        Ok(())
    }

    /// Number of admissions currently inside the window (for introspection).
    pub fn occupancy(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.lock().expect("rate window mutex poisoned");
        hits.retain(|t| now.duration_since(*t) < self.config.window);
        hits.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(enabled: bool, max: usize, window_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            enabled,
            max,
            window: Duration::from_millis(window_ms),
        })
    }

    mod admission {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_admits_up_to_max_then_rejects() {
            let limiter = limiter(true, 3, 5000);

            for i in 0..3 {
                assert!(limiter.check().is_ok(), "admission {} should pass", i);
            }

            match limiter.check() {
                Err(RelayError::RateLimitExceeded { max, window_ms }) => {
                    assert_eq!(max, 3);
                    assert_eq!(window_ms, 5000);
                }
                other => panic!("expected RateLimitExceeded, got {:?}", other.err()),
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_window_expiry_readmits() {
            let limiter = limiter(true, 2, 1000);

            assert!(limiter.check().is_ok());
            assert!(limiter.check().is_ok());
            assert!(limiter.check().is_err());

            tokio::time::advance(Duration::from_millis(1001)).await;

            assert!(limiter.check().is_ok());
        }

        #[tokio::test(start_paused = true)]
        async fn test_partial_expiry_frees_only_old_slots() {
            let limiter = limiter(true, 2, 1000);

            assert!(limiter.check().is_ok());
            tokio::time::advance(Duration::from_millis(600)).await;
            assert!(limiter.check().is_ok());
            assert!(limiter.check().is_err());

            // First admission ages out, second is still in the window.
            tokio::time::advance(Duration::from_millis(500)).await;
            assert!(limiter.check().is_ok());
            assert!(limiter.check().is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_scenario_five_requests_three_admitted() {
            let limiter = limiter(true, 3, 5000);

            let outcomes: Vec<bool> = (0..5).map(|_| limiter.check().is_ok()).collect();
            let admitted = outcomes.iter().filter(|ok| **ok).count();

            assert_eq!(admitted, 3);
            assert_eq!(outcomes, vec![true, true, true, false, false]);
        }
    }

    mod disabled {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_disabled_always_admits() {
            let limiter = limiter(false, 1, 1000);

            for _ in 0..100 {
                assert!(limiter.check().is_ok());
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_disabled_does_no_bookkeeping() {
            let limiter = limiter(false, 1, 1000);
            let _ = limiter.check();
            assert_eq!(limiter.occupancy(), 0);
        }
    }

    mod occupancy {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_occupancy_tracks_window() {
            let limiter = limiter(true, 10, 1000);

            assert_eq!(limiter.occupancy(), 0);
            let _ = limiter.check();
            let _ = limiter.check();
            assert_eq!(limiter.occupancy(), 2);

            tokio::time::advance(Duration::from_millis(1001)).await;
            assert_eq!(limiter.occupancy(), 0);
        }
    }
}
