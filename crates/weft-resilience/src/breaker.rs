//! Circuit breaker for backend-facing RPC handlers.
//!
//! Three states: Closed (healthy), Open (failing), HalfOpen (probing).
//! The breaker is per-service-instance, not per-caller. Handlers call
//! `before_call` for admission and `after_call` with the outcome;
//! authentication and authorization failures never reach `after_call`.

use std::time::{Duration, Instant};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Circuit breaker tracking consecutive backend failures.
///
/// Transitions:
/// - Closed, consecutive failures reach the threshold -> Open
/// - Open, recovery timeout elapsed -> HalfOpen (probe admitted)
/// - HalfOpen, success -> Closed; failure -> Open
pub struct CircuitBreaker {
    state: CircuitState,
    threshold: u32,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with the given failure threshold and recovery timeout.
    pub fn new(threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            threshold,
            consecutive_failures: 0,
            opened_at: None,
            recovery_timeout,
        }
    }

    /// Admission check. Returns false while the circuit is Open and the
    /// recovery timeout has not elapsed; transitions to HalfOpen and admits
    /// a probe once it has.
    pub fn before_call(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|t| t.elapsed() >= self.recovery_timeout)
                    .unwrap_or(false);
                if elapsed {
                    self.state = CircuitState::HalfOpen;
                    tracing::info!("circuit breaker transitioning to half-open");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => true,
        }
    }

    /// Record the outcome of an admitted call.
    pub fn after_call(&mut self, success: bool) {
        if success {
            self.consecutive_failures = 0;
            if self.state != CircuitState::Closed {
                tracing::info!("circuit breaker closed after successful call");
            }
            self.state = CircuitState::Closed;
            self.opened_at = None;
            return;
        }

        self.consecutive_failures += 1;
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.threshold {
                    self.state = CircuitState::Open;
                    self.opened_at = Some(Instant::now());
                    tracing::warn!(
                        consecutive_failures = self.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.opened_at = Some(Instant::now());
                tracing::warn!("circuit breaker reopened after failed probe");
            }
            CircuitState::Open => {
                self.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Reset to Closed.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::from_secs(60))
    }

    fn make_instant_recovery(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::new(threshold, Duration::ZERO)
    }

    #[test]
    fn test_new_breaker_is_closed() {
        let mut cb = make_breaker(3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.before_call());
    }

    #[test]
    fn test_failures_below_threshold_stay_closed() {
        let mut cb = make_breaker(3);
        cb.after_call(false);
        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.before_call());
    }

    #[test]
    fn test_failures_at_threshold_open_circuit() {
        let mut cb = make_breaker(3);
        for _ in 0..3 {
            cb.after_call(false);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.before_call());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let mut cb = make_breaker(3);
        cb.after_call(false);
        cb.after_call(false);
        cb.after_call(true);
        cb.after_call(false);
        cb.after_call(false);
        // Only two consecutive failures after the reset.
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let mut cb = make_instant_recovery(1);
        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.before_call());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_successful_probe_closes_circuit() {
        let mut cb = make_instant_recovery(1);
        cb.after_call(false);
        cb.before_call();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.after_call(true);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens_circuit() {
        let mut cb = make_instant_recovery(1);
        cb.after_call(false);
        cb.before_call();
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_open_blocks_until_timeout() {
        let mut cb = make_breaker(1);
        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.before_call());
        assert!(!cb.before_call());
    }

    #[test]
    fn test_threshold_boundary() {
        let mut cb = make_breaker(5);
        for _ in 0..4 {
            cb.after_call(false);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_reset() {
        let mut cb = make_breaker(1);
        cb.after_call(false);
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }
}
