//! Per-function circuit breaker (spec §4.4.4)
//!
//! Three states — Closed, Open, Half-Open — tracked behind a single
//! `parking_lot::Mutex` so state transitions and the "only one probe in
//! flight while Half-Open" rule stay atomic without a separate lock.
//! Grounded on the teacher's `system/locker.rs` style (small
//! `Mutex`-guarded state machine with explicit error enum) generalised from
//! mutual exclusion to a failure-counting state machine.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Call before attempting an invocation. Transitions Open -> Half-Open
    /// once `recovery_timeout` has elapsed and reserves the single allowed
    /// probe; returns [`GatewayError::BreakerOpen`] otherwise.
    pub fn check(&self, function_name: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock();

        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => {
                if inner.probe_in_flight {
                    Err(GatewayError::BreakerOpen(function_name.to_string()))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.recovery_timeout {
                    inner.state = State::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(GatewayError::BreakerOpen(function_name.to_string()))
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.state = State::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.probe_in_flight = false;

        match inner.state {
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
            }
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::Open => {}
        }
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        matches!(self.inner.lock().state, State::Open)
    }
}

/// One breaker per function, created lazily on first use.
pub struct BreakerRegistry {
    breakers: DashMap<String, CircuitBreaker>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            breakers: DashMap::new(),
            failure_threshold,
            recovery_timeout,
        }
    }

    pub fn check(&self, function_name: &str) -> Result<(), GatewayError> {
        self.breakers
            .entry(function_name.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.recovery_timeout))
            .check(function_name)
    }

    pub fn record_success(&self, function_name: &str) {
        if let Some(breaker) = self.breakers.get(function_name) {
            breaker.record_success();
        }
    }

    pub fn record_failure(&self, function_name: &str) {
        self.breakers
            .entry(function_name.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.recovery_timeout))
            .record_failure();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        for _ in 0..2 {
            breaker.check("f").unwrap();
            breaker.record_failure();
        }
        assert!(!breaker.is_open());
        breaker.check("f").unwrap();
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(matches!(breaker.check("f"), Err(GatewayError::BreakerOpen(_))));
    }

    #[test]
    fn half_open_allows_single_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.check("f").unwrap();
        breaker.record_failure();
        assert!(breaker.is_open());

        std::thread::sleep(Duration::from_millis(5));

        breaker.check("f").unwrap(); // transitions to half-open, reserves the probe
        assert!(matches!(breaker.check("f"), Err(GatewayError::BreakerOpen(_))));
    }

    #[test]
    fn success_in_half_open_closes_the_breaker() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(1));
        breaker.check("f").unwrap();
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        breaker.check("f").unwrap();
        breaker.record_success();
        assert!(!breaker.is_open());
        breaker.check("f").unwrap();
    }
}
