//! Circuit breaker guarding outbound calls to the resource store.
//!
//! After a configurable number of consecutive infrastructure failures the
//! circuit opens for a cool-down period and calls fail fast with
//! [`StoreError::CircuitOpen`], without any network attempt. Once the
//! cool-down elapses exactly one probe call is let through: success closes
//! the circuit and zeroes the failure counter, failure re-opens it with a
//! fresh cool-down.
//!
//! What counts as a failure is decided centrally by
//! [`StoreError::is_infrastructure_failure`], not by the breaker itself.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::StoreError;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive infrastructure failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a probe is allowed.
    pub open_duration: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    /// A probe is in flight; further calls are rejected until it settles.
    half_open: bool,
}

/// Mutex-guarded breaker state shared by all calls of one client.
///
/// The lock is only held to inspect or flip counters, never across I/O.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                open_until: None,
                half_open: false,
            }),
        }
    }

    /// Gate a call. `Ok(())` means the caller may attempt network I/O.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CircuitOpen` with the remaining cool-down in
    /// whole seconds while the circuit is open, and with a zero-second
    /// hint while a half-open probe is already in flight.
    pub fn check(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        if let Some(until) = inner.open_until {
            if now < until {
                let remaining = until - now;
                return Err(StoreError::CircuitOpen {
                    retry_after_secs: remaining.as_secs().max(1),
                });
            }
            // Cool-down elapsed: this caller becomes the probe.
            inner.open_until = None;
            inner.half_open = true;
            return Ok(());
        }

        if inner.half_open {
            return Err(StoreError::CircuitOpen { retry_after_secs: 0 });
        }

        Ok(())
    }

    /// Record a successful call (or a business-level response, which
    /// proves the backend is reachable).
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.half_open {
            tracing::info!("circuit breaker probe succeeded, closing circuit");
        }
        inner.consecutive_failures = 0;
        inner.half_open = false;
    }

    /// Record an infrastructure failure.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.half_open {
            inner.half_open = false;
            inner.open_until = Some(Instant::now() + self.config.open_duration);
            tracing::warn!(
                open_for_secs = self.config.open_duration.as_secs(),
                "circuit breaker probe failed, re-opening circuit"
            );
            return;
        }

        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.failure_threshold {
            inner.open_until = Some(Instant::now() + self.config.open_duration);
            tracing::warn!(
                consecutive_failures = inner.consecutive_failures,
                open_for_secs = self.config.open_duration.as_secs(),
                "circuit breaker opened"
            );
        }
    }

    /// Current state, for health reporting.
    pub fn state(&self) -> BreakerState {
        let inner = self.inner.lock().unwrap();
        match inner.open_until {
            Some(until) if Instant::now() < until => BreakerState::Open,
            Some(_) => BreakerState::HalfOpen,
            None if inner.half_open => BreakerState::HalfOpen,
            None => BreakerState::Closed,
        }
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}
