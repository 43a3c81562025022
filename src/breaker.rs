//! Per-metric circuit breaker.
//!
//! Escalates repeated denials into a temporary full suspension of recording
//! for one metric. All time-based transitions are evaluated lazily on access
//! by comparing the caller-supplied instant against the last transition, so
//! no background timer is involved and the machine is fully deterministic
//! under an injected clock.
//!
//! Transitions:
//! - CLOSED → OPEN when consecutive denials reach `failure_threshold`
//! - OPEN → HALF_OPEN once `open_duration` has elapsed, checked on the next
//!   incoming request
//! - HALF_OPEN → CLOSED after `half_open_duration` with no further violation
//! - HALF_OPEN → OPEN on any violation during probation

use std::fmt;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::GuardConfig;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; decisions flow through the limit policy.
    Closed,
    /// All new-combination requests are denied unconditionally.
    Open,
    /// Probation: the limit policy runs again; any denial re-opens.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BreakerInner {
    state: CircuitState,
    last_change: Instant,
    consecutive_failures: u32,
}

/// State machine guarding a single metric.
///
/// One mutex covers the whole transition state, so a race between two
/// threads both observing OPEN → HALF_OPEN eligibility resolves to a single
/// logical transition.
#[derive(Debug)]
pub(crate) struct MetricBreaker {
    inner: Mutex<BreakerInner>,
}

impl MetricBreaker {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                last_change: now,
                consecutive_failures: 0,
            }),
        }
    }

    /// Apply any due time-based transition and return the resulting state.
    ///
    /// Called once per incoming request before the limit policy runs.
    pub(crate) fn poll(&self, metric: &str, now: Instant, config: &GuardConfig) -> CircuitState {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => CircuitState::Closed,
            CircuitState::Open => {
                if now.duration_since(inner.last_change) >= config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_change = now;
                    info!(metric, "circuit breaker entering half-open probation");
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                }
            }
            CircuitState::HalfOpen => {
                if now.duration_since(inner.last_change) >= config.half_open_duration {
                    inner.state = CircuitState::Closed;
                    inner.last_change = now;
                    inner.consecutive_failures = 0;
                    info!(metric, "circuit breaker closed after quiet probation");
                    CircuitState::Closed
                } else {
                    CircuitState::HalfOpen
                }
            }
        }
    }

    /// Record a denial. Opens the circuit at the failure threshold, or
    /// immediately when the denial lands during half-open probation.
    pub(crate) fn record_failure(&self, metric: &str, now: Instant, config: &GuardConfig) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_change = now;
                    warn!(
                        metric,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_change = now;
                warn!(metric, "circuit breaker re-opened by violation during probation");
            }
            CircuitState::Open => {}
        }
    }

    /// Force CLOSED with zeroed counters.
    pub(crate) fn reset(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.last_change = now;
        inner.consecutive_failures = 0;
    }

    /// Current state and the instant of the most recent transition.
    pub(crate) fn snapshot(&self) -> (CircuitState, Instant) {
        let inner = self.inner.lock();
        (inner.state, inner.last_change)
    }
}
