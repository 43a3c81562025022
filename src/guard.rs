//! Enforcement coordinator: the public façade of the crate.
//!
//! [`CardinalityGuard`] runs every recording attempt through
//! canonicalization, the circuit breaker, the tracker peek, and the limit
//! policy, then commits on admission or dispatches the configured denial
//! action. It is an explicitly constructed value meant to be owned by the
//! application's composition root and handed to instrumentation call sites;
//! clones share the same tracked state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::breaker::CircuitState;
use crate::canonical::LabelSet;
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigResult, GuardConfig};
use crate::dispatch;
use crate::error::GuardResult;
use crate::policy::{self, Verdict};
use crate::tracker::{CardinalityTracker, MetricStats};

struct Outcome {
    verdict: Verdict,
    record: bool,
}

/// Runtime cardinality guard for a metrics-emission pipeline.
///
/// Sits between instrumentation call sites and the real time-series
/// registry and answers one question per observation: may this (metric,
/// labels) combination be recorded? Denial is a verdict, never an error;
/// only malformed label input is surfaced as [`crate::GuardError`].
///
/// The hot path (a combination that was already admitted) takes one sharded
/// map lookup and one short per-metric critical section, so the guard can
/// front every recording attempt of a high-throughput service.
pub struct CardinalityGuard<C: Clock = SystemClock> {
    config: GuardConfig,
    tracker: Arc<CardinalityTracker>,
    clock: Arc<C>,
}

impl CardinalityGuard<SystemClock> {
    /// Create a guard with the given configuration and the system clock.
    pub fn new(config: GuardConfig) -> ConfigResult<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Create a guard with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(GuardConfig::default()).expect("default configuration is valid")
    }
}

impl<C: Clock> CardinalityGuard<C> {
    /// Create a guard with a custom clock (useful for testing time-based
    /// breaker behavior).
    pub fn with_clock(config: GuardConfig, clock: C) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self { config, tracker: Arc::new(CardinalityTracker::new()), clock: Arc::new(clock) })
    }

    /// Decide whether an observation with these labels may be recorded.
    ///
    /// Returns `Err` only for malformed label input; cardinality pressure is
    /// reported through the boolean. In log mode a denied combination still
    /// yields `true` (recording is never blocked), while the denial is
    /// logged and counted.
    pub fn allow<I, K, V>(&self, metric: &str, labels: I) -> GuardResult<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let labels = LabelSet::from_pairs(labels)?;
        Ok(self.run(metric, &labels).record)
    }

    /// [`CardinalityGuard::allow`] for flat alternating `key, value, …`
    /// input, the shape varargs-style instrumentation helpers produce.
    pub fn allow_flat<S: AsRef<str>>(&self, metric: &str, labels: &[S]) -> GuardResult<bool> {
        let labels = LabelSet::from_flat(labels)?;
        Ok(self.run(metric, &labels).record)
    }

    /// Evaluate a pre-validated label set and return the raw verdict.
    ///
    /// Unlike [`CardinalityGuard::allow`], this reports Deny even in log
    /// mode, where the observation would still be recorded. All side effects
    /// (commit, warning logs, breaker bookkeeping) are applied as usual.
    pub fn check(&self, metric: &str, labels: &LabelSet) -> Verdict {
        self.run(metric, labels).verdict
    }

    fn run(&self, metric: &str, labels: &LabelSet) -> Outcome {
        if !self.config.enforcement_enabled {
            return Outcome { verdict: Verdict::Allow, record: true };
        }

        let now = self.clock.now();
        let state = self.tracker.entry(metric, now);

        // An open circuit sheds load before any set lookups happen.
        if state.breaker.poll(metric, now, &self.config) == CircuitState::Open {
            state.record_violation();
            debug!(metric, "circuit open; denying without evaluation");
            return Outcome { verdict: Verdict::Deny, record: false };
        }

        // Peek, evaluate, and commit happen in one per-metric critical
        // section so racing new combinations cannot overshoot the limit.
        let key = labels.canonical_key();
        let mut admitted_count = 0;
        let verdict = state.evaluate_with(&key, labels, |observation| {
            admitted_count = observation.combination_count + 1;
            policy::evaluate(observation, &self.config)
        });

        match verdict {
            Verdict::Allow => Outcome { verdict, record: true },
            Verdict::Warn => {
                warn!(
                    metric,
                    combinations = admitted_count,
                    limit = self.config.max_labels_per_metric,
                    "metric approaching cardinality limit"
                );
                Outcome { verdict, record: true }
            }
            Verdict::Deny => {
                state.record_violation();
                let record = dispatch::dispatch_denial(metric, &state, &self.config, now);
                Outcome { verdict, record }
            }
        }
    }

    /// Introspection snapshot for one metric; `None` if never observed.
    pub fn stats(&self, metric: &str) -> Option<MetricStats> {
        self.tracker.stats(metric)
    }

    /// Introspection snapshot of every tracked metric.
    pub fn stats_all(&self) -> HashMap<String, MetricStats> {
        self.tracker.stats_all()
    }

    /// Administrative reset of one metric: drops its sets and forces the
    /// breaker CLOSED. Safe to call concurrently with in-flight `allow`
    /// calls.
    pub fn reset(&self, metric: &str) {
        self.tracker.reset(metric);
    }

    /// Administrative reset of all tracked metrics.
    pub fn reset_all(&self) {
        self.tracker.reset_all();
    }

    /// Number of distinct metric names currently tracked.
    pub fn tracked_metric_count(&self) -> usize {
        self.tracker.tracked_metric_count()
    }

    /// The configuration this guard enforces.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}

impl<C: Clock> Clone for CardinalityGuard<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            tracker: Arc::clone(&self.tracker),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<C: Clock> fmt::Debug for CardinalityGuard<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardinalityGuard")
            .field("config", &self.config)
            .field("tracked_metrics", &self.tracked_metric_count())
            .finish()
    }
}
