//! Per-metric cardinality bookkeeping.
//!
//! One [`MetricState`] exists per distinct metric name, created lazily on
//! first observation and destroyed only by an administrative reset. The
//! states live in a [`DashMap`] so calls for different metrics never contend
//! on a shared lock; within one metric, a single `parking_lot` mutex keeps
//! membership checks and insertions linearizable.
//!
//! Observation is split into a read-only peek ([`CardinalityTracker::observe`])
//! and an idempotent insert ([`CardinalityTracker::commit`]): the coordinator
//! only commits after the limit policy allows, so tracked sets never grow
//! past their limits. Two racing commits of the same canonical key converge
//! to a single entry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::breaker::{CircuitState, MetricBreaker};
use crate::canonical::{CanonicalKey, LabelSet};
use crate::policy::Verdict;

/// What the tracker currently knows about one label key of a candidate
/// combination.
#[derive(Debug, Clone)]
pub struct LabelValueCount {
    /// The label key.
    pub key: String,
    /// Distinct values already tracked for this key.
    pub distinct_values: usize,
    /// Whether the candidate's value for this key has never been seen.
    pub value_is_new: bool,
}

/// Read-only peek at tracked state for one candidate observation.
#[derive(Debug, Clone)]
pub struct Observation {
    /// Whether the canonical key is absent from the seen set.
    pub is_new_combination: bool,
    /// Distinct combinations currently tracked for the metric.
    pub combination_count: usize,
    /// Per-label-key counts; empty when the combination was already seen,
    /// since the policy never consults them in that case.
    pub label_counts: Vec<LabelValueCount>,
}

/// Introspection snapshot for one tracked metric.
#[derive(Debug, Clone)]
pub struct MetricStats {
    /// Distinct label combinations tracked.
    pub combination_count: usize,
    /// Largest distinct-value count across individual label keys.
    pub max_observed_per_label: usize,
    /// Denial verdicts issued for this metric so far.
    pub violation_count: u64,
    /// Current circuit-breaker state.
    pub circuit_state: CircuitState,
    /// Instant of the most recent circuit transition (creation if none).
    pub last_state_change: Instant,
}

#[derive(Default)]
struct LabelSets {
    combinations: HashSet<CanonicalKey>,
    per_label: HashMap<String, HashSet<String>>,
}

/// All mutable state for one metric name.
pub(crate) struct MetricState {
    sets: Mutex<LabelSets>,
    violation_count: AtomicU64,
    pub(crate) breaker: MetricBreaker,
}

impl MetricState {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            sets: Mutex::new(LabelSets::default()),
            violation_count: AtomicU64::new(0),
            breaker: MetricBreaker::new(now),
        }
    }

    fn observation_of(sets: &LabelSets, key: &CanonicalKey, labels: &LabelSet) -> Observation {
        let combination_count = sets.combinations.len();

        if sets.combinations.contains(key) {
            return Observation {
                is_new_combination: false,
                combination_count,
                label_counts: Vec::new(),
            };
        }

        let label_counts = labels
            .pairs()
            .iter()
            .map(|(label_key, value)| {
                let values = sets.per_label.get(label_key);
                LabelValueCount {
                    key: label_key.clone(),
                    distinct_values: values.map_or(0, HashSet::len),
                    value_is_new: values.map_or(true, |set| !set.contains(value)),
                }
            })
            .collect();

        Observation { is_new_combination: true, combination_count, label_counts }
    }

    fn commit_locked(sets: &mut LabelSets, key: &CanonicalKey, labels: &LabelSet) {
        if sets.combinations.insert(key.clone()) {
            for (label_key, value) in labels.pairs() {
                sets.per_label.entry(label_key.clone()).or_default().insert(value.clone());
            }
        }
    }

    /// Peek at tracked state without mutating it.
    pub(crate) fn observe(&self, key: &CanonicalKey, labels: &LabelSet) -> Observation {
        Self::observation_of(&self.sets.lock(), key, labels)
    }

    /// Insert the combination and its per-label values. Idempotent.
    pub(crate) fn commit(&self, key: &CanonicalKey, labels: &LabelSet) {
        Self::commit_locked(&mut self.sets.lock(), key, labels);
    }

    /// Peek, decide, and commit under a single critical section.
    ///
    /// `decide` sees the observation and returns the verdict; an allowing
    /// verdict commits before the lock is released, so two racing calls for
    /// different new combinations cannot both slip under the limit. This is
    /// the coordinator's path; the separate peek/commit pair stays available
    /// for callers that want the two-phase protocol.
    pub(crate) fn evaluate_with<F>(&self, key: &CanonicalKey, labels: &LabelSet, decide: F) -> Verdict
    where
        F: FnOnce(&Observation) -> Verdict,
    {
        let mut sets = self.sets.lock();
        let observation = Self::observation_of(&sets, key, labels);
        let verdict = decide(&observation);
        if verdict.is_allowed() && observation.is_new_combination {
            Self::commit_locked(&mut sets, key, labels);
        }
        verdict
    }

    /// Count one denial verdict; returns the new total.
    pub(crate) fn record_violation(&self) -> u64 {
        self.violation_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn stats(&self) -> MetricStats {
        let (circuit_state, last_state_change) = self.breaker.snapshot();
        let sets = self.sets.lock();
        MetricStats {
            combination_count: sets.combinations.len(),
            max_observed_per_label: sets.per_label.values().map(HashSet::len).max().unwrap_or(0),
            violation_count: self.violation_count.load(Ordering::Relaxed),
            circuit_state,
            last_state_change,
        }
    }
}

/// Thread-safe registry of per-metric cardinality state.
pub struct CardinalityTracker {
    metrics: DashMap<String, Arc<MetricState>>,
}

impl CardinalityTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self { metrics: DashMap::new() }
    }

    /// Look up or lazily create the state for `metric`. `now` seeds the
    /// breaker timestamp when the state is created.
    pub(crate) fn entry(&self, metric: &str, now: Instant) -> Arc<MetricState> {
        if let Some(state) = self.metrics.get(metric) {
            return Arc::clone(state.value());
        }
        Arc::clone(
            self.metrics
                .entry(metric.to_string())
                .or_insert_with(|| Arc::new(MetricState::new(now)))
                .value(),
        )
    }

    /// Peek at the candidate observation for `metric` without mutating
    /// tracked sets. Creates the metric's state if this is its first call.
    pub fn observe(
        &self,
        metric: &str,
        key: &CanonicalKey,
        labels: &LabelSet,
        now: Instant,
    ) -> Observation {
        self.entry(metric, now).observe(key, labels)
    }

    /// Commit an admitted combination into the tracked sets. Idempotent: a
    /// second commit of the same key is a no-op.
    pub fn commit(&self, metric: &str, key: &CanonicalKey, labels: &LabelSet, now: Instant) {
        self.entry(metric, now).commit(key, labels);
    }

    /// Snapshot for one metric; `None` if the metric was never observed.
    pub fn stats(&self, metric: &str) -> Option<MetricStats> {
        self.metrics.get(metric).map(|state| state.value().stats())
    }

    /// Snapshot of every tracked metric.
    pub fn stats_all(&self) -> HashMap<String, MetricStats> {
        self.metrics.iter().map(|entry| (entry.key().clone(), entry.value().stats())).collect()
    }

    /// Drop all state for one metric. The next observation recreates it
    /// fresh (circuit CLOSED, zeroed counters).
    pub fn reset(&self, metric: &str) {
        self.metrics.remove(metric);
    }

    /// Drop all tracked state.
    pub fn reset_all(&self) {
        self.metrics.clear();
    }

    /// Number of distinct metric names currently tracked.
    pub fn tracked_metric_count(&self) -> usize {
        self.metrics.len()
    }
}

impl Default for CardinalityTracker {
    fn default() -> Self {
        Self::new()
    }
}
