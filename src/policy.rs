//! Pure limit-evaluation policy.
//!
//! Decides ALLOW / WARN / DENY from a tracker observation and the configured
//! thresholds. The function is side-effect free; the coordinator owns commit
//! and escalation.

use std::fmt;

use crate::config::GuardConfig;
use crate::tracker::Observation;

/// Outcome of evaluating one recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Record normally.
    Allow,
    /// Record, but the metric is approaching its combination limit.
    Warn,
    /// The combination must not be admitted into tracked state.
    Deny,
}

impl Verdict {
    /// Whether the verdict admits the combination (Warn counts as allowed).
    pub fn is_allowed(self) -> bool {
        !matches!(self, Verdict::Deny)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "ALLOW"),
            Verdict::Warn => write!(f, "WARN"),
            Verdict::Deny => write!(f, "DENY"),
        }
    }
}

/// Evaluate a candidate observation against the configured limits.
///
/// Rules, in order:
/// - a previously admitted combination is always allowed, even when the
///   metric is at or over its limit;
/// - a new combination that would exceed `max_labels_per_metric` is denied;
/// - a new combination introducing a new value for a label key whose
///   distinct-value set is already full is denied (independent of the
///   combination limit; either alone suffices);
/// - a new combination past the warn threshold is admitted with a warning.
pub fn evaluate(observation: &Observation, config: &GuardConfig) -> Verdict {
    if !observation.is_new_combination {
        return Verdict::Allow;
    }

    if observation.combination_count + 1 > config.max_labels_per_metric {
        return Verdict::Deny;
    }

    for label in &observation.label_counts {
        if label.value_is_new && label.distinct_values + 1 > config.max_values_per_label {
            return Verdict::Deny;
        }
    }

    if observation.combination_count + 1 > config.warn_limit() {
        return Verdict::Warn;
    }

    Verdict::Allow
}
