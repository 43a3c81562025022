//! Denial side effects.
//!
//! Maps a DENY verdict plus the configured [`LimitAction`] to its observable
//! effect: a warning line, a silent drop, or a tick toward tripping the
//! metric's circuit breaker.

use std::time::Instant;

use tracing::warn;

use crate::config::{GuardConfig, LimitAction};
use crate::tracker::MetricState;

/// Apply the configured action for a denied combination.
///
/// Returns whether the caller should still record the observation in the
/// underlying metrics registry (`true` only in log mode, which never blocks
/// recording).
pub(crate) fn dispatch_denial(
    metric: &str,
    state: &MetricState,
    config: &GuardConfig,
    now: Instant,
) -> bool {
    match config.action {
        LimitAction::Log => {
            warn!(
                metric,
                limit = config.max_labels_per_metric,
                "cardinality limit exceeded; recording anyway (log mode)"
            );
            true
        }
        LimitAction::Drop => {
            warn!(
                metric,
                limit = config.max_labels_per_metric,
                "cardinality limit exceeded; observation dropped"
            );
            false
        }
        LimitAction::CircuitBreak => {
            warn!(
                metric,
                limit = config.max_labels_per_metric,
                "cardinality limit exceeded; counting toward circuit breaker"
            );
            state.breaker.record_failure(metric, now, config);
            false
        }
    }
}
