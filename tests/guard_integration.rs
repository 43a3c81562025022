//! Integration tests for the cardinality guard.
//!
//! Exercises the full coordinator path: canonicalization, limit evaluation,
//! denial actions, circuit-breaker lifecycle with a mock clock, and
//! concurrent access from multiple threads.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cardguard::{
    CardinalityGuard, CircuitState, GuardConfig, LabelSet, LimitAction, MockClock, Verdict,
};

fn drop_guard(max_combinations: usize) -> CardinalityGuard {
    let config = GuardConfig::builder()
        .max_labels_per_metric(max_combinations)
        .action(LimitAction::Drop)
        .build()
        .expect("valid config");
    CardinalityGuard::new(config).expect("valid guard")
}

/// Validates the limit-enforcement scenario: with a limit of 5 in drop mode,
/// five distinct gateways are admitted, the sixth is denied, and the first
/// keeps recording.
#[test]
fn test_drop_mode_limit_of_five() {
    let guard = drop_guard(5);

    for i in 1..=5 {
        let allowed = guard
            .allow("requests_total", [("gateway", format!("G{i}"))])
            .expect("valid labels");
        assert!(allowed, "combination G{i} should be admitted");
    }

    assert!(!guard.allow("requests_total", [("gateway", "G6")]).expect("valid labels"));
    assert!(
        guard.allow("requests_total", [("gateway", "G1")]).expect("valid labels"),
        "previously admitted combination must keep recording"
    );

    let stats = guard.stats("requests_total").expect("tracked");
    assert_eq!(stats.combination_count, 5);
    assert_eq!(stats.violation_count, 1);
}

/// Validates idempotent re-observation: admitted combinations return true no
/// matter how many other distinct label sets have since been denied.
#[test]
fn test_admitted_combinations_survive_denials() {
    let guard = drop_guard(3);

    for i in 0..3 {
        assert!(guard.allow("m", [("id", format!("{i}"))]).expect("valid labels"));
    }
    for i in 3..50 {
        assert!(!guard.allow("m", [("id", format!("{i}"))]).expect("valid labels"));
    }
    for i in 0..3 {
        assert!(
            guard.allow("m", [("id", format!("{i}"))]).expect("valid labels"),
            "admitted combination {i} must never be penalized"
        );
    }
}

/// Validates that label order does not create duplicate identities.
#[test]
fn test_order_independent_identity() {
    let guard = drop_guard(10);

    assert!(guard.allow("m", [("a", "1"), ("b", "2")]).expect("valid labels"));
    assert!(guard.allow("m", [("b", "2"), ("a", "1")]).expect("valid labels"));

    assert_eq!(guard.stats("m").expect("tracked").combination_count, 1);
}

/// Validates per-label limit independence: the combination count can be well
/// under its limit while a single runaway key denies new combinations.
#[test]
fn test_per_label_limit_denies_independently() {
    let config = GuardConfig::builder()
        .max_labels_per_metric(1000)
        .max_values_per_label(3)
        .action(LimitAction::Drop)
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::new(config).expect("valid guard");

    for i in 0..3 {
        assert!(guard
            .allow("m", [("user_id", format!("u{i}")), ("region", "eu".to_string())])
            .expect("valid labels"));
    }

    // Fourth distinct user_id value: denied despite combination count 3.
    assert!(!guard
        .allow("m", [("user_id", "u3"), ("region", "eu")])
        .expect("valid labels"));

    // A new combination reusing tracked values is still fine.
    assert!(guard.allow("m", [("user_id", "u0"), ("region", "eu")]).expect("valid labels"));

    let stats = guard.stats("m").expect("tracked");
    assert_eq!(stats.max_observed_per_label, 3);
}

/// Validates the full circuit-breaker lifecycle from the specification
/// scenario: threshold 1, open window 100ms, limit of 1.
#[test]
fn test_circuit_breaker_lifecycle() {
    let clock = MockClock::new();
    let config = GuardConfig::builder()
        .max_labels_per_metric(1)
        .action(LimitAction::CircuitBreak)
        .failure_threshold(1)
        .open_duration(Duration::from_millis(100))
        .half_open_duration(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::with_clock(config, clock.clone()).expect("valid guard");

    // Admit one combination.
    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));

    // Second distinct combination: denied, breaker trips at threshold 1.
    assert!(!guard.allow("m", [("id", "b")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Open);

    // While open, everything is short-circuited, even the admitted set.
    assert!(!guard.allow("m", [("id", "c")]).expect("valid labels"));
    assert!(!guard.allow("m", [("id", "a")]).expect("valid labels"));

    // After the open window the next call is evaluated fresh in half-open;
    // a new distinct combination is still over the limit-of-1, so it is
    // denied and the breaker re-opens immediately.
    clock.advance_millis(100);
    assert!(!guard.allow("m", [("id", "d")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Open);

    // Probation again, this time with the admitted combination: allowed.
    clock.advance_millis(100);
    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::HalfOpen);

    // A quiet probation window closes the breaker.
    clock.advance_millis(50);
    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Closed);
}

/// Validates that closing the breaker resets the consecutive-failure count:
/// after recovery it takes a full threshold of fresh denials to re-open.
#[test]
fn test_breaker_failure_count_resets_on_close() {
    let clock = MockClock::new();
    let config = GuardConfig::builder()
        .max_labels_per_metric(1)
        .action(LimitAction::CircuitBreak)
        .failure_threshold(2)
        .open_duration(Duration::from_millis(100))
        .half_open_duration(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::with_clock(config, clock.clone()).expect("valid guard");

    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    assert!(!guard.allow("m", [("id", "b")]).expect("valid labels"));
    assert!(!guard.allow("m", [("id", "c")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Open);

    // Recover through half-open and a quiet window.
    clock.advance_millis(100);
    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    clock.advance_millis(50);
    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Closed);

    // One denial after recovery must not re-open (threshold is 2).
    assert!(!guard.allow("m", [("id", "d")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").circuit_state, CircuitState::Closed);
}

/// Validates that an open breaker on one metric leaves other metrics alone.
#[test]
fn test_open_breaker_is_per_metric() {
    let config = GuardConfig::builder()
        .max_labels_per_metric(1)
        .action(LimitAction::CircuitBreak)
        .failure_threshold(1)
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::new(config).expect("valid guard");

    assert!(guard.allow("noisy", [("id", "a")]).expect("valid labels"));
    assert!(!guard.allow("noisy", [("id", "b")]).expect("valid labels"));
    assert_eq!(guard.stats("noisy").expect("tracked").circuit_state, CircuitState::Open);

    assert!(guard.allow("quiet", [("id", "a")]).expect("valid labels"));
    assert_eq!(guard.stats("quiet").expect("tracked").circuit_state, CircuitState::Closed);
}

/// Validates log mode end to end: recording is never blocked, but denials
/// are counted and the tracked set stays bounded.
#[test]
fn test_log_mode_never_blocks_recording() {
    let config = GuardConfig::builder()
        .max_labels_per_metric(2)
        .action(LimitAction::Log)
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::new(config).expect("valid guard");

    for i in 0..10 {
        assert!(guard.allow("m", [("id", format!("{i}"))]).expect("valid labels"));
    }

    let stats = guard.stats("m").expect("tracked");
    assert_eq!(stats.combination_count, 2);
    assert_eq!(stats.violation_count, 8);
    assert_eq!(stats.circuit_state, CircuitState::Closed, "log mode never escalates");
}

/// Validates disabled enforcement: everything allowed, nothing tracked.
#[test]
fn test_disabled_enforcement() {
    let config = GuardConfig::builder()
        .max_labels_per_metric(1)
        .enforcement_enabled(false)
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::new(config).expect("valid guard");

    for i in 0..100 {
        assert!(guard.allow("m", [("id", format!("{i}"))]).expect("valid labels"));
    }
    assert!(guard.stats_all().is_empty());
}

/// Validates administrative reset: state is destroyed and rebuilt fresh on
/// the next observation.
#[test]
fn test_reset_restores_capacity() {
    let guard = drop_guard(1);

    assert!(guard.allow("m", [("id", "a")]).expect("valid labels"));
    assert!(!guard.allow("m", [("id", "b")]).expect("valid labels"));

    guard.reset("m");
    assert!(guard.stats("m").is_none());

    // Fresh state: a different combination is admitted now.
    assert!(guard.allow("m", [("id", "b")]).expect("valid labels"));
    assert_eq!(guard.stats("m").expect("tracked").violation_count, 0);
}

/// Validates the verdict surface: warn fires in the band below the limit and
/// the observation is still admitted.
#[test]
fn test_warn_verdicts_admit() {
    let config = GuardConfig::builder()
        .max_labels_per_metric(10)
        .warn_threshold_ratio(0.8)
        .action(LimitAction::Drop)
        .build()
        .expect("valid config");
    let guard = CardinalityGuard::new(config).expect("valid guard");

    let mut warned = 0;
    for i in 0..10 {
        let set = LabelSet::from_pairs([("id", format!("{i}"))]).expect("valid labels");
        match guard.check("m", &set) {
            Verdict::Allow => {}
            Verdict::Warn => warned += 1,
            Verdict::Deny => panic!("all ten combinations fit under the limit"),
        }
    }

    assert_eq!(warned, 2, "the 9th and 10th combinations sit past the 80% threshold");
    assert_eq!(guard.stats("m").expect("tracked").combination_count, 10);
}

/// Validates convergence when many threads race the same metric: the
/// tracked set ends exactly at the limit, admitted keys stay admitted, and
/// nothing overshoots.
#[test]
fn test_concurrent_same_metric_converges() {
    let guard = Arc::new(drop_guard(64));
    let threads = 8;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let mut admitted = HashSet::new();
                for i in 0..256 {
                    if guard.allow("hot", [("id", format!("{i}"))]).expect("valid labels") {
                        admitted.insert(i);
                    }
                }
                admitted
            })
        })
        .collect();

    let per_thread: Vec<HashSet<i32>> =
        handles.into_iter().map(|h| h.join().expect("thread panicked")).collect();

    let stats = guard.stats("hot").expect("tracked");
    assert_eq!(stats.combination_count, 64, "tracked set must end exactly at the limit");

    // Every admitted key must still be allowed now.
    let admitted: HashSet<i32> = per_thread.into_iter().flatten().collect();
    for i in &admitted {
        assert!(guard.allow("hot", [("id", format!("{i}"))]).expect("valid labels"));
    }
}

/// Validates that unrelated metrics make progress independently under
/// concurrency, one tracked entry set per metric.
#[test]
fn test_concurrent_distinct_metrics() {
    let guard = Arc::new(drop_guard(1000));
    let threads = 8;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let metric = format!("metric_{t}");
                for i in 0..100 {
                    assert!(guard
                        .allow(&metric, [("id", format!("{i}"))])
                        .expect("valid labels"));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(guard.tracked_metric_count(), threads);
    for (_, stats) in guard.stats_all() {
        assert_eq!(stats.combination_count, 100);
    }
}

/// Validates that reset racing in-flight calls never corrupts state: the
/// final tracked count is within bounds and subsequent calls behave.
#[test]
fn test_reset_races_with_allow() {
    let guard = Arc::new(drop_guard(32));

    let writer = {
        let guard = Arc::clone(&guard);
        thread::spawn(move || {
            for i in 0..2000 {
                let _ = guard.allow("m", [("id", format!("{}", i % 64))]);
            }
        })
    };
    let resetter = {
        let guard = Arc::clone(&guard);
        thread::spawn(move || {
            for _ in 0..50 {
                guard.reset("m");
                thread::yield_now();
            }
        })
    };

    writer.join().expect("writer panicked");
    resetter.join().expect("resetter panicked");

    if let Some(stats) = guard.stats("m") {
        assert!(stats.combination_count <= 32);
    }
    // Structures are still usable after the races.
    let _ = guard.allow("m", [("id", "fresh")]).expect("valid labels");
    assert!(guard.stats("m").expect("tracked").combination_count <= 32);
}
