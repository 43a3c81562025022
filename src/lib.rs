//! Runtime cardinality guard for metrics-emission pipelines.
//!
//! Sits between application code that wants to record a metric observation
//! (a name plus key/value labels) and the underlying time-series registry,
//! and prevents cardinality explosions: label combinations that grow without
//! bound (per-user or per-transaction identifiers leaking into labels) and
//! overwhelm the downstream store.
//!
//! ## Problem
//! High-cardinality metrics (many unique label combinations) cause memory
//! exhaustion in the collector, slow queries, and storage bloat. A single
//! leaked identifier label is enough.
//!
//! ## Solution
//! Track distinct label combinations (and distinct values per label key) per
//! metric, and apply a configurable action once limits are reached: warn and
//! keep recording, drop the observation, or trip a per-metric circuit
//! breaker that temporarily suspends the metric and probes for recovery.
//! Combinations admitted before the limit keep recording forever; the guard
//! never fails a production request.
//!
//! ## Usage
//! ```
//! use cardguard::{CardinalityGuard, GuardConfig, LimitAction};
//!
//! let config = GuardConfig::builder()
//!     .max_labels_per_metric(1000)
//!     .max_values_per_label(100)
//!     .action(LimitAction::Drop)
//!     .build()?;
//! let guard = CardinalityGuard::new(config)?;
//!
//! if guard.allow("http_requests_total", [("method", "GET"), ("status", "200")])? {
//!     // proceed to record in the real metrics registry
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod breaker;
pub mod canonical;
pub mod clock;
pub mod config;
mod dispatch;
pub mod error;
pub mod guard;
pub mod policy;
pub mod tracker;
pub mod utils;

pub use breaker::CircuitState;
pub use canonical::{CanonicalKey, LabelSet};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{ConfigError, ConfigResult, GuardConfig, GuardConfigBuilder, LimitAction};
pub use error::{GuardError, GuardResult};
pub use guard::CardinalityGuard;
pub use policy::Verdict;
pub use tracker::{CardinalityTracker, LabelValueCount, MetricStats, Observation};
