//! zfarm Metrics Collection
//!
//! This crate provides the instrumentation surface the farm reports to and
//! a thread-safe, lock-free implementation of it.
//!
//! # Architecture
//!
//! The metrics system is built around three core components:
//!
//! - [`Instrumentation`]: the trait of named counters and duration
//!   observers the farm calls into; every method is a default no-op, so
//!   partial sinks are valid implementations
//! - [`FarmMetrics`]: an atomic registry implementing the full trait with
//!   lock-free counters and ring-buffer latency percentiles
//! - [`MetricsSnapshot`]: a serializable snapshot of the current state
//!
//! # Counter Families
//!
//! Counters are grouped by the operation that records them: the insert and
//! delete write families (calls, record counts, quorum failures, call and
//! per-record durations), the select family (calls, key and fan-out
//! counts, first-response and total durations, retrieved/returned tuple
//! counts, repair submissions, send-all promotions), and the repair family
//! (calls, check outcomes, write outcomes, check and write durations).
//!
//! The farm never reads any of this back; sinks are write-only from its
//! perspective, and [`NopInstrumentation`] is always an acceptable sink.
//!
//! # Usage Example
//!
//! ```rust
//! use zfarm_metrics::{FarmMetrics, Instrumentation};
//! use std::time::Duration;
//!
//! let metrics = FarmMetrics::new();
//! metrics.insert_call();
//! metrics.insert_record_count(3);
//! metrics.insert_call_duration(Duration::from_micros(250));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.insert.calls, 1);
//! assert_eq!(snapshot.insert.records, 3);
//! ```

mod instrumentation;
mod registry;
mod snapshot;

pub use instrumentation::{Instrumentation, NopInstrumentation};
pub use registry::FarmMetrics;
pub use snapshot::{LatencyStats, MetricsSnapshot, RepairMetrics, SelectMetrics, WriteMetrics};
