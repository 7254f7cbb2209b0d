// Copyright 2025 zfarm Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

/// The named counters and duration observers the farm reports to.
///
/// The farm calls these from its hot paths, so implementations must be
/// cheap and non-blocking; they are invoked concurrently from many tasks.
/// Every method defaults to a no-op, which makes [`NopInstrumentation`]
/// trivial and lets a sink implement only the families it cares about.
///
/// Durations arrive as wall-clock elapsed times measured inside the farm;
/// per-record durations are the call duration divided by the batch size.
pub trait Instrumentation: Send + Sync {
    // ── Insert family ────────────────────────────────────────────────

    fn insert_call(&self) {}
    fn insert_record_count(&self, _n: usize) {}
    fn insert_call_duration(&self, _d: Duration) {}
    fn insert_record_duration(&self, _d: Duration) {}
    /// Recorded when an insert misses its write quorum.
    fn insert_quorum_failure(&self) {}

    // ── Delete family ────────────────────────────────────────────────

    fn delete_call(&self) {}
    fn delete_record_count(&self, _n: usize) {}
    fn delete_call_duration(&self, _d: Duration) {}
    fn delete_record_duration(&self, _d: Duration) {}
    /// Recorded when a delete misses its write quorum.
    fn delete_quorum_failure(&self) {}

    // ── Select family ────────────────────────────────────────────────

    fn select_call(&self) {}
    /// Number of keys requested by one select call.
    fn select_keys(&self, _n: usize) {}
    /// Number of clusters a select call was sent to.
    fn select_send_to(&self, _n: usize) {}
    fn select_first_response_duration(&self, _d: Duration) {}
    fn select_call_duration(&self, _d: Duration) {}
    /// Tuples retrieved from clusters before merging.
    fn select_retrieved(&self, _n: usize) {}
    /// Tuples returned to the client after merging and windowing.
    fn select_returned(&self, _n: usize) {}
    /// Diverging key-members handed to the repair pipeline.
    fn select_repair_needed(&self, _n: usize) {}
    /// A variable-fan-out read escalated to the remaining clusters.
    fn select_send_all_promotion(&self) {}

    // ── Repair family ────────────────────────────────────────────────

    fn repair_call(&self) {}
    fn repair_request_count(&self, _n: usize) {}
    /// A single cluster's score query failed during a repair check.
    fn repair_check_partial_failure(&self) {}
    /// Every cluster's score query failed (or nobody held the pair).
    fn repair_check_complete_failure(&self) {}
    /// All clusters already agreed; no write was issued.
    fn repair_check_redundant(&self) {}
    fn repair_check_duration(&self, _d: Duration) {}
    /// A repair decided to propagate the winning tuple.
    fn repair_write_count(&self) {}
    fn repair_write_success(&self) {}
    fn repair_write_failure(&self) {}
    fn repair_write_duration(&self, _d: Duration) {}
}

/// An [`Instrumentation`] sink that discards everything. Substituted by
/// the farm when no instrumentation is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopInstrumentation;

impl Instrumentation for NopInstrumentation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nop_accepts_every_call() {
        let nop = NopInstrumentation;
        nop.insert_call();
        nop.insert_record_count(10);
        nop.insert_call_duration(Duration::from_millis(1));
        nop.delete_quorum_failure();
        nop.select_send_to(3);
        nop.select_send_all_promotion();
        nop.repair_check_redundant();
        nop.repair_write_duration(Duration::from_micros(7));
    }

    #[test]
    fn test_partial_sink_is_a_valid_implementation() {
        use std::sync::atomic::{AtomicU64, Ordering};

        #[derive(Default)]
        struct QuorumFailuresOnly {
            failures: AtomicU64,
        }

        impl Instrumentation for QuorumFailuresOnly {
            fn insert_quorum_failure(&self) {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }

        let sink = QuorumFailuresOnly::default();
        sink.insert_call(); // default no-op
        sink.insert_quorum_failure();
        assert_eq!(sink.failures.load(Ordering::Relaxed), 1);
    }
}
