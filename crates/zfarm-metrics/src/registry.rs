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

use crate::instrumentation::Instrumentation;
use crate::snapshot::{
    LatencyStats, MetricsSnapshot, RepairMetrics, SelectMetrics, WriteMetrics,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const LATENCY_BUFFER_SIZE: usize = 1000;

/// Ring buffer for storing latency samples.
#[derive(Debug)]
struct LatencyBuffer {
    samples: Vec<AtomicU64>,
    index: AtomicU64,
}

impl LatencyBuffer {
    fn new() -> Self {
        Self {
            samples: (0..LATENCY_BUFFER_SIZE).map(|_| AtomicU64::new(0)).collect(),
            index: AtomicU64::new(0),
        }
    }

    fn record(&self, d: Duration) {
        // Zero marks an empty slot; clamp real samples to at least 1us.
        let latency_us = (d.as_micros() as u64).max(1);
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % LATENCY_BUFFER_SIZE as u64;
        self.samples[idx as usize].store(latency_us, Ordering::Relaxed);
    }

    fn stats(&self) -> LatencyStats {
        let mut samples: Vec<u64> = self
            .samples
            .iter()
            .map(|s| s.load(Ordering::Relaxed))
            .filter(|&s| s > 0)
            .collect();

        if samples.is_empty() {
            return LatencyStats::default();
        }

        samples.sort_unstable();
        let len = samples.len();

        LatencyStats {
            avg_us: samples.iter().sum::<u64>() / len as u64,
            p50_us: samples[len * 50 / 100],
            p95_us: samples[(len * 95 / 100).min(len - 1)],
            p99_us: samples[(len * 99 / 100).min(len - 1)],
        }
    }
}

#[derive(Debug)]
struct WriteFamily {
    calls: AtomicU64,
    records: AtomicU64,
    quorum_failures: AtomicU64,
    call_latency: LatencyBuffer,
    record_latency: LatencyBuffer,
}

impl WriteFamily {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            records: AtomicU64::new(0),
            quorum_failures: AtomicU64::new(0),
            call_latency: LatencyBuffer::new(),
            record_latency: LatencyBuffer::new(),
        }
    }

    fn snapshot(&self) -> WriteMetrics {
        WriteMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            quorum_failures: self.quorum_failures.load(Ordering::Relaxed),
            call_latency: self.call_latency.stats(),
            record_latency: self.record_latency.stats(),
        }
    }
}

#[derive(Debug)]
struct SelectFamily {
    calls: AtomicU64,
    keys: AtomicU64,
    sent_to: AtomicU64,
    retrieved: AtomicU64,
    returned: AtomicU64,
    repairs_needed: AtomicU64,
    send_all_promotions: AtomicU64,
    call_latency: LatencyBuffer,
    first_response_latency: LatencyBuffer,
}

impl SelectFamily {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            keys: AtomicU64::new(0),
            sent_to: AtomicU64::new(0),
            retrieved: AtomicU64::new(0),
            returned: AtomicU64::new(0),
            repairs_needed: AtomicU64::new(0),
            send_all_promotions: AtomicU64::new(0),
            call_latency: LatencyBuffer::new(),
            first_response_latency: LatencyBuffer::new(),
        }
    }

    fn snapshot(&self) -> SelectMetrics {
        SelectMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            keys: self.keys.load(Ordering::Relaxed),
            sent_to: self.sent_to.load(Ordering::Relaxed),
            retrieved: self.retrieved.load(Ordering::Relaxed),
            returned: self.returned.load(Ordering::Relaxed),
            repairs_needed: self.repairs_needed.load(Ordering::Relaxed),
            send_all_promotions: self.send_all_promotions.load(Ordering::Relaxed),
            call_latency: self.call_latency.stats(),
            first_response_latency: self.first_response_latency.stats(),
        }
    }
}

#[derive(Debug)]
struct RepairFamily {
    calls: AtomicU64,
    requests: AtomicU64,
    check_partial_failures: AtomicU64,
    check_complete_failures: AtomicU64,
    check_redundant: AtomicU64,
    writes: AtomicU64,
    write_successes: AtomicU64,
    write_failures: AtomicU64,
    check_latency: LatencyBuffer,
    write_latency: LatencyBuffer,
}

impl RepairFamily {
    fn new() -> Self {
        Self {
            calls: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            check_partial_failures: AtomicU64::new(0),
            check_complete_failures: AtomicU64::new(0),
            check_redundant: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            write_successes: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            check_latency: LatencyBuffer::new(),
            write_latency: LatencyBuffer::new(),
        }
    }

    fn snapshot(&self) -> RepairMetrics {
        RepairMetrics {
            calls: self.calls.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            check_partial_failures: self.check_partial_failures.load(Ordering::Relaxed),
            check_complete_failures: self.check_complete_failures.load(Ordering::Relaxed),
            check_redundant: self.check_redundant.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            write_successes: self.write_successes.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            check_latency: self.check_latency.stats(),
            write_latency: self.write_latency.stats(),
        }
    }
}

/// Lock-free [`Instrumentation`] implementation.
///
/// Counter increments are atomic fetch-adds and latency observations go
/// into fixed-size ring buffers, so recording from the farm's hot paths
/// never blocks. [`FarmMetrics::snapshot`] assembles a serializable view
/// with avg/p50/p95/p99 over the most recent samples.
///
/// Share it as an `Arc<FarmMetrics>`: hand one clone to the farm as its
/// instrumentation and keep another to poll snapshots from.
#[derive(Debug)]
pub struct FarmMetrics {
    started: Instant,
    insert: WriteFamily,
    delete: WriteFamily,
    select: SelectFamily,
    repair: RepairFamily,
}

impl FarmMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            insert: WriteFamily::new(),
            delete: WriteFamily::new(),
            select: SelectFamily::new(),
            repair: RepairFamily::new(),
        }
    }

    /// Takes a snapshot of the current metrics state.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_ms: self.started.elapsed().as_millis() as u64,
            insert: self.insert.snapshot(),
            delete: self.delete.snapshot(),
            select: self.select.snapshot(),
            repair: self.repair.snapshot(),
        }
    }
}

impl Default for FarmMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrumentation for FarmMetrics {
    fn insert_call(&self) {
        self.insert.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn insert_record_count(&self, n: usize) {
        self.insert.records.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn insert_call_duration(&self, d: Duration) {
        self.insert.call_latency.record(d);
    }

    fn insert_record_duration(&self, d: Duration) {
        self.insert.record_latency.record(d);
    }

    fn insert_quorum_failure(&self) {
        self.insert.quorum_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn delete_call(&self) {
        self.delete.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn delete_record_count(&self, n: usize) {
        self.delete.records.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn delete_call_duration(&self, d: Duration) {
        self.delete.call_latency.record(d);
    }

    fn delete_record_duration(&self, d: Duration) {
        self.delete.record_latency.record(d);
    }

    fn delete_quorum_failure(&self) {
        self.delete.quorum_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn select_call(&self) {
        self.select.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn select_keys(&self, n: usize) {
        self.select.keys.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn select_send_to(&self, n: usize) {
        self.select.sent_to.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn select_first_response_duration(&self, d: Duration) {
        self.select.first_response_latency.record(d);
    }

    fn select_call_duration(&self, d: Duration) {
        self.select.call_latency.record(d);
    }

    fn select_retrieved(&self, n: usize) {
        self.select.retrieved.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn select_returned(&self, n: usize) {
        self.select.returned.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn select_repair_needed(&self, n: usize) {
        self.select.repairs_needed.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn select_send_all_promotion(&self) {
        self.select.send_all_promotions.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_call(&self) {
        self.repair.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_request_count(&self, n: usize) {
        self.repair.requests.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn repair_check_partial_failure(&self) {
        self.repair.check_partial_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_check_complete_failure(&self) {
        self.repair.check_complete_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_check_redundant(&self) {
        self.repair.check_redundant.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_check_duration(&self, d: Duration) {
        self.repair.check_latency.record(d);
    }

    fn repair_write_count(&self) {
        self.repair.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_write_success(&self) {
        self.repair.write_successes.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_write_failure(&self) {
        self.repair.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn repair_write_duration(&self, d: Duration) {
        self.repair.write_latency.record(d);
    }
}
