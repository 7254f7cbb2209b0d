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

use serde::{Deserialize, Serialize};

/// Latency distribution over the most recent samples, in microseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LatencyStats {
    pub avg_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

/// Counters for one write family (insert or delete).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteMetrics {
    pub calls: u64,
    pub records: u64,
    pub quorum_failures: u64,
    pub call_latency: LatencyStats,
    pub record_latency: LatencyStats,
}

/// Counters for the select path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelectMetrics {
    pub calls: u64,
    pub keys: u64,
    pub sent_to: u64,
    pub retrieved: u64,
    pub returned: u64,
    pub repairs_needed: u64,
    pub send_all_promotions: u64,
    pub call_latency: LatencyStats,
    pub first_response_latency: LatencyStats,
}

/// Counters for the repair path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepairMetrics {
    pub calls: u64,
    pub requests: u64,
    pub check_partial_failures: u64,
    pub check_complete_failures: u64,
    pub check_redundant: u64,
    pub writes: u64,
    pub write_successes: u64,
    pub write_failures: u64,
    pub check_latency: LatencyStats,
    pub write_latency: LatencyStats,
}

/// Complete metrics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_ms: u64,
    pub insert: WriteMetrics,
    pub delete: WriteMetrics,
    pub select: SelectMetrics,
    pub repair: RepairMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialization_round_trip() {
        let snapshot = MetricsSnapshot {
            uptime_ms: 1234,
            insert: WriteMetrics {
                calls: 10,
                records: 25,
                quorum_failures: 1,
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.uptime_ms, 1234);
        assert_eq!(back.insert.calls, 10);
        assert_eq!(back.insert.records, 25);
        assert_eq!(back.insert.quorum_failures, 1);
    }
}
