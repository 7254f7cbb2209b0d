//! Read-repair: background convergence of clusters that have drifted.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use zfarm_cluster::{Cluster, ScoreReply};
use zfarm_common::{KeyMember, KeyMemberSet, KeyScoreMember};

use crate::farm::FarmCore;

/// Policy deciding which submitted divergences actually get repaired.
///
/// Submission is non-blocking: strategies schedule repairs onto their own
/// tasks (or drop them) and return immediately. Dropping work is always
/// safe; a later read will detect the same divergence again.
pub trait RepairStrategy: Send + Sync {
    fn submit(&self, core: &Arc<FarmCore>, diffs: KeyMemberSet);
}

/// Repairs every submitted key-member.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllRepairs;

impl RepairStrategy for AllRepairs {
    fn submit(&self, core: &Arc<FarmCore>, diffs: KeyMemberSet) {
        for km in diffs {
            let core = Arc::clone(core);
            tokio::spawn(async move {
                repair(core, km).await;
            });
        }
    }
}

/// Drops every submission. Useful when repair traffic must be silenced
/// entirely, e.g. while backfilling clusters out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepairs;

impl RepairStrategy for NoRepairs {
    fn submit(&self, _core: &Arc<FarmCore>, _diffs: KeyMemberSet) {}
}

/// Token bucket state shared by [`RateLimitedRepairs`] submissions.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(burst_size: u32) -> Self {
        Self {
            tokens: burst_size as f64,
            last_update: Instant::now(),
        }
    }

    fn try_consume(&mut self, rate: f64, burst_size: u32, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(burst_size as f64);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Repairs submissions up to a sustained rate with a burst allowance;
/// everything over budget is dropped, not queued.
///
/// A hot key that diverges shows up in the difference set of every read
/// that touches it, so without a cap the repair traffic scales with read
/// traffic rather than with the amount of drift.
#[derive(Debug)]
pub struct RateLimitedRepairs {
    repairs_per_second: f64,
    burst_size: u32,
    bucket: Mutex<TokenBucket>,
}

impl RateLimitedRepairs {
    pub fn new(repairs_per_second: f64, burst_size: u32) -> Self {
        Self {
            repairs_per_second,
            burst_size,
            bucket: Mutex::new(TokenBucket::new(burst_size)),
        }
    }

    /// Sustained rate with a burst allowance of twice the rate.
    pub fn per_second(repairs_per_second: f64) -> Self {
        let burst_size = (repairs_per_second * 2.0).ceil() as u32;
        Self::new(repairs_per_second, burst_size)
    }
}

impl RepairStrategy for RateLimitedRepairs {
    fn submit(&self, core: &Arc<FarmCore>, diffs: KeyMemberSet) {
        let now = Instant::now();
        for km in diffs {
            let allowed = self
                .bucket
                .lock()
                .unwrap()
                .try_consume(self.repairs_per_second, self.burst_size, now);
            if !allowed {
                debug!(key = %km.key, member = %km.member, "repair dropped by rate limit");
                continue;
            }
            let core = Arc::clone(core);
            tokio::spawn(async move {
                repair(core, km).await;
            });
        }
    }
}

/// Score query outcome from one cluster, tagged with its index.
type ScoreOutcome = (usize, zfarm_common::Result<ScoreReply>);

/// Converges a single `(key, member)` across every cluster.
///
/// Queries all clusters for their current (score, side), elects the
/// highest score as the authoritative state, and pushes the winning tuple
/// to every cluster that reported anything else, using `insert` if the
/// winner was inserted-side and `delete` if it was deleted-side. Clusters
/// whose query failed are treated as lagging.
///
/// Never reports back to any caller; outcomes land in instrumentation.
pub(crate) async fn repair(core: Arc<FarmCore>, km: KeyMember) {
    let instr = Arc::clone(core.instrumentation());
    instr.repair_call();
    instr.repair_request_count(1);

    let began = Instant::now();
    let total = core.clusters().len();

    // Scatter.
    let (tx, mut rx) = mpsc::channel::<ScoreOutcome>(total);
    for (index, cluster) in core.clusters().iter().enumerate() {
        let cluster = Arc::clone(cluster);
        let tx = tx.clone();
        let key = km.key.clone();
        let member = km.member.clone();
        tokio::spawn(async move {
            let result = cluster.score(&key, &member).await;
            let _ = tx.send((index, result)).await;
        });
    }
    drop(tx);

    // Gather and elect. A score of 0.0 means the cluster has never seen
    // the pair (per the Cluster::score contract).
    let mut highest_score = 0.0;
    let mut was_inserted = false;
    let mut up_to_date: HashSet<usize> = HashSet::new();
    while let Some((index, result)) = rx.recv().await {
        let reply = match result {
            Ok(reply) => reply,
            Err(_) => {
                instr.repair_check_partial_failure();
                continue;
            }
        };
        if reply.score == highest_score && reply.was_inserted == was_inserted {
            up_to_date.insert(index);
            continue;
        }
        if reply.score > highest_score {
            highest_score = reply.score;
            was_inserted = reply.was_inserted;
            up_to_date.clear();
            up_to_date.insert(index);
        }
        // Unlikely corner: two clusters report the same score on opposite
        // sides. Whichever reply was gathered first is propagated; the
        // gather order is not deterministic.
    }
    instr.repair_check_duration(began.elapsed());

    if highest_score == 0.0 {
        // Nobody has the pair, or every query failed.
        instr.repair_check_complete_failure();
        return;
    }
    if up_to_date.len() == total {
        instr.repair_check_redundant();
        debug!(key = %km.key, member = %km.member, "repair redundant, clusters agree");
        return;
    }

    // Propagate the winner to the lagging clusters, concurrently and
    // independently; a failed push does not fail the repair.
    instr.repair_write_count();
    let winner = KeyScoreMember::new(km.key, highest_score, km.member);
    for (index, cluster) in core.clusters().iter().enumerate() {
        if up_to_date.contains(&index) {
            continue;
        }
        let cluster = Arc::clone(cluster);
        let winner = winner.clone();
        let instr = Arc::clone(&instr);
        tokio::spawn(async move {
            let began = Instant::now();
            let result = if was_inserted {
                cluster.insert(std::slice::from_ref(&winner)).await
            } else {
                cluster.delete(std::slice::from_ref(&winner)).await
            };
            instr.repair_write_duration(began.elapsed());
            match result {
                Ok(()) => instr.repair_write_success(),
                Err(e) => {
                    instr.repair_write_failure();
                    warn!(key = %winner.key, member = %winner.member, error = %e, "repair write failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_token_bucket_consumes_burst_then_blocks() {
        let mut bucket = TokenBucket::new(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert!(bucket.try_consume(10.0, 3, now));
        }
        assert!(!bucket.try_consume(10.0, 3, now));
    }

    #[test]
    fn test_token_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(1);
        let now = Instant::now();
        assert!(bucket.try_consume(10.0, 1, now));
        assert!(!bucket.try_consume(10.0, 1, now));

        // 10 per second: one token back after 100ms.
        let later = now + Duration::from_millis(110);
        assert!(bucket.try_consume(10.0, 1, later));
    }

    #[test]
    fn test_token_bucket_refill_caps_at_burst() {
        let mut bucket = TokenBucket::new(2);
        let now = Instant::now();
        assert!(bucket.try_consume(1000.0, 2, now));

        // A long idle period refills to the burst size, no further.
        let much_later = now + Duration::from_secs(60);
        assert!(bucket.try_consume(1000.0, 2, much_later));
        assert!(bucket.try_consume(1000.0, 2, much_later));
        assert!(!bucket.try_consume(1000.0, 2, much_later));
    }

    #[test]
    fn test_per_second_sets_double_burst() {
        let strategy = RateLimitedRepairs::per_second(5.0);
        assert_eq!(strategy.burst_size, 10);
        assert_eq!(strategy.repairs_per_second, 5.0);
    }
}
