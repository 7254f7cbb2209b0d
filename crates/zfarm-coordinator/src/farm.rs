use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use zfarm_cluster::Cluster;
use zfarm_common::{FarmError, KeyMember, KeyMemberSet, KeyScoreMember, Result};
use zfarm_metrics::{Instrumentation, NopInstrumentation};

use crate::read_strategy::{ReadStrategy, SelectResult};
use crate::repair::RepairStrategy;

/// Which write action a fan-out performs. Insert and delete share the
/// coordinator; the variant selects the per-cluster action and the
/// instrumentation family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Delete,
}

impl WriteOp {
    async fn apply(self, cluster: &dyn Cluster, tuples: &[KeyScoreMember]) -> Result<()> {
        match self {
            WriteOp::Insert => cluster.insert(tuples).await,
            WriteOp::Delete => cluster.delete(tuples).await,
        }
    }

    fn record_call(self, instr: &dyn Instrumentation) {
        match self {
            WriteOp::Insert => instr.insert_call(),
            WriteOp::Delete => instr.delete_call(),
        }
    }

    fn record_count(self, instr: &dyn Instrumentation, n: usize) {
        match self {
            WriteOp::Insert => instr.insert_record_count(n),
            WriteOp::Delete => instr.delete_record_count(n),
        }
    }

    fn record_call_duration(self, instr: &dyn Instrumentation, d: std::time::Duration) {
        match self {
            WriteOp::Insert => instr.insert_call_duration(d),
            WriteOp::Delete => instr.delete_call_duration(d),
        }
    }

    fn record_record_duration(self, instr: &dyn Instrumentation, d: std::time::Duration) {
        match self {
            WriteOp::Insert => instr.insert_record_duration(d),
            WriteOp::Delete => instr.delete_record_duration(d),
        }
    }

    fn record_quorum_failure(self, instr: &dyn Instrumentation) {
        match self {
            WriteOp::Insert => instr.insert_quorum_failure(),
            WriteOp::Delete => instr.delete_quorum_failure(),
        }
    }
}

/// The farm's immutable shared state: the cluster list, the write quorum,
/// the repair policy, and the instrumentation sink.
///
/// Read strategies receive an `Arc<FarmCore>` so they can fan out to the
/// clusters and hand detected divergences to the repair pipeline. All of
/// it is read-only after construction, which is what makes the farm safe
/// to share across tasks without locks.
pub struct FarmCore {
    clusters: Vec<Arc<dyn Cluster>>,
    write_quorum: usize,
    repair_strategy: Box<dyn RepairStrategy>,
    instrumentation: Arc<dyn Instrumentation>,
}

impl FarmCore {
    pub fn clusters(&self) -> &[Arc<dyn Cluster>] {
        &self.clusters
    }

    pub fn write_quorum(&self) -> usize {
        self.write_quorum
    }

    pub fn instrumentation(&self) -> &Arc<dyn Instrumentation> {
        &self.instrumentation
    }

    /// Routes diverging key-members into the repair pipeline. Non-blocking:
    /// the repair strategy schedules (or drops) the work and returns.
    pub fn submit_repairs(self: &Arc<Self>, diffs: KeyMemberSet) {
        if diffs.is_empty() {
            return;
        }
        self.repair_strategy.submit(self, diffs);
    }
}

/// CRDT-semantic sorted-set methods over many clusters.
///
/// Writes always go to every cluster; `write_quorum` determines how many
/// individual acknowledgements are needed before the caller sees an
/// overall success. Reads go to clusters according to the chosen
/// [`ReadStrategy`], and divergence detected along the way is converged in
/// the background through the [`RepairStrategy`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zfarm_cluster::{Cluster, MemoryCluster};
/// use zfarm_coordinator::{AllRepairs, Farm, SendAllReadAll};
/// use zfarm_common::KeyScoreMember;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let clusters: Vec<Arc<dyn Cluster>> = (0..3)
///     .map(|i| Arc::new(MemoryCluster::named(format!("c{i}"))) as Arc<dyn Cluster>)
///     .collect();
///
/// let farm = Farm::new(
///     clusters,
///     2,
///     Box::new(SendAllReadAll),
///     Box::new(AllRepairs),
///     None,
/// )?;
///
/// farm.insert(vec![KeyScoreMember::new("k", 1.0, "m")]).await?;
/// let result = farm.select(&["k".to_string()], 0, 10).await?;
/// assert_eq!(result["k"].len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct Farm {
    core: Arc<FarmCore>,
    read_strategy: Box<dyn ReadStrategy>,
}

impl std::fmt::Debug for Farm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Farm").finish_non_exhaustive()
    }
}

impl Farm {
    /// Creates a new farm.
    ///
    /// `instrumentation` may be `None`, in which case a no-op sink is
    /// substituted; all other parameters are required. The write quorum
    /// must be satisfiable: at least 1 and at most the cluster count.
    pub fn new(
        clusters: Vec<Arc<dyn Cluster>>,
        write_quorum: usize,
        read_strategy: Box<dyn ReadStrategy>,
        repair_strategy: Box<dyn RepairStrategy>,
        instrumentation: Option<Arc<dyn Instrumentation>>,
    ) -> Result<Self> {
        if write_quorum == 0 || write_quorum > clusters.len() {
            return Err(FarmError::InvalidQuorum {
                quorum: write_quorum,
                clusters: clusters.len(),
            });
        }
        let instrumentation =
            instrumentation.unwrap_or_else(|| Arc::new(NopInstrumentation) as Arc<dyn Instrumentation>);

        info!(
            clusters = clusters.len(),
            write_quorum, "farm initialized"
        );

        Ok(Self {
            core: Arc::new(FarmCore {
                clusters,
                write_quorum,
                repair_strategy,
                instrumentation,
            }),
            read_strategy,
        })
    }

    /// Adds each tuple to every cluster, where it lands only if its score
    /// beats the already-stored score. Succeeds once `write_quorum`
    /// clusters have acknowledged.
    pub async fn insert(&self, tuples: Vec<KeyScoreMember>) -> Result<()> {
        self.write(tuples, WriteOp::Insert).await
    }

    /// Removes each tuple from every cluster under the same
    /// score-monotonic rule and the same quorum as [`Farm::insert`].
    pub async fn delete(&self, tuples: Vec<KeyScoreMember>) -> Result<()> {
        self.write(tuples, WriteOp::Delete).await
    }

    /// Reads the requested keys through the farm's read strategy. Each
    /// key maps to at most `limit` tuples in canonical order, after
    /// skipping `offset` tuples of the converged set; keys present in no
    /// cluster map to an empty slice.
    pub async fn select(
        &self,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        self.read_strategy.select(&self.core, keys, offset, limit).await
    }

    /// Fire-and-forget convergence of a single `(key, member)`: finds the
    /// latest authoritative tuple across clusters and pushes it to the
    /// lagging ones, subject to the farm's repair strategy. Never blocks
    /// and never reports back; outcomes are visible only through
    /// instrumentation.
    pub fn repair(&self, km: KeyMember) {
        let mut diffs = KeyMemberSet::new();
        diffs.add(km);
        self.core.submit_repairs(diffs);
    }

    async fn write(&self, tuples: Vec<KeyScoreMember>, op: WriteOp) -> Result<()> {
        if tuples.is_empty() {
            return Ok(());
        }

        let instr = Arc::clone(self.core.instrumentation());
        op.record_call(instr.as_ref());
        op.record_count(instr.as_ref(), tuples.len());
        let began = Instant::now();
        let batch = tuples.len() as u32;

        // Scatter. The channel is buffered to the cluster count so
        // stragglers outliving the gather never block on send.
        let total = self.core.clusters().len();
        let (tx, mut rx) = mpsc::channel::<Result<()>>(total);
        let tuples = Arc::new(tuples);
        for cluster in self.core.clusters() {
            let cluster = Arc::clone(cluster);
            let tx = tx.clone();
            let tuples = Arc::clone(&tuples);
            tokio::spawn(async move {
                let result = op.apply(cluster.as_ref(), tuples.as_slice()).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        // Gather until the quorum is reached or mathematically out of
        // reach; whichever comes first.
        let quorum = self.core.write_quorum();
        let mut successes = 0;
        let mut errors: Vec<String> = Vec::new();
        while let Some(result) = rx.recv().await {
            match result {
                Ok(()) => successes += 1,
                Err(e) => errors.push(e.to_string()),
            }
            if successes >= quorum {
                break;
            }
            let pending = total - successes - errors.len();
            if successes + pending < quorum {
                break;
            }
        }

        let elapsed = began.elapsed();
        op.record_call_duration(instr.as_ref(), elapsed);
        op.record_record_duration(instr.as_ref(), elapsed / batch);

        if successes >= quorum {
            Ok(())
        } else {
            op.record_quorum_failure(instr.as_ref());
            warn!(?op, successes, quorum, "write missed quorum");
            Err(FarmError::NoQuorum(errors))
        }
    }
}
