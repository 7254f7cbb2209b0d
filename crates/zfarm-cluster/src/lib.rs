//! zfarm Cluster Interface
//!
//! This crate defines the contract each backend cluster satisfies and ships
//! [`MemoryCluster`], an in-process reference implementation.
//!
//! A cluster is one logical replica of the store, opaque to the farm. The
//! farm only ever talks to the four methods of the [`Cluster`] trait; how a
//! cluster shards, persists, or times out its own storage nodes is its
//! business. The farm layers quorum writes, strategy reads, and read-repair
//! on top of N such replicas.
//!
//! # Two-sided semantics
//!
//! For each key a cluster keeps two disjoint logical sub-stores per member:
//! an *inserted* side and a *deleted* side. A write lands only if its score
//! is greater than the member's current winning score; equal-score writes
//! resolve in favor of the inserted side. Lower scores are silently
//! dropped, which is what makes `insert`/`delete` idempotent and the farm's
//! fan-out safe to repeat.

mod memory;

pub use memory::MemoryCluster;

use async_trait::async_trait;
use std::collections::HashMap;
use zfarm_common::{KeyScoreMember, Result};

/// Reply to a [`Cluster::score`] query: the member's current winning score
/// and which side won. A zero score with no error means the cluster has
/// never seen the pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreReply {
    pub score: f64,
    pub was_inserted: bool,
}

impl ScoreReply {
    /// Sentinel for a pair the cluster has never seen.
    pub fn unknown() -> Self {
        Self {
            score: 0.0,
            was_inserted: false,
        }
    }
}

/// The minimum surface the farm consumes from a backend cluster.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Writes each tuple to the inserted side if its score beats the
    /// already-stored score for that `(key, member)`. Lower scores are
    /// silently dropped.
    async fn insert(&self, tuples: &[KeyScoreMember]) -> Result<()>;

    /// Writes each tuple to the deleted side under the same
    /// monotonically-advancing score rule as [`Cluster::insert`].
    async fn delete(&self, tuples: &[KeyScoreMember]) -> Result<()>;

    /// Returns each key's inserted-side members sorted by score descending
    /// (member ascending on ties), within the `offset`/`limit` window.
    /// Keys the cluster has never seen may be absent from the map.
    async fn select(
        &self,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<HashMap<String, Vec<KeyScoreMember>>>;

    /// Returns the current winning side's score for `(key, member)`.
    async fn score(&self, key: &str, member: &str) -> Result<ScoreReply>;
}
