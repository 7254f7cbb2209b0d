//! In-process reference cluster.

use crate::{Cluster, ScoreReply};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use zfarm_common::{FarmError, KeyScoreMember, Result};

/// A member's current state within one cluster: its winning score and
/// whether it currently lives on the inserted side. The two sides are
/// disjoint, so a single entry per member is enough.
#[derive(Debug, Clone, Copy)]
struct Entry {
    score: f64,
    inserted: bool,
}

/// An in-process [`Cluster`] holding its data in a map.
///
/// This is the reference backend used by tests and local development. It
/// honors the full two-sided contract: writes advance scores
/// monotonically, equal-score conflicts resolve to the inserted side, and
/// `select` exposes only inserted-side members.
///
/// Instances can be named so that injected failures are distinguishable in
/// aggregate error messages, and [`MemoryCluster::set_failing`] makes every
/// call error until cleared, which is enough to exercise the farm's quorum
/// and repair paths.
pub struct MemoryCluster {
    name: String,
    store: RwLock<HashMap<String, HashMap<String, Entry>>>,
    failing: AtomicBool,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Creates a cluster whose name appears in injected error messages.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// While set, every call returns an error naming this cluster.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            Err(FarmError::Cluster(format!("cluster {} unavailable", self.name)))
        } else {
            Ok(())
        }
    }

    async fn write(&self, tuples: &[KeyScoreMember], inserted: bool) -> Result<()> {
        self.check_available()?;
        let mut store = self.store.write().await;
        for tuple in tuples {
            let members = store.entry(tuple.key.clone()).or_default();
            let score = tuple.score.into_inner();
            let advance = match members.get(&tuple.member) {
                None => true,
                Some(current) if score > current.score => true,
                // Equal scores resolve to the inserted side.
                Some(current) => score == current.score && inserted && !current.inserted,
            };
            if advance {
                members.insert(tuple.member.clone(), Entry { score, inserted });
            }
        }
        Ok(())
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn insert(&self, tuples: &[KeyScoreMember]) -> Result<()> {
        self.write(tuples, true).await
    }

    async fn delete(&self, tuples: &[KeyScoreMember]) -> Result<()> {
        self.write(tuples, false).await
    }

    async fn select(
        &self,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<HashMap<String, Vec<KeyScoreMember>>> {
        self.check_available()?;
        let store = self.store.read().await;
        let mut out = HashMap::with_capacity(keys.len());
        for key in keys {
            let Some(members) = store.get(key) else {
                continue;
            };
            let mut tuples: Vec<KeyScoreMember> = members
                .iter()
                .filter(|(_, entry)| entry.inserted)
                .map(|(member, entry)| KeyScoreMember::new(key.clone(), entry.score, member.clone()))
                .collect();
            tuples.sort_unstable();
            let window: Vec<KeyScoreMember> =
                tuples.into_iter().skip(offset).take(limit).collect();
            out.insert(key.clone(), window);
        }
        Ok(out)
    }

    async fn score(&self, key: &str, member: &str) -> Result<ScoreReply> {
        self.check_available()?;
        let store = self.store.read().await;
        let reply = store
            .get(key)
            .and_then(|members| members.get(member))
            .map(|entry| ScoreReply {
                score: entry.score,
                was_inserted: entry.inserted,
            })
            .unwrap_or_else(ScoreReply::unknown);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(key: &str, score: f64, member: &str) -> KeyScoreMember {
        KeyScoreMember::new(key, score, member)
    }

    #[tokio::test]
    async fn test_insert_then_select() {
        let cluster = MemoryCluster::new();
        cluster.insert(&[t("k", 1.0, "m")]).await.unwrap();

        let result = cluster.select(&["k".to_string()], 0, 10).await.unwrap();
        assert_eq!(result["k"], vec![t("k", 1.0, "m")]);
    }

    #[tokio::test]
    async fn test_lower_score_is_dropped() {
        let cluster = MemoryCluster::new();
        cluster.insert(&[t("k", 2.0, "m")]).await.unwrap();
        cluster.insert(&[t("k", 1.0, "m")]).await.unwrap();

        let reply = cluster.score("k", "m").await.unwrap();
        assert_eq!(reply.score, 2.0);
        assert!(reply.was_inserted);
    }

    #[tokio::test]
    async fn test_higher_scored_delete_wins() {
        let cluster = MemoryCluster::new();
        cluster.insert(&[t("k", 1.0, "m")]).await.unwrap();
        cluster.delete(&[t("k", 2.0, "m")]).await.unwrap();

        let reply = cluster.score("k", "m").await.unwrap();
        assert_eq!(reply.score, 2.0);
        assert!(!reply.was_inserted);

        // Deleted members are absent from select.
        let result = cluster.select(&["k".to_string()], 0, 10).await.unwrap();
        assert!(result["k"].is_empty());
    }

    #[tokio::test]
    async fn test_equal_score_prefers_inserted_side() {
        let cluster = MemoryCluster::new();
        cluster.delete(&[t("k", 2.0, "m")]).await.unwrap();
        cluster.insert(&[t("k", 2.0, "m")]).await.unwrap();

        let reply = cluster.score("k", "m").await.unwrap();
        assert!(reply.was_inserted);

        // The reverse tie does not demote an inserted member.
        cluster.delete(&[t("k", 2.0, "m")]).await.unwrap();
        let reply = cluster.score("k", "m").await.unwrap();
        assert!(reply.was_inserted);
    }

    #[tokio::test]
    async fn test_reinsert_after_delete_needs_higher_score() {
        let cluster = MemoryCluster::new();
        cluster.insert(&[t("k", 1.0, "m")]).await.unwrap();
        cluster.delete(&[t("k", 2.0, "m")]).await.unwrap();
        cluster.insert(&[t("k", 1.5, "m")]).await.unwrap();

        let reply = cluster.score("k", "m").await.unwrap();
        assert!(!reply.was_inserted);

        cluster.insert(&[t("k", 3.0, "m")]).await.unwrap();
        let reply = cluster.score("k", "m").await.unwrap();
        assert_eq!(reply.score, 3.0);
        assert!(reply.was_inserted);
    }

    #[tokio::test]
    async fn test_select_window_and_order() {
        let cluster = MemoryCluster::new();
        cluster
            .insert(&[
                t("k", 1.0, "d"),
                t("k", 3.0, "a"),
                t("k", 2.0, "c"),
                t("k", 2.0, "b"),
            ])
            .await
            .unwrap();

        let result = cluster.select(&["k".to_string()], 0, 10).await.unwrap();
        assert_eq!(
            result["k"],
            vec![t("k", 3.0, "a"), t("k", 2.0, "b"), t("k", 2.0, "c"), t("k", 1.0, "d")]
        );

        let result = cluster.select(&["k".to_string()], 1, 2).await.unwrap();
        assert_eq!(result["k"], vec![t("k", 2.0, "b"), t("k", 2.0, "c")]);
    }

    #[tokio::test]
    async fn test_unknown_key_is_absent_from_select() {
        let cluster = MemoryCluster::new();
        let result = cluster.select(&["nope".to_string()], 0, 10).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pair_scores_zero() {
        let cluster = MemoryCluster::new();
        let reply = cluster.score("k", "m").await.unwrap();
        assert_eq!(reply, ScoreReply::unknown());
    }

    #[tokio::test]
    async fn test_failing_cluster_errors_with_name() {
        let cluster = MemoryCluster::named("c2");
        cluster.set_failing(true);

        let err = cluster.insert(&[t("k", 1.0, "m")]).await.unwrap_err();
        assert!(err.to_string().contains("c2"));
        assert!(cluster.select(&["k".to_string()], 0, 10).await.is_err());
        assert!(cluster.score("k", "m").await.is_err());

        cluster.set_failing(false);
        assert!(cluster.insert(&[t("k", 1.0, "m")]).await.is_ok());
    }
}
