//! Read strategies: the policies deciding which clusters a select
//! consults and how their answers are reconciled.
//!
//! Every strategy obeys the same contract: the answers of the clusters it
//! consulted are merged by score-maximizing union, each requested key maps
//! to at most `limit` tuples in canonical order after skipping `offset`
//! tuples of the converged set, and any divergence observed among the
//! consulted answers is handed to the repair pipeline. Clusters are
//! queried with the window `(0, offset + limit)` so the offset applies to
//! the converged set rather than to each replica's local view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::mpsc;

use zfarm_cluster::Cluster;
use zfarm_common::{union_difference, FarmError, KeyMemberSet, KeyScoreMember, Result, TupleSet};

use crate::farm::FarmCore;

/// Per-key ordered slices, as returned to the client.
pub type SelectResult = HashMap<String, Vec<KeyScoreMember>>;

/// A pluggable read protocol. The farm picks one at construction time.
#[async_trait]
pub trait ReadStrategy: Send + Sync {
    async fn select(
        &self,
        core: &Arc<FarmCore>,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult>;
}

/// Spawns a select task per cluster index, each reporting into `tx`.
/// `tx` must come from a channel buffered to the full cluster count so
/// stragglers outliving the gather never block.
fn scatter_select(
    core: &Arc<FarmCore>,
    indices: &[usize],
    tx: &mpsc::Sender<Result<SelectResult>>,
    keys: &Arc<Vec<String>>,
    window: usize,
) {
    for &index in indices {
        let cluster = Arc::clone(&core.clusters()[index]);
        let tx = tx.clone();
        let keys = Arc::clone(keys);
        tokio::spawn(async move {
            let result = cluster.select(&keys, 0, window).await;
            let _ = tx.send(result).await;
        });
    }
}

/// Merges per-cluster answers: unions each key across the replies,
/// windows the converged set, and collects the diverging key-members.
/// Returns the client-facing result, the repair work list, and the number
/// of tuples retrieved before merging.
fn merge_replies(
    keys: &[String],
    replies: &[SelectResult],
    offset: usize,
    limit: usize,
) -> (SelectResult, KeyMemberSet, usize) {
    let mut out = HashMap::with_capacity(keys.len());
    let mut diffs = KeyMemberSet::new();
    let mut retrieved = 0;

    for key in keys {
        let sets: Vec<TupleSet> = replies
            .iter()
            .map(|reply| {
                let tuples = reply.get(key).cloned().unwrap_or_default();
                retrieved += tuples.len();
                TupleSet::from(tuples)
            })
            .collect();
        let (union, diff) = union_difference(&sets);
        diffs.add_many(diff);

        let window: Vec<KeyScoreMember> = union
            .ordered_limited_slice(offset.saturating_add(limit))
            .into_iter()
            .skip(offset)
            .collect();
        out.insert(key.clone(), window);
    }

    (out, diffs, retrieved)
}

/// Computes the divergences among the collected replies and submits them
/// for repair once the linger window closes or every straggler reports.
fn spawn_linger(
    core: Arc<FarmCore>,
    keys: Arc<Vec<String>>,
    mut rx: mpsc::Receiver<Result<SelectResult>>,
    mut replies: Vec<SelectResult>,
    linger: Duration,
) {
    tokio::spawn(async move {
        let deadline = Instant::now() + linger;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(Ok(reply))) => replies.push(reply),
                // Failed stragglers contribute nothing to compare.
                Ok(Some(Err(_))) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }

        if replies.len() < 2 {
            return;
        }
        let mut diffs = KeyMemberSet::new();
        for key in keys.iter() {
            let sets: Vec<TupleSet> = replies
                .iter()
                .map(|reply| TupleSet::from(reply.get(key).cloned().unwrap_or_default()))
                .collect();
            let (_, diff) = union_difference(&sets);
            diffs.add_many(diff);
        }
        core.instrumentation().select_repair_needed(diffs.len());
        core.submit_repairs(diffs);
    });
}

/// Consults every cluster and waits for every reply. Slowest but most
/// complete: every divergence across the whole farm is detected and
/// submitted for repair.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendAllReadAll;

#[async_trait]
impl ReadStrategy for SendAllReadAll {
    async fn select(
        &self,
        core: &Arc<FarmCore>,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult> {
        let instr = Arc::clone(core.instrumentation());
        instr.select_call();
        instr.select_keys(keys.len());
        let total = core.clusters().len();
        instr.select_send_to(total);
        let began = Instant::now();

        let keys = Arc::new(keys.to_vec());
        let (tx, mut rx) = mpsc::channel(total);
        let indices: Vec<usize> = (0..total).collect();
        scatter_select(core, &indices, &tx, &keys, offset.saturating_add(limit));
        drop(tx);

        let mut replies = Vec::with_capacity(total);
        let mut errors = Vec::new();
        let mut first = true;
        while let Some(result) = rx.recv().await {
            if first {
                instr.select_first_response_duration(began.elapsed());
                first = false;
            }
            match result {
                Ok(reply) => replies.push(reply),
                Err(e) => errors.push(e.to_string()),
            }
        }
        if replies.is_empty() {
            return Err(FarmError::AllClustersFailed(errors));
        }

        let (result, diffs, retrieved) = merge_replies(&keys, &replies, offset, limit);
        instr.select_retrieved(retrieved);
        instr.select_returned(result.values().map(Vec::len).sum());
        instr.select_repair_needed(diffs.len());
        core.submit_repairs(diffs);

        instr.select_call_duration(began.elapsed());
        Ok(result)
    }
}

/// Consults every cluster but answers from the first successful reply,
/// then lingers briefly in the background for the rest; divergences
/// observed among the replies collected by the deadline are repaired.
#[derive(Debug, Clone, Copy)]
pub struct SendAllReadFirstLinger {
    pub linger: Duration,
}

impl Default for SendAllReadFirstLinger {
    fn default() -> Self {
        Self {
            linger: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl ReadStrategy for SendAllReadFirstLinger {
    async fn select(
        &self,
        core: &Arc<FarmCore>,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult> {
        let instr = Arc::clone(core.instrumentation());
        instr.select_call();
        instr.select_keys(keys.len());
        let total = core.clusters().len();
        instr.select_send_to(total);
        let began = Instant::now();

        let keys = Arc::new(keys.to_vec());
        let (tx, mut rx) = mpsc::channel(total);
        let indices: Vec<usize> = (0..total).collect();
        scatter_select(core, &indices, &tx, &keys, offset.saturating_add(limit));
        drop(tx);

        let mut errors = Vec::new();
        let first = loop {
            match rx.recv().await {
                Some(Ok(reply)) => break reply,
                Some(Err(e)) => errors.push(e.to_string()),
                None => return Err(FarmError::AllClustersFailed(errors)),
            }
        };
        instr.select_first_response_duration(began.elapsed());

        let (result, _, retrieved) =
            merge_replies(&keys, std::slice::from_ref(&first), offset, limit);
        instr.select_retrieved(retrieved);
        instr.select_returned(result.values().map(Vec::len).sum());

        spawn_linger(Arc::clone(core), keys, rx, vec![first], self.linger);

        instr.select_call_duration(began.elapsed());
        Ok(result)
    }
}

/// Consults a single uniformly random cluster. Cheapest read; divergence
/// cannot be detected, so nothing is ever repaired.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOneReadOne;

#[async_trait]
impl ReadStrategy for SendOneReadOne {
    async fn select(
        &self,
        core: &Arc<FarmCore>,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult> {
        let instr = Arc::clone(core.instrumentation());
        instr.select_call();
        instr.select_keys(keys.len());
        instr.select_send_to(1);
        let began = Instant::now();

        let index = rand::thread_rng().gen_range(0..core.clusters().len());
        let reply = core.clusters()[index]
            .select(keys, 0, offset.saturating_add(limit))
            .await?;
        instr.select_first_response_duration(began.elapsed());

        let (result, _, retrieved) =
            merge_replies(keys, std::slice::from_ref(&reply), offset, limit);
        instr.select_retrieved(retrieved);
        instr.select_returned(result.values().map(Vec::len).sum());

        instr.select_call_duration(began.elapsed());
        Ok(result)
    }
}

/// Starts with a random subset of `initial` clusters and escalates to the
/// rest when a reply comes back successful but empty. Answers from the
/// first non-empty successful reply; divergences among the replies
/// actually received are repaired after a linger window.
#[derive(Debug, Clone, Copy)]
pub struct SendVarReadFirstLinger {
    pub initial: usize,
    pub linger: Duration,
}

impl Default for SendVarReadFirstLinger {
    fn default() -> Self {
        Self {
            initial: 1,
            linger: Duration::from_millis(100),
        }
    }
}

#[async_trait]
impl ReadStrategy for SendVarReadFirstLinger {
    async fn select(
        &self,
        core: &Arc<FarmCore>,
        keys: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<SelectResult> {
        let instr = Arc::clone(core.instrumentation());
        instr.select_call();
        instr.select_keys(keys.len());
        let total = core.clusters().len();
        let initial = self.initial.clamp(1, total);
        let window = offset.saturating_add(limit);
        let began = Instant::now();

        let mut order: Vec<usize> = (0..total).collect();
        order.shuffle(&mut rand::thread_rng());
        let (first_wave, reserve) = order.split_at(initial);

        let keys = Arc::new(keys.to_vec());
        let (tx, mut rx) = mpsc::channel(total);
        scatter_select(core, first_wave, &tx, &keys, window);
        instr.select_send_to(initial);

        let mut expected = initial;
        let mut received: Vec<SelectResult> = Vec::new();
        let mut errors = Vec::new();
        let mut escalated = false;
        let mut chosen: Option<SelectResult> = None;
        let mut first = true;

        while received.len() + errors.len() < expected {
            let Some(result) = rx.recv().await else {
                break;
            };
            if first {
                instr.select_first_response_duration(began.elapsed());
                first = false;
            }
            match result {
                Ok(reply) => {
                    let empty = reply.values().all(Vec::is_empty);
                    if !empty {
                        chosen = Some(reply.clone());
                    }
                    received.push(reply);
                    if chosen.is_some() {
                        break;
                    }
                    if !escalated && expected < total {
                        // An empty answer may just mean a lagging replica;
                        // widen the net before concluding the keys are gone.
                        escalated = true;
                        instr.select_send_all_promotion();
                        scatter_select(core, reserve, &tx, &keys, window);
                        instr.select_send_to(total - expected);
                        expected = total;
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
        }
        drop(tx);

        if received.is_empty() {
            return Err(FarmError::AllClustersFailed(errors));
        }

        let answer: Vec<SelectResult> = match chosen {
            Some(reply) => vec![reply],
            // Every consulted cluster answered empty; merge the empties so
            // each requested key still maps to an empty slice.
            None => received.clone(),
        };
        let (result, _, retrieved) = merge_replies(&keys, &answer, offset, limit);
        instr.select_retrieved(retrieved);
        instr.select_returned(result.values().map(Vec::len).sum());

        spawn_linger(Arc::clone(core), keys, rx, received, self.linger);

        instr.select_call_duration(began.elapsed());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zfarm_common::KeyMember;

    fn t(key: &str, score: f64, member: &str) -> KeyScoreMember {
        KeyScoreMember::new(key, score, member)
    }

    fn reply(entries: &[(&str, Vec<KeyScoreMember>)]) -> SelectResult {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_unions_across_replies() {
        let keys = vec!["k".to_string()];
        let replies = vec![
            reply(&[("k", vec![t("k", 1.0, "m1")])]),
            reply(&[("k", vec![t("k", 2.0, "m1"), t("k", 1.0, "m2")])]),
        ];

        let (result, diffs, retrieved) = merge_replies(&keys, &replies, 0, 10);
        assert_eq!(result["k"], vec![t("k", 2.0, "m1"), t("k", 1.0, "m2")]);
        assert_eq!(retrieved, 3);
        assert!(diffs.has(&KeyMember::new("k", "m1")));
        assert!(diffs.has(&KeyMember::new("k", "m2")));
    }

    #[test]
    fn test_merge_applies_offset_to_converged_set() {
        let keys = vec!["k".to_string()];
        let replies = vec![
            reply(&[("k", vec![t("k", 3.0, "a"), t("k", 1.0, "c")])]),
            reply(&[("k", vec![t("k", 2.0, "b")])]),
        ];

        let (result, _, _) = merge_replies(&keys, &replies, 1, 1);
        // Converged order is a(3), b(2), c(1); offset 1 limit 1 → b.
        assert_eq!(result["k"], vec![t("k", 2.0, "b")]);
    }

    #[test]
    fn test_merge_missing_key_yields_empty_slice() {
        let keys = vec!["k".to_string(), "missing".to_string()];
        let replies = vec![reply(&[("k", vec![t("k", 1.0, "m")])])];

        let (result, diffs, _) = merge_replies(&keys, &replies, 0, 10);
        assert_eq!(result["missing"], Vec::<KeyScoreMember>::new());
        // A single consulted reply cannot diverge from itself.
        assert!(diffs.is_empty());
    }

    #[test]
    fn test_merge_key_absent_from_one_reply_diverges() {
        let keys = vec!["k".to_string()];
        let replies = vec![
            reply(&[("k", vec![t("k", 1.0, "m")])]),
            reply(&[]), // replied, but has never seen the key
        ];

        let (result, diffs, _) = merge_replies(&keys, &replies, 0, 10);
        assert_eq!(result["k"], vec![t("k", 1.0, "m")]);
        assert!(diffs.has(&KeyMember::new("k", "m")));
    }

    #[test]
    fn test_merge_agreeing_replies_have_no_diffs() {
        let keys = vec!["k".to_string()];
        let answer = reply(&[("k", vec![t("k", 2.0, "m")])]);
        let (result, diffs, _) =
            merge_replies(&keys, &[answer.clone(), answer.clone(), answer], 0, 10);
        assert_eq!(result["k"], vec![t("k", 2.0, "m")]);
        assert!(diffs.is_empty());
    }

    #[test]
    fn test_merge_deduplicates_key_members() {
        // The same member at different scores collapses to the max.
        let keys = vec!["k".to_string()];
        let replies = vec![
            reply(&[("k", vec![t("k", 1.0, "m")])]),
            reply(&[("k", vec![t("k", 5.0, "m")])]),
            reply(&[("k", vec![t("k", 3.0, "m")])]),
        ];
        let (result, _, _) = merge_replies(&keys, &replies, 0, 10);
        assert_eq!(result["k"], vec![t("k", 5.0, "m")]);
    }
}
