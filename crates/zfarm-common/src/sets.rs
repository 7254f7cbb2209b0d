//! Bulk-set helpers and the union/difference reconciliation primitive.

use crate::tuple::{KeyMember, KeyScoreMember};
use ordered_float::OrderedFloat;
use std::collections::{HashMap, HashSet};

/// A mathematical set of tuples (no duplicates).
///
/// Holds one entry per exact `(key, score, member)` observation. Replica
/// answers are loaded into tuple sets before reconciliation so that
/// duplicate observations collapse and [`union_difference`] can count
/// agreement by multiplicity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TupleSet {
    tuples: HashSet<KeyScoreMember>,
}

impl TupleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tuples: HashSet::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Adds a tuple; re-adding an identical tuple is a no-op.
    pub fn add(&mut self, tuple: KeyScoreMember) {
        self.tuples.insert(tuple);
    }

    /// Whether this exact tuple (all three fields) is present.
    pub fn has(&self, tuple: &KeyScoreMember) -> bool {
        self.tuples.contains(tuple)
    }

    /// Merges every tuple of `other` into this set.
    pub fn add_many(&mut self, other: TupleSet) {
        self.tuples.extend(other.tuples);
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyScoreMember> {
        self.tuples.iter()
    }

    /// The set contents as a vector, in arbitrary order.
    pub fn slice(&self) -> Vec<KeyScoreMember> {
        self.tuples.iter().cloned().collect()
    }

    /// The set contents in canonical order (key asc, score desc, member
    /// asc), truncated to at most `limit` tuples.
    pub fn ordered_limited_slice(&self, limit: usize) -> Vec<KeyScoreMember> {
        let mut out = self.slice();
        out.sort_unstable();
        out.truncate(limit);
        out
    }
}

impl From<Vec<KeyScoreMember>> for TupleSet {
    fn from(tuples: Vec<KeyScoreMember>) -> Self {
        Self {
            tuples: tuples.into_iter().collect(),
        }
    }
}

impl FromIterator<KeyScoreMember> for TupleSet {
    fn from_iter<I: IntoIterator<Item = KeyScoreMember>>(iter: I) -> Self {
        Self {
            tuples: iter.into_iter().collect(),
        }
    }
}

/// A set of `(key, member)` pairs. Same operations as [`TupleSet`] minus
/// the ordering; used as the read-repair work list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyMemberSet {
    pairs: HashSet<KeyMember>,
}

impl KeyMemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn add(&mut self, pair: KeyMember) {
        self.pairs.insert(pair);
    }

    pub fn has(&self, pair: &KeyMember) -> bool {
        self.pairs.contains(pair)
    }

    pub fn add_many(&mut self, other: KeyMemberSet) {
        self.pairs.extend(other.pairs);
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyMember> {
        self.pairs.iter()
    }

    /// The set contents as a vector, in arbitrary order.
    pub fn slice(&self) -> Vec<KeyMember> {
        self.pairs.iter().cloned().collect()
    }
}

impl From<Vec<KeyMember>> for KeyMemberSet {
    fn from(pairs: Vec<KeyMember>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }
}

impl IntoIterator for KeyMemberSet {
    type Item = KeyMember;
    type IntoIter = std::collections::hash_set::IntoIter<KeyMember>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

/// Computes the union and difference of the given replica answer sets in a
/// single pass.
///
/// The **union** is the CRDT join of the inputs: for each distinct
/// `(key, member)` appearing in any input, the single tuple with the
/// maximum observed score. The **difference** is the set of `(key, member)`
/// pairs that did not appear in *every* input with identical score, whether
/// missing in some replicas or present with diverging scores.
///
/// The function is pure and commutative over its inputs; unioning a set
/// with itself yields the set.
pub fn union_difference(sets: &[TupleSet]) -> (TupleSet, KeyMemberSet) {
    let expected = sets.len();
    let mut scores: HashMap<KeyMember, OrderedFloat<f64>> = HashMap::new();
    let mut counts: HashMap<&KeyScoreMember, usize> = HashMap::new();

    for set in sets {
        for tuple in set.iter() {
            let km = tuple.key_member();
            match scores.get(&km) {
                Some(best) if *best >= tuple.score => {}
                _ => {
                    scores.insert(km, tuple.score);
                }
            }
            *counts.entry(tuple).or_insert(0) += 1;
        }
    }

    let mut union = TupleSet::with_capacity(scores.len());
    for (km, best) in scores {
        union.add(KeyScoreMember {
            key: km.key,
            score: best,
            member: km.member,
        });
    }

    let mut difference = KeyMemberSet::new();
    for (tuple, count) in counts {
        if count < expected {
            difference.add(tuple.key_member());
        }
    }

    (union, difference)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(key: &str, score: f64, member: &str) -> KeyScoreMember {
        KeyScoreMember::new(key, score, member)
    }

    #[test]
    fn test_tuple_set_add_and_has() {
        let mut set = TupleSet::new();
        assert!(set.is_empty());
        set.add(t("k", 1.0, "m"));
        set.add(t("k", 1.0, "m")); // duplicate collapses
        assert_eq!(set.len(), 1);
        assert!(set.has(&t("k", 1.0, "m")));
        assert!(!set.has(&t("k", 2.0, "m")));
    }

    #[test]
    fn test_tuple_set_add_many() {
        let mut a = TupleSet::from(vec![t("k", 1.0, "m1")]);
        let b = TupleSet::from(vec![t("k", 1.0, "m1"), t("k", 2.0, "m2")]);
        a.add_many(b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_ordered_limited_slice() {
        let set = TupleSet::from(vec![
            t("k", 1.0, "c"),
            t("k", 3.0, "a"),
            t("k", 2.0, "b"),
        ]);
        assert_eq!(
            set.ordered_limited_slice(2),
            vec![t("k", 3.0, "a"), t("k", 2.0, "b")]
        );
        // limit larger than the set returns everything
        assert_eq!(set.ordered_limited_slice(10).len(), 3);
        // zero limit returns nothing
        assert!(set.ordered_limited_slice(0).is_empty());
    }

    #[test]
    fn test_key_member_set_ops() {
        let mut set = KeyMemberSet::new();
        set.add(KeyMember::new("k", "m"));
        set.add(KeyMember::new("k", "m"));
        assert_eq!(set.len(), 1);
        assert!(set.has(&KeyMember::new("k", "m")));

        let other = KeyMemberSet::from(vec![KeyMember::new("k", "n")]);
        set.add_many(other);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_union_takes_max_score_per_pair() {
        let a = TupleSet::from(vec![t("k", 1.0, "m")]);
        let b = TupleSet::from(vec![t("k", 2.0, "m")]);
        let (union, _) = union_difference(&[a, b]);
        assert_eq!(union.slice(), vec![t("k", 2.0, "m")]);
    }

    #[test]
    fn test_difference_flags_any_divergence() {
        // Three replicas with partial agreement: both members diverge.
        let c0 = TupleSet::from(vec![t("k", 1.0, "m1")]);
        let c1 = TupleSet::from(vec![t("k", 2.0, "m1"), t("k", 1.0, "m2")]);
        let c2 = TupleSet::from(vec![t("k", 1.0, "m2")]);

        let (union, difference) = union_difference(&[c0, c1, c2]);

        let mut merged = union.ordered_limited_slice(10);
        merged.sort();
        assert_eq!(merged, vec![t("k", 2.0, "m1"), t("k", 1.0, "m2")]);

        assert_eq!(difference.len(), 2);
        assert!(difference.has(&KeyMember::new("k", "m1")));
        assert!(difference.has(&KeyMember::new("k", "m2")));
    }

    #[test]
    fn test_perfect_agreement_has_empty_difference() {
        let set = TupleSet::from(vec![t("k", 3.0, "m"), t("k", 1.0, "n")]);
        let (union, difference) = union_difference(&[set.clone(), set.clone(), set.clone()]);
        assert_eq!(union, set);
        assert!(difference.is_empty());
    }

    #[test]
    fn test_union_is_idempotent() {
        let set = TupleSet::from(vec![t("k", 1.0, "m"), t("j", 2.0, "n")]);
        let (union, _) = union_difference(&[set.clone(), set.clone()]);
        assert_eq!(union, set);
    }

    #[test]
    fn test_union_is_commutative() {
        let a = TupleSet::from(vec![t("k", 1.0, "m")]);
        let b = TupleSet::from(vec![t("k", 5.0, "m"), t("k", 1.0, "n")]);
        let (ab, _) = union_difference(&[a.clone(), b.clone()]);
        let (ba, _) = union_difference(&[b, a]);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_union_is_associative() {
        let a = TupleSet::from(vec![t("k", 1.0, "m")]);
        let b = TupleSet::from(vec![t("k", 3.0, "m")]);
        let c = TupleSet::from(vec![t("k", 2.0, "m"), t("k", 1.0, "n")]);

        let (ab, _) = union_difference(&[a.clone(), b.clone()]);
        let (ab_c, _) = union_difference(&[ab, c.clone()]);
        let (bc, _) = union_difference(&[b, c]);
        let (a_bc, _) = union_difference(&[a, bc]);
        assert_eq!(ab_c, a_bc);
    }

    #[test]
    fn test_missing_member_lands_in_difference() {
        let a = TupleSet::from(vec![t("k", 1.0, "m")]);
        let b = TupleSet::new();
        let (union, difference) = union_difference(&[a, b]);
        assert_eq!(union.len(), 1);
        assert!(difference.has(&KeyMember::new("k", "m")));
    }

    #[test]
    fn test_empty_inputs() {
        let (union, difference) = union_difference(&[]);
        assert!(union.is_empty());
        assert!(difference.is_empty());

        let (union, difference) = union_difference(&[TupleSet::new(), TupleSet::new()]);
        assert!(union.is_empty());
        assert!(difference.is_empty());
    }
}
