//! Tuple coordinate types for the sorted-set data model.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A single sorted-set element: key, score, and member.
///
/// The key and member are opaque strings; the score is a finite
/// non-negative float that doubles as the element's CRDT version. Equality
/// and hashing cover all three fields, so a [`crate::TupleSet`] holds each
/// exact observation at most once while the same `(key, member)` may appear
/// with several scores across replica answers.
///
/// The `Ord` implementation is the canonical result order used for every
/// slice returned to clients: key ascending, score **descending**, member
/// ascending.
///
/// # Example
///
/// ```
/// use zfarm_common::KeyScoreMember;
///
/// let high = KeyScoreMember::new("scores", 9.5, "alice");
/// let low = KeyScoreMember::new("scores", 2.0, "bob");
/// assert!(high < low); // higher score sorts first within a key
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyScoreMember {
    /// Set key this element belongs to
    pub key: String,
    /// Score; acts as the element version for conflict resolution
    pub score: OrderedFloat<f64>,
    /// Opaque member payload
    pub member: String,
}

impl KeyScoreMember {
    /// Creates a tuple from its three coordinates.
    pub fn new(key: impl Into<String>, score: f64, member: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            score: OrderedFloat(score),
            member: member.into(),
        }
    }

    /// The `(key, member)` identity of this tuple, with the score dropped.
    pub fn key_member(&self) -> KeyMember {
        KeyMember {
            key: self.key.clone(),
            member: self.member.clone(),
        }
    }
}

impl Ord for KeyScoreMember {
    // Canonical order: key ascending, score descending, member ascending.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.score.cmp(&self.score))
            .then_with(|| self.member.cmp(&other.member))
    }
}

impl PartialOrd for KeyScoreMember {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `(key, member)` pair identifying a logical element regardless of
/// score. Conflict resolution and read-repair operate on this identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyMember {
    pub key: String,
    pub member: String,
}

impl KeyMember {
    /// Creates a key/member pair.
    pub fn new(key: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            member: member.into(),
        }
    }
}

impl From<&KeyScoreMember> for KeyMember {
    fn from(tuple: &KeyScoreMember) -> Self {
        tuple.key_member()
    }
}
