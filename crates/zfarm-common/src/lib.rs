//! zfarm Common Types
//!
//! This crate provides the value types shared by every zfarm component:
//! the tuple coordinates of the sorted-set data model, the bulk-set helpers
//! used to merge replica answers, and the error type surfaced by the farm.
//!
//! # Data Model
//!
//! The farm stores an ordered set per key. Each element is a
//! [`KeyScoreMember`] triple. The `(key, member)` pair, a [`KeyMember`],
//! identifies the logical element, and the score acts as its version.
//! A tuple with a strictly greater score supersedes a lesser one for the
//! same `(key, member)`, regardless of which replica it came from.
//!
//! # Reconciliation
//!
//! [`union_difference`] is the nucleus of convergence: given one
//! [`TupleSet`] per consulted replica, the union carries the best-known
//! score per element (the CRDT join) and the difference lists the elements
//! the replicas disagreed on, which become the read-repair work list.
//!
//! # Example
//!
//! ```
//! use zfarm_common::{union_difference, KeyScoreMember, TupleSet};
//!
//! let a = TupleSet::from(vec![KeyScoreMember::new("k", 1.0, "m")]);
//! let b = TupleSet::from(vec![KeyScoreMember::new("k", 2.0, "m")]);
//!
//! let (union, difference) = union_difference(&[a, b]);
//! assert_eq!(union.slice(), vec![KeyScoreMember::new("k", 2.0, "m")]);
//! assert_eq!(difference.len(), 1);
//! ```

pub mod error;
pub mod sets;
pub mod tuple;

pub use error::{FarmError, Result};
pub use sets::{union_difference, KeyMemberSet, TupleSet};
pub use tuple::{KeyMember, KeyScoreMember};
