//! zfarm Coordinator
//!
//! This crate provides the farm: a coordination layer that presents a
//! single CRDT-semantic sorted-set API on top of N independent backend
//! clusters, each holding its own replica of the data.
//!
//! # Architecture
//!
//! The farm is a scatter/gather coordinator. Its responsibilities are:
//!
//! 1. **Quorum Writes**: Fan every insert/delete out to all clusters and
//!    report success as soon as a write quorum has acknowledged
//! 2. **Strategy Reads**: Consult one, some, or all clusters according to
//!    a pluggable [`ReadStrategy`] and reconcile divergent answers into a
//!    single converged result
//! 3. **Read-Repair**: Route divergences detected during reads into a
//!    background [`RepairStrategy`] that pushes the winning tuple to
//!    lagging clusters
//!
//! # Key Design Decisions
//!
//! ## Immutable Façade, Concurrent Fan-Out
//!
//! A [`Farm`] is constructed once with its clusters, quorum, strategies,
//! and instrumentation, and is immutable thereafter, so it can be shared
//! freely across tasks without locking. Every per-cluster call runs on its
//! own task and reports through a bounded channel sized to the cluster
//! count, so abandoned stragglers never block anyone.
//!
//! ## Quorum Over Idempotent Writes
//!
//! Writes are idempotent CRDT operations: a quorum is enough, because
//! clusters that missed a write are converged later by read-repair. The
//! slowest cluster never determines write latency: the coordinator
//! returns the moment the quorum is reached and lets the stragglers run
//! to completion in the background.
//!
//! ## Repair Is Fire-and-Forget
//!
//! Repairs are triggered by the read path but deliberately detached from
//! it: a select never waits for the repairs it schedules, and repair
//! outcomes are observable only through instrumentation.

pub mod farm;
pub mod read_strategy;
pub mod repair;

pub use farm::{Farm, FarmCore};
pub use read_strategy::{
    ReadStrategy, SelectResult, SendAllReadAll, SendAllReadFirstLinger, SendOneReadOne,
    SendVarReadFirstLinger,
};
pub use repair::{AllRepairs, NoRepairs, RateLimitedRepairs, RepairStrategy};
