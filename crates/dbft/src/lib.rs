//! In-memory round state machine for a dBFT block producer.
//!
//! This crate implements the consensus context over which the dBFT
//! protocol executes: for one round of block production it tracks which
//! validator proposed what, which preparation, pre-commit, and commit
//! payloads have been received, whether a view change is in progress, and
//! on what basis a final block may be assembled.
//!
//! # Architecture
//!
//! The context is a synchronous, single-threaded state machine:
//!
//! - The external protocol driver delivers decoded messages via the
//!   `record_*` family and reads the derived predicates.
//! - When the predicates indicate quorum, [`ConsensusContext::create_block`]
//!   assembles the final block with its multi-signature witness.
//! - [`ConsensusContext::reset`] runs at view boundaries: a full
//!   re-initialization at view 0, a partial transition (tearing down the
//!   fallback candidate) at higher views.
//! - [`ConsensusContext::save`] and [`ConsensusContext::load`] checkpoint
//!   the entire round state across process restarts.
//!
//! All I/O goes through the [`Ledger`], [`Store`], and [`Wallet`]
//! collaborator traits; no operation suspends, blocks, or retries
//! internally. Upper layers decide retry and view changes.
//!
//! # Dual proposals
//!
//! In view 0 two candidate proposals race: the priority candidate
//! ([`PRIORITY`]) from the primary at `(H − V) mod N`, and a fallback
//! ([`FALLBACK`]) from the primary at `(H − V − 1) mod N`. From view 1
//! onward only the priority candidate exists.

mod builder;
mod candidate;
mod checkpoint;
mod config;
mod context;
mod liveness;
mod traits;
mod validators;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{estimated_witness_size, BuildError};
pub use candidate::{CandidateBlock, FALLBACK, PRIORITY};
pub use checkpoint::{CheckpointError, CHECKPOINT_KEY};
pub use config::{DbftConfig, PRIMARY_TIMER_MULTIPLIER};
pub use context::{ChainSnapshot, ConsensusContext};
pub use liveness::LivenessTracker;
pub use traits::{Ledger, Store, Wallet};
pub use validators::ValidatorSetView;
