//! Snapshot of the validator set for the pending block.

use crate::traits::Ledger;
use dbft_types::{bft_address, fault_tolerance, quorum, PublicKey, ScriptHash};

/// The ordered validator public keys for the round, with the Byzantine
/// arithmetic cached: `F = (N − 1) / 3`, `M = N − F`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorSetView {
    keys: Vec<PublicKey>,
    f: usize,
    m: usize,
}

impl ValidatorSetView {
    /// An empty view, the state before the first reset.
    pub fn empty() -> Self {
        ValidatorSetView {
            keys: Vec::new(),
            f: 0,
            m: 0,
        }
    }

    /// Wrap an ordered key list.
    pub fn new(keys: Vec<PublicKey>) -> Self {
        let n = keys.len();
        ValidatorSetView {
            keys,
            f: fault_tolerance(n),
            m: quorum(n),
        }
    }

    /// The validator set registered for the pending block.
    pub fn load(ledger: &dyn Ledger) -> Self {
        Self::new(ledger.next_block_validators())
    }

    /// The consensus address the block after `height` must carry: the
    /// multi-signature address of the validator set for `height + 1`. The
    /// set is recomputed from stake tallies when the committee-refresh
    /// epoch applies there, otherwise the current set is reused. The
    /// decision is binary and deterministic.
    pub fn next_consensus(
        &self,
        ledger: &dyn Ledger,
        height: u32,
        committee_size: usize,
    ) -> ScriptHash {
        if ledger.should_refresh_committee(height + 1, committee_size) {
            bft_address(&ledger.compute_next_block_validators())
        } else {
            bft_address(&self.keys)
        }
    }

    /// Validator count.
    pub fn n(&self) -> usize {
        self.keys.len()
    }

    /// Tolerated fault count.
    pub fn f(&self) -> usize {
        self.f
    }

    /// Commit quorum.
    pub fn m(&self) -> usize {
        self.m
    }

    /// The ordered keys.
    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    /// The key at validator index `index`.
    pub fn key(&self, index: u8) -> Option<PublicKey> {
        self.keys.get(index as usize).copied()
    }

    /// The index of `key` in the set.
    pub fn index_of(&self, key: &PublicKey) -> Option<u8> {
        self.keys.iter().position(|k| k == key).map(|i| i as u8)
    }
}
