//! Collaborator interfaces consumed by the consensus context.
//!
//! The context never performs I/O of its own: it reads the chain through
//! [`Ledger`], persists its round state through [`Store`], and finds its
//! signing key through [`Wallet`]. All three are synchronous; the context is
//! single-threaded and no call suspends.

use dbft_types::{Block, BlockHeader, Hash, KeyPair, PublicKey};

/// Read-only view of the chain.
pub trait Ledger: Send + Sync {
    /// Index of the chain tip.
    fn current_index(&self) -> u32;

    /// Hash of the chain tip.
    fn current_hash(&self) -> Hash;

    /// Look up a block header by hash.
    fn header(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Look up a block by hash, with transactions trimmed to what the
    /// ledger retains.
    fn trimmed_block(&self, hash: &Hash) -> Option<Block>;

    /// The validator set registered for the pending block.
    fn next_block_validators(&self) -> Vec<PublicKey>;

    /// Recompute the pending validator set from current stake tallies.
    fn compute_next_block_validators(&self) -> Vec<PublicKey>;

    /// Does the committee-refresh epoch apply at `height`?
    fn should_refresh_committee(&self, height: u32, committee_size: usize) -> bool {
        committee_size > 0 && height as usize % committee_size == 0
    }
}

/// Durable key-value store for the round-state checkpoint.
pub trait Store: Send + Sync {
    /// Read the value at `key`, if any.
    fn try_get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Write `value` at `key`, synchronously durable on return.
    fn put_sync(&self, key: &[u8], value: &[u8]);
}

/// Access to the node's signing keys.
pub trait Wallet: Send + Sync {
    /// The key pair for `public_key`, when this wallet holds it.
    fn key_for(&self, public_key: &PublicKey) -> Option<KeyPair>;
}
