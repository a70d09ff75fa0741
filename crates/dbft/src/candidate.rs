//! Per-candidate proposal state.

use dbft_types::{
    BlockHeader, ExtensiblePayload, Hash, Transaction, TransactionVerificationContext,
};
use std::collections::HashMap;

/// Index of the priority candidate.
pub const PRIORITY: usize = 0;
/// Index of the fallback candidate, meaningful only in view 0.
pub const FALLBACK: usize = 1;

/// Everything the round tracks for one candidate proposal: the header
/// draft, the proposed transactions as they arrive, and the per-validator
/// payload slots for the three protocol phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateBlock {
    /// Header draft. `merkle_root` stays [`Hash::ZERO`] until the header
    /// is sealed by the block builder.
    pub header: BlockHeader,
    /// Proposed transaction hashes, in merkle order. `None` until a
    /// prepare request has been sent or received for this candidate.
    pub transaction_hashes: Option<Vec<Hash>>,
    /// Full transactions gathered so far, keyed by hash.
    pub transactions: HashMap<Hash, Transaction>,
    /// Accumulated sender fees for admission policing.
    pub verification_context: TransactionVerificationContext,
    /// The final transaction list, populated only by the block builder.
    /// `Some` is the terminal block-sent marker for the round.
    pub block_transactions: Option<Vec<Transaction>>,
    /// Preparation payload per validator.
    pub preparations: Vec<Option<ExtensiblePayload>>,
    /// Pre-commit payload per validator.
    pub pre_commits: Vec<Option<ExtensiblePayload>>,
    /// Commit payload per validator.
    pub commits: Vec<Option<ExtensiblePayload>>,
}

impl CandidateBlock {
    /// A fresh candidate for `validator_count` validators.
    pub fn new(header: BlockHeader, validator_count: usize) -> Self {
        CandidateBlock {
            header,
            transaction_hashes: None,
            transactions: HashMap::new(),
            verification_context: TransactionVerificationContext::new(),
            block_transactions: None,
            preparations: vec![None; validator_count],
            pre_commits: vec![None; validator_count],
            commits: vec![None; validator_count],
        }
    }

    /// Clear the per-view mutable fields for a view transition: merkle
    /// root, timestamp, nonce, the transaction list and map, and the
    /// preparation slots. Pre-commit and commit slots survive; commits
    /// from an older view are excluded later by the block builder's view
    /// check.
    pub fn partial_reset(&mut self, primary_index: u8) {
        self.header.merkle_root = Hash::ZERO;
        self.header.timestamp = 0;
        self.header.nonce = 0;
        self.header.primary_index = primary_index;
        self.transaction_hashes = None;
        self.transactions.clear();
        self.verification_context.reset();
        self.block_transactions = None;
        for slot in &mut self.preparations {
            *slot = None;
        }
    }

    /// Apply the header fields a prepare request carries.
    pub fn apply_proposal(
        &mut self,
        timestamp: u64,
        nonce: u64,
        transaction_hashes: Vec<Hash>,
    ) {
        self.header.timestamp = timestamp;
        self.header.nonce = nonce;
        self.header.merkle_root = Hash::ZERO;
        self.transaction_hashes = Some(transaction_hashes);
        self.transactions.clear();
        self.verification_context.reset();
    }

    /// Number of proposed transactions not yet gathered.
    pub fn missing_transaction_count(&self) -> usize {
        match &self.transaction_hashes {
            None => 0,
            Some(hashes) => hashes
                .iter()
                .filter(|hash| !self.transactions.contains_key(hash))
                .count(),
        }
    }
}
