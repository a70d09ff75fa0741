//! Block assembly from collected commit signatures.

use crate::context::ConsensusContext;
use dbft_types::{
    multisig_redeem_script, push_signature, quorum, Block, BlockHeader, Hash, PublicKey, Signature,
    Witness,
};
use dbft_types::merkle_root;
use thiserror::Error;
use tracing::info;

/// Why a block could not be assembled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The candidate does not exist in the current view.
    #[error("candidate {0} is disabled in this view")]
    CandidateDisabled(usize),

    /// No proposal has been recorded for the candidate.
    #[error("candidate {0} has no proposal to build from")]
    HeaderIncomplete(usize),

    /// Fewer than M commits carry the round's view.
    #[error("only {have} matching-view commits, need {need}")]
    NoQuorum { have: usize, need: usize },

    /// A proposed transaction was never gathered. The round must be
    /// aborted; upper layers gather all transactions before building.
    #[error("proposed transaction {0} was never gathered")]
    MissingTransaction(Hash),
}

impl ConsensusContext {
    /// Seal the candidate's header: compute the merkle root over its
    /// transaction hash list if not already done. Returns `None` until a
    /// proposal exists. Idempotent; the root is computed once.
    pub fn ensure_header(&mut self, candidate: usize) -> Option<&BlockHeader> {
        let state = self.candidate_mut(candidate)?;
        let hashes = state.transaction_hashes.as_ref()?;
        if state.header.merkle_root.is_zero() {
            state.header.merkle_root = merkle_root(hashes);
        }
        Some(&state.header)
    }

    /// Assemble the final signed block for `candidate` from the collected
    /// commits.
    ///
    /// Consumes at most M commit signatures in ascending validator index,
    /// skipping commits whose embedded view differs from the round's.
    /// Every proposed transaction must already be gathered. On success the
    /// candidate's final transaction list is populated, which is the
    /// round's terminal block-sent marker.
    pub fn create_block(&mut self, candidate: usize) -> Result<Block, BuildError> {
        if self.candidate(candidate).is_none() {
            return Err(BuildError::CandidateDisabled(candidate));
        }
        let header = self
            .ensure_header(candidate)
            .ok_or(BuildError::HeaderIncomplete(candidate))?
            .clone();
        let view = self.view_number();
        let m = self.m();
        let n = self.n();

        let mut invocation_script = Vec::new();
        let mut collected = 0;
        {
            let state = self
                .candidate(candidate)
                .ok_or(BuildError::CandidateDisabled(candidate))?;
            for index in 0..n {
                if collected == m {
                    break;
                }
                let Some(payload) = &state.commits[index] else {
                    continue;
                };
                let Some(message) = self.payload_message(payload) else {
                    continue;
                };
                if message.view_number != view {
                    // Not an error: a stale-view commit just does not
                    // contribute.
                    continue;
                }
                let Some(signature) = message.commit_signature() else {
                    continue;
                };
                push_signature(&mut invocation_script, signature);
                collected += 1;
            }
        }
        if collected < m {
            return Err(BuildError::NoQuorum {
                have: collected,
                need: m,
            });
        }
        let verification_script = multisig_redeem_script(m, self.validators().keys());

        let transactions = {
            let state = self
                .candidate(candidate)
                .ok_or(BuildError::CandidateDisabled(candidate))?;
            let hashes = state
                .transaction_hashes
                .as_ref()
                .ok_or(BuildError::HeaderIncomplete(candidate))?;
            let mut transactions = Vec::with_capacity(hashes.len());
            for hash in hashes {
                match state.transactions.get(hash) {
                    Some(transaction) => transactions.push(transaction.clone()),
                    None => return Err(BuildError::MissingTransaction(*hash)),
                }
            }
            transactions
        };

        let mut header = header;
        header.witness = Some(Witness {
            invocation_script,
            verification_script,
        });
        if let Some(state) = self.candidate_mut(candidate) {
            state.block_transactions = Some(transactions.clone());
        }
        info!(
            block_index = header.index,
            candidate,
            commits = collected,
            transactions = transactions.len(),
            "Assembled block"
        );
        Ok(Block {
            header,
            transactions,
        })
    }
}

/// Upper-bound serialized size of a block witness for `validators`: M
/// signature pushes in the invocation script and the M-of-N redeem script
/// as verification. Used by fee calculation outside the core.
pub fn estimated_witness_size(validators: &[PublicKey]) -> usize {
    if validators.is_empty() {
        return 0;
    }
    let m = quorum(validators.len());
    let mut invocation_script = Vec::with_capacity(m * (Signature::LEN + 2));
    for _ in 0..m {
        push_signature(&mut invocation_script, &Signature::zero());
    }
    Witness {
        invocation_script,
        verification_script: multisig_redeem_script(m, validators),
    }
    .serialized_size()
}
