//! Durable round-state checkpointing.
//!
//! The entire round state serializes to one deterministic little-endian
//! blob under a single fixed store key, so a restarted process resumes the
//! round it crashed in. Restore always starts from a fresh view-0 skeleton
//! built against the current chain tip and overlays the persisted state on
//! top; a checkpoint for a different block index or version is stale and
//! discarded. The chain snapshot, message cache, and key pair are not
//! persisted; all three are rebuilt from context.

use crate::candidate::{CandidateBlock, FALLBACK, PRIORITY};
use crate::context::ConsensusContext;
use dbft_messages::MessageKind;
use dbft_types::{
    read_nullable_array, read_u16, read_u32, read_u64, read_u8, write_list_u16,
    write_nullable_array, CodecError, Decode, Encode, ExtensiblePayload, Hash, ScriptHash,
    Transaction,
};
use bytes::{Buf, BufMut};
use thiserror::Error;
use tracing::{debug, info, warn};

/// The fixed store key holding the round-state checkpoint.
pub const CHECKPOINT_KEY: [u8; 1] = [0xF4];

/// Why a checkpoint was discarded at load time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CheckpointError {
    /// The persisted block version does not match the pending block's.
    #[error("checkpoint block version {found}, expected {expected}")]
    StaleVersion { found: u32, expected: u32 },

    /// The persisted block index does not match the pending block's: the
    /// chain advanced past the checkpointed round, or the checkpoint
    /// belongs to another chain.
    #[error("checkpoint is for block index {found}, expected {expected}")]
    StaleIndex { found: u32, expected: u32 },

    /// The blob failed to decode.
    #[error(transparent)]
    Corrupt(#[from] CodecError),
}

/// One candidate's persisted fields, decoded before any state is touched.
struct PersistedCandidate {
    version: u32,
    index: u32,
    timestamp: u64,
    nonce: u64,
    primary_index: u8,
    next_consensus: ScriptHash,
    transaction_hashes: Vec<Hash>,
    transactions: Vec<Transaction>,
    preparations: Vec<Option<ExtensiblePayload>>,
    pre_commits: Vec<Option<ExtensiblePayload>>,
    commits: Vec<Option<ExtensiblePayload>>,
}

fn write_candidate<B: BufMut>(
    candidate: Option<&CandidateBlock>,
    block_index: u32,
    validator_count: usize,
    buf: &mut B,
) {
    match candidate {
        Some(state) => {
            buf.put_u32_le(state.header.version);
            buf.put_u32_le(state.header.index);
            buf.put_u64_le(state.header.timestamp);
            buf.put_u64_le(state.header.nonce);
            buf.put_u8(state.header.primary_index);
            state.header.next_consensus.write(buf);
            let hashes = state.transaction_hashes.as_deref().unwrap_or_default();
            write_list_u16(hashes, buf);
            let mut transactions: Vec<&Transaction> = state.transactions.values().collect();
            transactions.sort_by_key(|transaction| transaction.hash());
            buf.put_u16_le(transactions.len() as u16);
            for transaction in transactions {
                transaction.write(buf);
            }
            write_nullable_array(&state.preparations, buf);
            write_nullable_array(&state.pre_commits, buf);
            write_nullable_array(&state.commits, buf);
        }
        None => {
            // A disabled candidate writes the zeroed skeleton so the
            // layout stays fixed at two candidates.
            buf.put_u32_le(0);
            buf.put_u32_le(block_index);
            buf.put_u64_le(0);
            buf.put_u64_le(0);
            buf.put_u8(0);
            ScriptHash::ZERO.write(buf);
            buf.put_u16_le(0);
            buf.put_u16_le(0);
            let empty: Vec<Option<ExtensiblePayload>> = vec![None; validator_count];
            write_nullable_array(&empty, buf);
            write_nullable_array(&empty, buf);
            write_nullable_array(&empty, buf);
        }
    }
}

fn read_candidate<B: Buf>(
    buf: &mut B,
    validator_count: usize,
) -> Result<PersistedCandidate, CodecError> {
    let version = read_u32(buf)?;
    let index = read_u32(buf)?;
    let timestamp = read_u64(buf)?;
    let nonce = read_u64(buf)?;
    let primary_index = read_u8(buf)?;
    let next_consensus = ScriptHash::read(buf)?;
    let hash_count = read_u16(buf)? as usize;
    let mut transaction_hashes = Vec::with_capacity(hash_count.min(1024));
    for _ in 0..hash_count {
        transaction_hashes.push(Hash::read(buf)?);
    }
    let transaction_count = read_u16(buf)? as usize;
    let mut transactions = Vec::with_capacity(transaction_count.min(1024));
    for _ in 0..transaction_count {
        transactions.push(Transaction::read(buf)?);
    }
    Ok(PersistedCandidate {
        version,
        index,
        timestamp,
        nonce,
        primary_index,
        next_consensus,
        transaction_hashes,
        transactions,
        preparations: read_nullable_array(buf, validator_count)?,
        pre_commits: read_nullable_array(buf, validator_count)?,
        commits: read_nullable_array(buf, validator_count)?,
    })
}

impl ConsensusContext {
    /// Serialize the round state into the checkpoint blob.
    pub fn encode_state(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        let block_index = self.block_index();
        let n = self.validators.n();
        for candidate in [PRIORITY, FALLBACK] {
            write_candidate(self.candidate(candidate), block_index, n, &mut buf);
        }
        buf.put_u8(self.view_number);
        write_nullable_array(&self.change_view_payloads, &mut buf);
        write_nullable_array(&self.last_change_view_payloads, &mut buf);
        buf
    }

    /// Persist the round state under [`CHECKPOINT_KEY`], synchronously.
    pub fn save(&self) {
        let bytes = self.encode_state();
        self.store.put_sync(&CHECKPOINT_KEY, &bytes);
        debug!(
            block_index = self.block_index(),
            view = self.view_number,
            bytes = bytes.len(),
            "Checkpointed round state"
        );
    }

    /// Restore the round from the persisted checkpoint.
    ///
    /// Always starts with a fresh `reset(0)` against the current tip.
    /// Returns false, leaving that fresh round in place and nothing else
    /// mutated, when no checkpoint exists, when it is stale (wrong
    /// version or block index), or when it fails to decode.
    pub fn load(&mut self) -> bool {
        self.reset(0);
        let Some(bytes) = self.store.try_get(&CHECKPOINT_KEY) else {
            debug!("No round-state checkpoint present");
            return false;
        };
        match self.try_restore(&bytes) {
            Ok(view) => {
                info!(
                    block_index = self.block_index(),
                    view,
                    "Restored round state from checkpoint"
                );
                true
            }
            Err(error) => {
                warn!(%error, "Discarding round-state checkpoint");
                false
            }
        }
    }

    /// Decode and validate the whole blob, then overlay it. Nothing is
    /// mutated unless the blob is entirely acceptable.
    fn try_restore(&mut self, bytes: &[u8]) -> Result<u8, CheckpointError> {
        let n = self.validators.n();
        let expected_index = self.block_index();
        let expected_version = self
            .candidate(PRIORITY)
            .map(|state| state.header.version)
            .unwrap_or_default();

        let mut buf: &[u8] = bytes;
        let priority = read_candidate(&mut buf, n)?;
        if priority.version != expected_version {
            return Err(CheckpointError::StaleVersion {
                found: priority.version,
                expected: expected_version,
            });
        }
        if priority.index != expected_index {
            return Err(CheckpointError::StaleIndex {
                found: priority.index,
                expected: expected_index,
            });
        }
        let fallback = read_candidate(&mut buf, n)?;
        let view_number = read_u8(&mut buf)?;
        let change_views = read_nullable_array(&mut buf, n)?;
        let last_change_views = read_nullable_array(&mut buf, n)?;
        if !buf.is_empty() {
            return Err(CodecError::TrailingData(buf.len()).into());
        }

        self.view_number = view_number;
        self.overlay_candidate(PRIORITY, priority);
        if view_number > 0 {
            self.candidates[FALLBACK] = None;
        } else {
            self.overlay_candidate(FALLBACK, fallback);
        }
        self.change_view_payloads = change_views;
        self.last_change_view_payloads = last_change_views;
        self.recover_proposals();
        Ok(view_number)
    }

    fn overlay_candidate(&mut self, index: usize, persisted: PersistedCandidate) {
        let Some(state) = self.candidate_mut(index) else {
            return;
        };
        state.header.timestamp = persisted.timestamp;
        state.header.nonce = persisted.nonce;
        state.header.primary_index = persisted.primary_index;
        state.header.next_consensus = persisted.next_consensus;
        state.transaction_hashes = if persisted.transaction_hashes.is_empty() {
            None
        } else {
            Some(persisted.transaction_hashes)
        };
        state.transactions.clear();
        state.verification_context.reset();
        for transaction in persisted.transactions {
            state.verification_context.add(&transaction);
            state.transactions.insert(transaction.hash(), transaction);
        }
        state.preparations = persisted.preparations;
        state.pre_commits = persisted.pre_commits;
        state.commits = persisted.commits;
    }

    /// An empty persisted hash list is ambiguous between "no proposal yet"
    /// and "a proposal with zero transactions". Resolve it from the
    /// primary's restored preparation slot.
    fn recover_proposals(&mut self) {
        let mut recovered: Vec<(usize, Vec<Hash>)> = Vec::new();
        for candidate in [PRIORITY, FALLBACK] {
            let Some(primary) = self.candidate_primary_index(candidate) else {
                continue;
            };
            let Some(state) = self.candidate(candidate) else {
                continue;
            };
            if state.transaction_hashes.is_some() {
                continue;
            }
            let Some(payload) = state.preparations[primary as usize].as_ref() else {
                continue;
            };
            let Some(message) = self.payload_message(payload) else {
                continue;
            };
            if let MessageKind::PrepareRequest(request) = message.kind {
                recovered.push((candidate, request.transaction_hashes));
            }
        }
        for (candidate, hashes) in recovered {
            if let Some(state) = self.candidate_mut(candidate) {
                state.transaction_hashes = Some(hashes);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::four_validator_context;

    #[test]
    fn test_missing_checkpoint_loads_false() {
        let (mut context, _pairs) = four_validator_context(1);
        assert!(!context.load());
        assert_eq!(context.view_number(), 0);
    }

    #[test]
    fn test_fresh_state_round_trips() {
        let (context, _pairs) = four_validator_context(1);
        let bytes = context.encode_state();

        let (mut restored, _pairs) = four_validator_context(1);
        assert!(restored.try_restore(&bytes).is_ok());
        assert_eq!(restored.view_number(), 0);
        assert!(!restored.request_sent_or_received());
    }

    #[test]
    fn test_corrupt_checkpoint_rejected() {
        let (mut context, _pairs) = four_validator_context(1);
        let mut bytes = context.encode_state();
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            context.try_restore(&bytes),
            Err(CheckpointError::Corrupt(_))
        ));
    }

    #[test]
    fn test_stale_index_rejected() {
        let (context, _pairs) = four_validator_context(1);
        let mut bytes = context.encode_state();
        // Corrupt the persisted block index (bytes 4..8 of candidate 0).
        bytes[4] ^= 0xff;
        let (mut other, _pairs) = four_validator_context(1);
        assert!(matches!(
            other.try_restore(&bytes),
            Err(CheckpointError::StaleIndex { .. })
        ));
    }
}
