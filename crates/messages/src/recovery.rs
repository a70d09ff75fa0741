//! Recovery request and recovery message.
//!
//! A node that falls behind asks its peers for a `RecoveryMessage`, which
//! repackages the asker's missing round state in compact per-validator
//! forms: only the pieces needed to reconstruct each payload (indices,
//! hashes, signatures, invocation scripts) travel, not the full envelopes.

use crate::prepare::PrepareRequest;
use bytes::{Buf, BufMut};
use dbft_types::{
    read_bytes_u16, read_list_u16, read_u64, read_u8, write_bytes_u16, write_list_u16, CodecError,
    Decode, Encode, Hash, Signature,
};

/// Plea for a peer to retransmit the current round's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    /// Sender's clock at send time, milliseconds since the epoch.
    pub timestamp: u64,
}

impl Encode for RecoveryRequest {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.timestamp);
    }
}

impl Decode for RecoveryRequest {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(RecoveryRequest {
            timestamp: read_u64(buf)?,
        })
    }
}

/// Compact form of a change-view payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeViewCompact {
    /// Index of the validator that sent the change view.
    pub validator_index: u8,
    /// View the validator was in when it asked to change.
    pub original_view_number: u8,
    /// Sender timestamp from the original message.
    pub timestamp: u64,
    /// Witness invocation script of the original payload.
    pub invocation_script: Vec<u8>,
}

impl Encode for ChangeViewCompact {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.validator_index);
        buf.put_u8(self.original_view_number);
        buf.put_u64_le(self.timestamp);
        write_bytes_u16(&self.invocation_script, buf);
    }
}

impl Decode for ChangeViewCompact {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(ChangeViewCompact {
            validator_index: read_u8(buf)?,
            original_view_number: read_u8(buf)?,
            timestamp: read_u64(buf)?,
            invocation_script: read_bytes_u16(buf)?,
        })
    }
}

/// Compact form of a preparation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparationCompact {
    /// Candidate the preparation answered: 0 priority, 1 fallback.
    pub candidate: u8,
    /// Index of the validator that prepared.
    pub validator_index: u8,
    /// Witness invocation script of the original payload.
    pub invocation_script: Vec<u8>,
}

impl Encode for PreparationCompact {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.candidate);
        buf.put_u8(self.validator_index);
        write_bytes_u16(&self.invocation_script, buf);
    }
}

impl Decode for PreparationCompact {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PreparationCompact {
            candidate: read_u8(buf)?,
            validator_index: read_u8(buf)?,
            invocation_script: read_bytes_u16(buf)?,
        })
    }
}

/// Compact form of a pre-commit payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreCommitCompact {
    /// Candidate the pre-commit targeted: 0 priority, 1 fallback.
    pub candidate: u8,
    /// Index of the validator that pre-committed.
    pub validator_index: u8,
    /// Hash of the prepare-request payload pre-committed to.
    pub preparation_hash: Hash,
    /// Witness invocation script of the original payload.
    pub invocation_script: Vec<u8>,
}

impl Encode for PreCommitCompact {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.candidate);
        buf.put_u8(self.validator_index);
        self.preparation_hash.write(buf);
        write_bytes_u16(&self.invocation_script, buf);
    }
}

impl Decode for PreCommitCompact {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(PreCommitCompact {
            candidate: read_u8(buf)?,
            validator_index: read_u8(buf)?,
            preparation_hash: Hash::read(buf)?,
            invocation_script: read_bytes_u16(buf)?,
        })
    }
}

/// Compact form of a commit payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCompact {
    /// Candidate the commit targeted: 0 priority, 1 fallback.
    pub candidate: u8,
    /// View the commit was cast in.
    pub view_number: u8,
    /// Index of the validator that committed.
    pub validator_index: u8,
    /// Block signature from the original commit message.
    pub signature: Signature,
    /// Witness invocation script of the original payload.
    pub invocation_script: Vec<u8>,
}

impl Encode for CommitCompact {
    fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.candidate);
        buf.put_u8(self.view_number);
        buf.put_u8(self.validator_index);
        self.signature.write(buf);
        write_bytes_u16(&self.invocation_script, buf);
    }
}

impl Decode for CommitCompact {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(CommitCompact {
            candidate: read_u8(buf)?,
            view_number: read_u8(buf)?,
            validator_index: read_u8(buf)?,
            signature: Signature::read(buf)?,
            invocation_script: read_bytes_u16(buf)?,
        })
    }
}

/// Everything a peer needs to rejoin the round: accumulated change views,
/// the proposals themselves (or their payload hashes when the asker already
/// holds them), and all preparations, pre-commits, and commits seen so far.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecoveryMessage {
    /// Change views justifying the responder's current view.
    pub change_views: Vec<ChangeViewCompact>,
    /// The priority and fallback proposals, when the responder holds them.
    pub prepare_requests: [Option<PrepareRequest>; 2],
    /// Prepare-request payload hashes per candidate, for askers that only
    /// need to match responses to a proposal they already hold.
    pub preparation_hashes: [Option<Hash>; 2],
    /// All preparations seen this round.
    pub preparations: Vec<PreparationCompact>,
    /// All pre-commits seen this round.
    pub pre_commits: Vec<PreCommitCompact>,
    /// All commits seen this round.
    pub commits: Vec<CommitCompact>,
}

fn write_option<T: Encode, B: BufMut>(value: &Option<T>, buf: &mut B) {
    match value {
        Some(inner) => {
            buf.put_u8(1);
            inner.write(buf);
        }
        None => buf.put_u8(0),
    }
}

fn read_option<T: Decode, B: Buf>(buf: &mut B) -> Result<Option<T>, CodecError> {
    match read_u8(buf)? {
        0 => Ok(None),
        1 => Ok(Some(T::read(buf)?)),
        _ => Err(CodecError::InvalidValue("option flag")),
    }
}

impl Encode for RecoveryMessage {
    fn write<B: BufMut>(&self, buf: &mut B) {
        write_list_u16(&self.change_views, buf);
        write_option(&self.prepare_requests[0], buf);
        write_option(&self.prepare_requests[1], buf);
        write_option(&self.preparation_hashes[0], buf);
        write_option(&self.preparation_hashes[1], buf);
        write_list_u16(&self.preparations, buf);
        write_list_u16(&self.pre_commits, buf);
        write_list_u16(&self.commits, buf);
    }
}

impl Decode for RecoveryMessage {
    fn read<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(RecoveryMessage {
            change_views: read_list_u16(buf)?,
            prepare_requests: [read_option(buf)?, read_option(buf)?],
            preparation_hashes: [read_option(buf)?, read_option(buf)?],
            preparations: read_list_u16(buf)?,
            pre_commits: read_list_u16(buf)?,
            commits: read_list_u16(buf)?,
        })
    }
}
